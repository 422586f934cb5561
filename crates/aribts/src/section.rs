//! TSパケット列からのPSI/SIセクションとPESパケットの組み立て。
//!
//! [`Selector`]で監視対象のPIDとテーブル識別を選択し、[`Sections`]がパケットを
//! 順次読み込みながらPIDごとのバッファにペイロードを蓄積する。新たなユニットの
//! 開始かストリームの終端で完成したセクションが[`Section`]として順に返される。

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};
use std::rc::Rc;

use fxhash::FxHashMap;
use indexmap::IndexMap;

use crate::packet::{Packet, PacketIter};
use crate::pid::Pid;
use crate::syntax::{Instance, SyntaxDef};
use crate::utils::BytesExt;

/// セクションまたはPESパケットの種類の定義。
#[derive(Debug)]
pub struct SectionDef {
    /// 組み立てたバイト列の復号に使う構造定義。
    pub syntax: SyntaxDef,
    /// 既定で監視するPID。
    pub pids: &'static [Pid],
    /// 受理するテーブル識別。空の場合は全てのテーブル識別を受理する。
    pub table_ids: &'static [u8],
    /// セクションではなくPESパケットとして組み立てるかどうか。
    pub pes: bool,
}

impl SectionDef {
    /// `buffer`が完成した1単位を含むかどうかを返す。
    fn is_full(&self, buffer: &[u8]) -> bool {
        if self.pes {
            // PES_packet_lengthはヘッダー6バイトに続くバイト数
            buffer.len() >= 6 && buffer[4..6].read_be_16() as usize + 6 <= buffer.len()
        } else {
            buffer.len() >= 3
                && (((buffer[1] & 0x0F) as usize) << 8 | buffer[2] as usize) + 3 <= buffer.len()
        }
    }
}

/// どの定義でどのPID・テーブル識別を組み立てるかの選択。
///
/// 同じ`(PID, テーブル識別)`を複数回登録した場合、後の登録が優先される。
#[derive(Debug, Clone, Default)]
pub struct Selector {
    exact: IndexMap<(u16, u8), &'static SectionDef>,
    any: IndexMap<u16, &'static SectionDef>,
}

impl Selector {
    /// 空の`Selector`を生成する。
    #[inline]
    #[must_use]
    pub fn new() -> Selector {
        Selector::default()
    }

    /// `defs`をそれぞれの既定のPIDで登録した`Selector`を生成する。
    #[must_use]
    pub fn with(defs: &[&'static SectionDef]) -> Selector {
        let mut selector = Selector::new();
        for def in defs {
            selector.add(def);
        }
        selector
    }

    /// `def`をその既定のPIDで登録する。
    #[inline]
    pub fn add(&mut self, def: &'static SectionDef) {
        self.add_with_pids(def, def.pids);
    }

    /// `def`を`pids`で登録する。
    ///
    /// PMTや字幕のPESなど、実行時に判明したPIDを監視する際に用いる。
    pub fn add_with_pids(&mut self, def: &'static SectionDef, pids: &[Pid]) {
        for &pid in pids {
            if def.table_ids.is_empty() {
                self.any.insert(pid.get(), def);
            } else {
                for &table_id in def.table_ids {
                    self.exact.insert((pid.get(), table_id), def);
                }
            }
        }
    }

    fn get(&self, pid: Pid, table_id: u8) -> Option<&'static SectionDef> {
        self.exact
            .get(&(pid.get(), table_id))
            .or_else(|| self.any.get(&pid.get()))
            .copied()
    }

    fn is_tracked(&self, pid: Pid) -> bool {
        self.any.contains_key(&pid.get()) || self.exact.keys().any(|&(p, _)| p == pid.get())
    }
}

/// 組み立てが完了したセクションまたはPESパケット。
#[derive(Clone)]
pub struct Section {
    def: &'static SectionDef,
    pid: Pid,
    data: Rc<[u8]>,
}

impl Section {
    /// このセクションの定義を返す。
    #[inline]
    pub fn def(&self) -> &'static SectionDef {
        self.def
    }

    /// このセクションが現れたPIDを返す。
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// テーブル識別（先頭バイト）を返す。
    #[inline]
    pub fn table_id(&self) -> u8 {
        self.data.first().copied().unwrap_or(0xFF)
    }

    /// 組み立てられたバイト列を返す。
    ///
    /// セクション本体の後ろにスタッフィングバイトが続くことがある。
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// バイト列を定義の構造に従って復号する[`Instance`]を返す。
    #[inline]
    pub fn instance(&self) -> Instance {
        self.def.syntax.decode(self.data.clone())
    }
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Section")
            .field("def", &self.def.syntax.name)
            .field("pid", &self.pid)
            .field("table_id", &self.table_id())
            .field("len", &self.data.len())
            .finish()
    }
}

/// `r`から読み込んだTSパケットを組み立て、完成したセクションを順に返すイテレーター。
pub struct Sections<R> {
    packets: PacketIter<R>,
    selector: Selector,
    buffers: FxHashMap<u16, Vec<u8>>,
    pending: VecDeque<Section>,
    eos: bool,
}

impl<R: Read> Sections<R> {
    /// `r`から`selector`が選択するセクションを組み立てる`Sections`を生成する。
    pub fn new(r: R, selector: Selector) -> Sections<R> {
        Sections {
            packets: Packet::iter(r),
            selector,
            buffers: FxHashMap::default(),
            pending: VecDeque::new(),
            eos: false,
        }
    }

    fn feed(&mut self, packet: &Packet) {
        let pid = packet.pid();
        if !self.selector.is_tracked(pid) {
            return;
        }

        let (prev, next) = packet.payload_units();
        if packet.unit_start_indicator() {
            if let Some(buffer) = self.buffers.get_mut(&pid.get()) {
                if !buffer.is_empty() {
                    buffer.extend_from_slice(prev);
                    Self::drain(&self.selector, &mut self.pending, pid, buffer);
                }
            }

            let buffer = self.buffers.entry(pid.get()).or_default();
            buffer.clear();
            buffer.extend_from_slice(next);
        } else if let Some(buffer) = self.buffers.get_mut(&pid.get()) {
            // ユニットの開始前に現れた継続部分は捨てる
            if !buffer.is_empty() {
                buffer.extend_from_slice(prev);
            }
        }
    }

    /// 蓄積済みの`buffer`から連続するセクションを取り出す。
    fn drain(
        selector: &Selector,
        pending: &mut VecDeque<Section>,
        pid: Pid,
        buffer: &mut Vec<u8>,
    ) {
        let mut offset = 0;
        loop {
            let rest = &buffer[offset..];
            let Some(&table_id) = rest.first() else { break };
            if table_id == 0xFF {
                // スタッフィングバイト以降にセクションは続かない
                break;
            }

            if let Some(def) = selector.get(pid, table_id) {
                pending.push_back(Section {
                    def,
                    pid,
                    data: Rc::from(rest),
                });
            } else {
                log::trace!(
                    "section not selected: pid={:?}, table_id={:#04X}",
                    pid,
                    table_id,
                );
            }

            if rest.starts_with(&[0x00, 0x00, 0x01]) {
                // PESパケットはセクションのようには連続しない
                break;
            }
            let Some(&[hi, lo]) = rest.get(1..3) else { break };
            offset += (((hi & 0x0F) as usize) << 8 | lo as usize) + 3;
            if offset >= buffer.len() {
                break;
            }
        }
    }

    /// ストリーム終端で完成済みのバッファを掃き出す。
    fn flush(&mut self) {
        let buffers = std::mem::take(&mut self.buffers);

        let mut pids: Vec<u16> = buffers.keys().copied().collect();
        pids.sort_unstable();
        for pid in pids {
            let buffer = &buffers[&pid];
            let Some(&table_id) = buffer.first() else { continue };
            if table_id == 0xFF {
                continue;
            }

            let pid = Pid::new(pid);
            let Some(def) = self.selector.get(pid, table_id) else {
                continue;
            };
            if def.is_full(buffer) {
                self.pending.push_back(Section {
                    def,
                    pid,
                    data: Rc::from(&buffer[..]),
                });
            } else {
                log::debug!(
                    "incomplete section dropped at end of stream: pid={:?}, len={}",
                    pid,
                    buffer.len(),
                );
            }
        }
    }
}

impl<R: Read> Iterator for Sections<R> {
    type Item = io::Result<Section>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(section) = self.pending.pop_front() {
                return Some(Ok(section));
            }
            if self.eos {
                return None;
            }

            match self.packets.next() {
                None => {
                    self.eos = true;
                    self.flush();
                }
                Some(Err(e)) => {
                    self.eos = true;
                    self.flush();
                    return Some(Err(e));
                }
                Some(Ok(packet)) => self.feed(&packet),
            }
        }
    }
}

impl<R> fmt::Debug for Sections<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Sections")
            .field("pending", &self.pending.len())
            .field("eos", &self.eos)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Field, Length};
    use crate::table::PAT;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    // ariblibのテストより
    const PAT_SECTION: [u8; 32] = hex!(
        "00 B0 1D 7E 87 D9 00 00 00 00 E0 10 5C 38 E1 01"
        "5C 39 E1 02 5D B8 FF C8 5D B9 FF C9 90 3F 0A 85"
    );

    /// ペイロードからTSパケット1つを組み立てる。
    fn packet(pid: u16, start: bool, cc: u8, payload: &[u8]) -> [u8; 188] {
        assert!(payload.len() <= 184);
        let mut data = [0xFF_u8; 188];
        data[0] = 0x47;
        data[1] = (if start { 0x40 } else { 0x00 }) | (pid >> 8) as u8;
        data[2] = pid as u8;
        data[3] = 0b00010000 | (cc & 0x0F);
        data[4..4 + payload.len()].copy_from_slice(payload);
        data
    }

    fn assert_pat(section: &Section) {
        assert_eq!(section.pid(), Pid::PAT);
        assert_eq!(section.table_id(), 0x00);
        assert_eq!(&section.data()[..PAT_SECTION.len()], &PAT_SECTION);

        let pat = section.instance();
        assert_eq!(pat.uint("section_length").unwrap(), 29);
        assert_eq!(pat.uint("transport_stream_id").unwrap(), 0x7E87);
        assert_eq!(pat.uint("version_number").unwrap(), 0x0C);
        assert_eq!(pat.uint("CRC_32").unwrap(), 0x903F0A85);
    }

    #[test]
    fn test_sections_single_packet() {
        let mut payload = vec![0x00];
        payload.extend_from_slice(&PAT_SECTION);
        let stream = packet(0x0000, true, 0, &payload);

        let mut sections = Sections::new(&stream[..], Selector::with(&[&PAT]));
        let section = sections.next().unwrap().unwrap();
        assert_pat(&section);
        assert_matches!(sections.next(), None);
    }

    #[test]
    fn test_sections_split_reassembly() {
        // 2分割・3分割しても同じセクションに組み上がる
        for parts in [2, 3] {
            let chunk = PAT_SECTION.len() / parts + 1;
            let mut stream = Vec::new();
            for (i, part) in PAT_SECTION.chunks(chunk).enumerate() {
                let payload = if i == 0 {
                    let mut p = vec![0x00];
                    p.extend_from_slice(part);
                    p
                } else {
                    part.to_vec()
                };
                stream.extend_from_slice(&packet(0x0000, i == 0, i as u8, &payload));
            }

            let mut sections = Sections::new(&stream[..], Selector::with(&[&PAT]));
            let section = sections.next().unwrap().unwrap();
            assert_pat(&section);
            assert_matches!(sections.next(), None);
        }
    }

    #[test]
    fn test_sections_pointer_skip() {
        // 前のユニットの残りを読み飛ばしてポインターバイトの指す位置から始める
        let mut payload = vec![0x05, 0xDE, 0xAD, 0xBE, 0xEF, 0x99];
        payload.extend_from_slice(&PAT_SECTION);
        let stream = packet(0x0000, true, 0, &payload);

        let mut sections = Sections::new(&stream[..], Selector::with(&[&PAT]));
        assert_pat(&sections.next().unwrap().unwrap());
        assert_matches!(sections.next(), None);
    }

    #[test]
    fn test_sections_multi_in_payload() {
        // 1ペイロードに2セクション連続
        let mut payload = vec![0x00];
        payload.extend_from_slice(&PAT_SECTION);
        payload.extend_from_slice(&PAT_SECTION);
        let mut stream = Vec::new();
        stream.extend_from_slice(&packet(0x0000, true, 0, &payload));
        // 次のユニット開始で前のバッファが処理される
        let mut next = vec![0x00];
        next.extend_from_slice(&PAT_SECTION);
        stream.extend_from_slice(&packet(0x0000, true, 1, &next));

        let sections: Vec<_> = Sections::new(&stream[..], Selector::with(&[&PAT]))
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(sections.len(), 3);
        for section in &sections {
            assert_pat(section);
        }
    }

    #[test]
    fn test_sections_ignores_unselected() {
        // 監視していないPIDや一致しないテーブル識別は無視される
        let mut payload = vec![0x00];
        payload.extend_from_slice(&PAT_SECTION);
        let mut stream = Vec::new();
        stream.extend_from_slice(&packet(0x0012, true, 0, &payload));

        let mut other = payload.clone();
        other[1] = 0x42;
        stream.extend_from_slice(&packet(0x0000, true, 0, &other));

        let mut sections = Sections::new(&stream[..], Selector::with(&[&PAT]));
        assert_matches!(sections.next(), None);
    }

    #[test]
    fn test_sections_incomplete_dropped() {
        // section_lengthがバッファより長いセクションは終端時に捨てられる
        let payload = [0x00, 0x00, 0xB0, 0xFF, 0xDE, 0xAD];
        let stream = packet(0x0000, true, 0, &payload);

        let mut sections = Sections::new(&stream[..], Selector::with(&[&PAT]));
        assert_matches!(sections.next(), None);
    }

    static RAW_PES: SectionDef = SectionDef {
        syntax: SyntaxDef {
            name: "RawPes",
            fields: &[
                Field::bslbf("packet_start_code_prefix", 24),
                Field::uimsbf("stream_id", 8),
                Field::uimsbf("PES_packet_length", 16),
                Field::raw("PES_packet_data_byte", Length::Field("PES_packet_length")),
            ],
        },
        pids: &[],
        table_ids: &[],
        pes: true,
    };

    #[test]
    fn test_sections_pes() {
        // PESはポインターバイトなしで始まり、終端で完成判定される
        let payload = [0x00, 0x00, 0x01, 0xBD, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];
        let stream = packet(0x0101, true, 0, &payload);

        let mut selector = Selector::new();
        selector.add_with_pids(&RAW_PES, &[Pid::new(0x0101)]);

        let mut sections = Sections::new(&stream[..], selector);
        let section = sections.next().unwrap().unwrap();
        assert_eq!(section.pid(), Pid::new(0x0101));
        let pes = section.instance();
        assert_eq!(pes.uint("packet_start_code_prefix").unwrap(), 0x000001);
        assert_eq!(pes.uint("stream_id").unwrap(), 0xBD);
        assert_eq!(
            pes.bytes("PES_packet_data_byte").unwrap(),
            &[0xDE, 0xAD, 0xBE, 0xEF],
        );
        assert_matches!(sections.next(), None);
    }
}
