//! MPEG2-TSのパケット。

use std::fmt;
use std::io::{self, Read};

use crate::pid::Pid;
use crate::time::Timestamp;

const SYNC_BYTE: u8 = 0x47;
const PACKET_SIZE: usize = 188;

/// PESパケットの開始コードプリフィックス。
const PES_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];

/// MPEG2-TSのパケット。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Packet(pub [u8; PACKET_SIZE]);

/// `buf`が一杯になるか`r`が終端に達するまで読み込み、読み込めたバイト数を返す。
fn read_to_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl Packet {
    /// `r`からTSパケットを順次読み込むイテレーターを生成する。
    ///
    /// # サンプル
    ///
    /// ```
    /// # fn main() -> std::io::Result<()> {
    /// # let file = &mut (&[] as &[u8]);
    /// for packet in aribts::Packet::iter(file) {
    ///     let packet = packet?;
    ///
    ///     // 同期バイトは常に正しい
    ///     assert_eq!(packet.sync_byte(), 0x47);
    ///     // ただしパケットとして正しいかは不明
    ///     println!("パケットが正常か：{}", packet.is_normal());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[inline]
    #[must_use]
    pub fn iter<R: Read>(r: R) -> PacketIter<R> {
        PacketIter { r }
    }

    /// `r`からTSパケットを読み込む。
    ///
    /// 原則として188バイトずつ読み込むが、パケットとして正しくなさそうな部分は読み飛ばす。
    /// パケット境界ちょうどでストリームが終端した場合は`Ok(None)`を返し、
    /// 188バイトに満たない端数が残った場合は[`io::ErrorKind::UnexpectedEof`]を返す。
    pub fn read<R: Read>(mut r: R) -> io::Result<Option<Packet>> {
        let mut packet = Packet([0; PACKET_SIZE]);

        let n = read_to_full(&mut r, &mut packet.0)?;
        if n == 0 {
            return Ok(None);
        }
        if n < PACKET_SIZE {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        if packet.0[0] == SYNC_BYTE {
            return Ok(Some(packet));
        }

        let mut may_resync = false;
        // 同期バイト待ち
        let pos = loop {
            if let Some(pos) = memchr::memchr(SYNC_BYTE, &packet.0) {
                // Safety: memchrの戻り値が入力の長さを超えることはない
                unsafe { crate::utils::assume!(pos < PACKET_SIZE) }

                // 同期バイト発見
                break pos;
            }

            let n = read_to_full(&mut r, &mut packet.0)?;
            if n == 0 {
                // 全てゴミだった
                return Ok(None);
            }
            if n < PACKET_SIZE {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            may_resync = true;
        };

        packet.0.copy_within(pos.., 0);
        let n = read_to_full(&mut r, &mut packet.0[PACKET_SIZE - pos..])?;
        if n < pos {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        if may_resync || pos > 16 {
            while !packet.is_normal() {
                let Some(pos) = memchr::memchr(SYNC_BYTE, &packet.0[1..]) else {
                    break;
                };
                // 同期バイトが他にもある場合、そこから再同期する

                let pos = pos + 1;
                // Safety: memchrの戻り値が入力の長さを超えることはない
                unsafe { crate::utils::assume!((1..PACKET_SIZE).contains(&pos)) }

                packet.0.copy_within(pos.., 0);
                let n = read_to_full(&mut r, &mut packet.0[PACKET_SIZE - pos..])?;
                if n < pos {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
            }
        }
        Ok(Some(packet))
    }

    /// パケットが正常かどうかを返す。
    ///
    /// 同期バイトやトランスポートエラーインジケーターによるエラー検知に加え、
    /// 予約されたPIDなどパケットとしてあり得ない状態であることも判断材料である。
    pub fn is_normal(&self) -> bool {
        if self.sync_byte() != SYNC_BYTE {
            // 同期バイト不正
            return false;
        }
        if self.error_indicator() {
            // ビット誤りあり
            return false;
        }
        if (0x0002..=0x000F).contains(&self.pid().get()) {
            // 未定義PID範囲
            return false;
        }
        if self.scrambling_control() == 0x01 {
            // 未定義スクランブル制御値
            return false;
        }
        if self.adaptation_field_control() == 0b00 {
            // 未定義アダプテーションフィールド制御値
            return false;
        }
        if self.adaptation_field_control() == 0b10 && self.adaptation_field_length_raw() > 183 {
            // アダプテーションフィールド長異常
            return false;
        }
        if self.adaptation_field_control() == 0b11 && self.adaptation_field_length_raw() > 182 {
            // アダプテーションフィールド長異常
            return false;
        }

        true
    }

    /// 同期バイトを返す。
    #[inline]
    pub fn sync_byte(&self) -> u8 {
        self.0[0]
    }

    /// トランスポートエラーインジケーターを返す。
    #[inline]
    pub fn error_indicator(&self) -> bool {
        self.0[1] & 0b10000000 != 0
    }

    /// ペイロードユニット開始インジケーターを返す。
    #[inline]
    pub fn unit_start_indicator(&self) -> bool {
        self.0[1] & 0b01000000 != 0
    }

    /// トランスポート優先度を返す。
    #[inline]
    pub fn priority(&self) -> bool {
        self.0[1] & 0b00100000 != 0
    }

    /// PIDを返す。
    #[inline]
    pub fn pid(&self) -> Pid {
        Pid::read(&self.0[1..])
    }

    /// トランスポートスクランブル制御（2ビット）を返す。
    #[inline]
    pub fn scrambling_control(&self) -> u8 {
        (self.0[3] & 0b11000000) >> 6
    }

    /// パケットがスクランブル処理されているかを返す。
    #[inline]
    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control() & 0b10 != 0
    }

    /// アダプテーションフィールド制御（2ビット）を返す。
    #[inline]
    pub fn adaptation_field_control(&self) -> u8 {
        (self.0[3] & 0b00110000) >> 4
    }

    /// 連続性指標（4ビット）を返す。
    #[inline]
    pub fn continuity_counter(&self) -> u8 {
        self.0[3] & 0b00001111
    }

    /// パケットがアダプテーションフィールドを含むかどうかを返す。
    #[inline]
    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control() & 0b10 != 0
    }

    #[inline]
    fn adaptation_field_length_raw(&self) -> u8 {
        self.0[4]
    }

    /// アダプテーションフィールドがある場合、adaptation_field_lengthを返す。
    #[inline]
    pub fn adaptation_field_length(&self) -> Option<u8> {
        self.has_adaptation_field()
            .then(|| self.adaptation_field_length_raw())
    }

    /// アダプテーションフィールドを返す。
    #[inline]
    pub fn adaptation_field(&self) -> Option<AdaptationField> {
        AdaptationField::new(self)
    }

    /// パケットがペイロードを含むかどうかを返す。
    #[inline]
    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control() & 0b01 != 0
    }

    /// ペイロードを返す。
    pub fn payload(&self) -> Option<&[u8]> {
        if !self.has_payload() {
            None
        } else if let Some(afl) = self.adaptation_field_length() {
            let offset = 4 + 1 + afl as usize;
            self.0.get(offset..)
        } else {
            self.0.get(4..)
        }
    }

    /// ペイロードを前のユニットに属する部分と新たなユニットの部分に分割して返す。
    ///
    /// ペイロードユニット開始インジケーターが立っている場合、先頭のポインターバイトを
    /// 解釈して`(前のユニットの残り, 新たなユニット)`を返す。ただしペイロードが
    /// PES開始コードプリフィックス（`00 00 01`）で始まる場合、ポインターバイトは
    /// 存在しないためペイロード全体を新たなユニットとして返す。
    ///
    /// インジケーターが立っていない場合、ペイロード全体が前のユニットの続きであり
    /// `(ペイロード, 空)`を返す。
    ///
    /// ポインターバイトがペイロードの残りの長さを超える場合など、
    /// 分割できない場合は両方とも空となる。
    pub fn payload_units(&self) -> (&[u8], &[u8]) {
        const EMPTY: &[u8] = &[];

        let Some(payload) = self.payload() else {
            return (EMPTY, EMPTY);
        };
        if !self.unit_start_indicator() {
            return (payload, EMPTY);
        }
        if payload.starts_with(&PES_PREFIX) {
            return (EMPTY, payload);
        }

        let Some((&pointer, rest)) = payload.split_first() else {
            return (EMPTY, EMPTY);
        };
        match crate::utils::SliceExt::split_at_checked(rest, pointer as usize) {
            Some((prev, next)) => (prev, next),
            None => {
                log::debug!(
                    "pointer_field out of range: pid={:?}, pointer={}, len={}",
                    self.pid(),
                    pointer,
                    rest.len(),
                );
                (EMPTY, EMPTY)
            }
        }
    }

    /// 前回の連続性指標である`last_cc`を元にパケット順の正当性を確認する。
    ///
    /// `last_cc`の初期値は`0x10`以上とする。
    pub fn validate_cc(&self, last_cc: &mut u8) -> bool {
        let pid = self.pid();
        let cc = if self.has_payload() {
            self.continuity_counter()
        } else {
            0x10
        };
        let is_discontinuity = self
            .adaptation_field()
            .map_or(false, |af| af.discontinuity_indicator());
        let cc_ok = pid == Pid::NULL
            || is_discontinuity
            || cc >= 0x10
            || *last_cc >= 0x10
            || (*last_cc + 1) & 0x0F == cc;
        *last_cc = cc;

        cc_ok
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Packet")
            .field("sync_byte", &self.sync_byte())
            .field("error_indicator", &self.error_indicator())
            .field("unit_start_indicator", &self.unit_start_indicator())
            .field("priority", &self.priority())
            .field("pid", &self.pid())
            .field("scrambling_control", &self.scrambling_control())
            .field("adaptation_field_control", &self.adaptation_field_control())
            .field("continuity_counter", &self.continuity_counter())
            .finish_non_exhaustive()
    }
}

/// TSパケット内のアダプテーションフィールド。
#[derive(Debug)]
pub struct AdaptationField<'a>(&'a [u8]);

impl<'a> AdaptationField<'a> {
    #[inline]
    fn new(packet: &'a Packet) -> Option<AdaptationField<'a>> {
        packet
            .adaptation_field_length()
            .filter(|&length| length >= 1)
            .and_then(|length| packet.0.get(5..5 + length as usize))
            .map(AdaptationField)
    }

    /// 不連続性インジケーターを返す。
    #[inline]
    pub fn discontinuity_indicator(&self) -> bool {
        // Safety: 生成時に確認済み
        unsafe { crate::utils::assume!(self.0.len() >= 1) }

        self.0[0] & 0b10000000 != 0
    }

    /// ランダムアクセスインジケーターを返す。
    #[inline]
    pub fn random_access_indicator(&self) -> bool {
        // Safety: 生成時に確認済み
        unsafe { crate::utils::assume!(self.0.len() >= 1) }

        self.0[0] & 0b01000000 != 0
    }

    /// エレメンタリーストリーム優先度インジケーターを返す。
    #[inline]
    pub fn es_priority_indicator(&self) -> bool {
        // Safety: 生成時に確認済み
        unsafe { crate::utils::assume!(self.0.len() >= 1) }

        self.0[0] & 0b00100000 != 0
    }

    /// PCRフラグを返す。
    #[inline]
    pub fn pcr_flag(&self) -> bool {
        // Safety: 生成時に確認済み
        unsafe { crate::utils::assume!(self.0.len() >= 1) }

        self.0[0] & 0b00010000 != 0
    }

    /// オリジナルPCRフラグを返す。
    #[inline]
    pub fn original_pcr_flag(&self) -> bool {
        // Safety: 生成時に確認済み
        unsafe { crate::utils::assume!(self.0.len() >= 1) }

        self.0[0] & 0b00001000 != 0
    }

    /// 編集点フラグを返す。
    #[inline]
    pub fn splicing_point_flag(&self) -> bool {
        // Safety: 生成時に確認済み
        unsafe { crate::utils::assume!(self.0.len() >= 1) }

        self.0[0] & 0b00000100 != 0
    }

    /// プライベートデータフラグを返す。
    #[inline]
    pub fn private_data_flag(&self) -> bool {
        // Safety: 生成時に確認済み
        unsafe { crate::utils::assume!(self.0.len() >= 1) }

        self.0[0] & 0b00000010 != 0
    }

    fn pcr_offset(&self) -> Option<usize> {
        if !self.pcr_flag() {
            None
        } else {
            Some(1)
        }
    }

    fn opcr_offset(&self) -> Option<usize> {
        if !self.original_pcr_flag() {
            None
        } else if self.pcr_flag() {
            Some(1 + 6)
        } else {
            Some(1)
        }
    }

    fn splice_countdown_offset(&self) -> Option<usize> {
        if !self.splicing_point_flag() {
            None
        } else if self.pcr_flag() && self.original_pcr_flag() {
            Some(1 + 6 + 6)
        } else if self.pcr_flag() || self.original_pcr_flag() {
            Some(1 + 6)
        } else {
            Some(1)
        }
    }

    fn private_data_offset(&self) -> Option<usize> {
        if !self.private_data_flag() {
            None
        } else {
            Some(
                1 + if self.pcr_flag() { 6 } else { 0 }
                    + if self.original_pcr_flag() { 6 } else { 0 }
                    + if self.splicing_point_flag() { 1 } else { 0 },
            )
        }
    }

    /// PCRを返す。
    pub fn pcr(&self) -> Option<Timestamp> {
        self.pcr_offset()
            .and_then(|offset| self.0.get(offset..offset + 6))
            .map(|slice| Timestamp::read_pcr(slice.try_into().unwrap()))
    }

    /// オリジナルPCRを返す。
    pub fn original_pcr(&self) -> Option<Timestamp> {
        self.opcr_offset()
            .and_then(|offset| self.0.get(offset..offset + 6))
            .map(|slice| Timestamp::read_pcr(slice.try_into().unwrap()))
    }

    /// スプライスカウントダウンを返す。
    pub fn splice_countdown(&self) -> Option<u8> {
        self.splice_countdown_offset()
            .and_then(|offset| self.0.get(offset))
            .copied()
    }

    /// プライベートデータを返す。
    pub fn private_data(&self) -> Option<&[u8]> {
        let offset = self.private_data_offset()?;
        let len = *self.0.get(offset)?;
        self.0.get(offset + 1..offset + 1 + len as usize)
    }
}

/// [`Packet::iter`]から返される。TSパケットを順次読み込むイテレーター。
#[derive(Debug)]
pub struct PacketIter<R> {
    r: R,
}

impl<R: Read> Iterator for PacketIter<R> {
    type Item = io::Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        Packet::read(&mut self.r).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // ariblibのテストより。PATを1セクション含むパケット。
    const PACKET_PAT: Packet = Packet(hex_literal::hex!(
        "
47 60 00 1B 00 00 B0 1D 7E 87 D9 00 00 00 00 E0
10 5C 38 E1 01 5C 39 E1 02 5D B8 FF C8 5D B9 FF
C9 90 3F 0A 85 FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF
"
    ));
    // アダプテーションフィールドのみでPCRを含むパケット。
    const PACKET_PCR: Packet = Packet(hex_literal::hex!(
        "
47 01 11 20 B7 10 D2 2D 74 82 80 F9 FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF FF
FF FF FF FF FF FF FF FF FF FF FF FF
"
    ));

    #[test]
    fn test_packet_read() {
        for packet in [PACKET_PAT.clone(), PACKET_PCR.clone()] {
            let pkt: &[u8] = &packet.0;

            assert_matches!(Packet::read(&mut &pkt[..0]), Ok(None));
            // 端数はエラー
            assert_matches!(
                Packet::read(&mut &pkt[..100]),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof
            );
            assert_eq!(Packet::read(&mut &*pkt).unwrap(), Some(packet.clone()));

            // ゴミの後のパケットには再同期する
            let mut stream = &*[&[0x00_u8; 188] as &[u8], pkt, pkt].concat();
            assert_eq!(Packet::read(&mut stream).unwrap(), Some(packet.clone()));
            assert_eq!(Packet::read(&mut stream).unwrap(), Some(packet.clone()));

            let mut stream = &*[&[0x00_u8; 17] as &[u8], &[SYNC_BYTE, 1], pkt, pkt].concat();
            assert_eq!(Packet::read(&mut stream).unwrap(), Some(packet.clone()));
        }
    }

    #[test]
    fn test_packet_read_err() {
        struct ReadErr(io::ErrorKind);
        impl Read for ReadErr {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(self.0.into())
            }
        }

        assert_matches!(
            Packet::read(ReadErr(io::ErrorKind::BrokenPipe)),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe
        );
    }

    #[test]
    fn test_packet_abnormal() {
        macro_rules! packet {
            ($($part:expr),*$(,)?) => {{
                Packet([
                    $(
                        std::convert::identity::<&[u8]>(&$part),
                    )*
                ].concat().try_into().unwrap())
            }};
        }

        let packet = packet!([0x00], [0; 187]);
        assert_eq!(packet.sync_byte(), 0x00);
        assert!(!packet.is_normal());

        let packet = packet!([SYNC_BYTE, 0b10000000], [0; 186]);
        assert!(packet.error_indicator());
        assert!(!packet.is_normal());

        for pid in 0x0002..=0x000F {
            let [hi, lo] = u16::to_be_bytes(pid);
            let packet = packet!([SYNC_BYTE, hi, lo], [0; 185]);
            assert_eq!(packet.pid().get(), pid);
            assert!(!packet.is_normal());
        }

        let packet = packet!([SYNC_BYTE, 0x00, 0x00, 0b01000000], [0; 184]);
        assert_eq!(packet.scrambling_control(), 0b01);
        assert!(!packet.is_normal());

        let packet = packet!([SYNC_BYTE, 0x00, 0x00, 0b00000000], [0; 184]);
        assert_eq!(packet.adaptation_field_control(), 0b00);
        assert!(!packet.is_normal());
        let packet = packet!([SYNC_BYTE, 0x00, 0x00, 0b00100000, 184], [0; 183]);
        assert!(!packet.is_normal());
        let packet = packet!([SYNC_BYTE, 0x00, 0x00, 0b00110000, 183], [0; 183]);
        assert!(!packet.is_normal());
    }

    #[test]
    fn test_packet_accessor() {
        assert!(PACKET_PAT.is_normal());
        assert!(!PACKET_PAT.error_indicator());
        assert!(PACKET_PAT.unit_start_indicator());
        assert!(!PACKET_PAT.priority());
        assert_eq!(PACKET_PAT.pid(), Pid::PAT);
        assert_eq!(PACKET_PAT.scrambling_control(), 0b00);
        assert!(!PACKET_PAT.is_scrambled());
        assert_eq!(PACKET_PAT.adaptation_field_control(), 0b01);
        assert_eq!(PACKET_PAT.continuity_counter(), 11);

        assert_eq!(PACKET_PAT.adaptation_field_length(), None);
        assert_matches!(PACKET_PAT.adaptation_field(), None);
        assert_eq!(PACKET_PAT.payload(), Some(&PACKET_PAT.0[4..]));

        //

        assert!(PACKET_PCR.is_normal());
        assert!(!PACKET_PCR.unit_start_indicator());
        assert_eq!(PACKET_PCR.pid(), Pid::new(0x0111));
        assert_eq!(PACKET_PCR.adaptation_field_control(), 0b10);
        assert_eq!(PACKET_PCR.continuity_counter(), 0);

        assert_eq!(PACKET_PCR.adaptation_field_length(), Some(183));
        let af = PACKET_PCR.adaptation_field().unwrap();
        assert!(!af.discontinuity_indicator());
        assert!(!af.random_access_indicator());
        assert!(!af.es_priority_indicator());
        assert_eq!(af.pcr(), Some(Timestamp::new(7052388613, 249)));
        assert!(af.original_pcr().is_none());
        assert!(af.splice_countdown().is_none());
        assert!(af.private_data().is_none());

        assert_eq!(PACKET_PCR.payload(), None);
    }

    #[test]
    fn test_payload_units() {
        // PID抽出とポインターバイトによる分割
        let mut data = [0xAA_u8; PACKET_SIZE];
        data[..5].copy_from_slice(&[0x47, 0x61, 0x01, 0b00010000, 3]);
        let packet = Packet(data);
        assert_eq!(packet.pid(), Pid::new(0x0101));
        let (prev, next) = packet.payload_units();
        assert_eq!(prev, &packet.0[5..8]);
        assert_eq!(next, &packet.0[8..]);

        // ポインターバイト0
        let mut data = [0xAA_u8; PACKET_SIZE];
        data[..5].copy_from_slice(&[0x47, 0x40, 0x00, 0b00010000, 0]);
        let packet = Packet(data);
        let (prev, next) = packet.payload_units();
        assert!(prev.is_empty());
        assert_eq!(next, &packet.0[5..]);

        // インジケーターなしは全体が継続
        let mut data = [0xAA_u8; PACKET_SIZE];
        data[..4].copy_from_slice(&[0x47, 0x00, 0x00, 0b00010000]);
        let packet = Packet(data);
        let (prev, next) = packet.payload_units();
        assert_eq!(prev, &packet.0[4..]);
        assert!(next.is_empty());

        // PES開始コードプリフィックスの例外
        let mut data = [0xAA_u8; PACKET_SIZE];
        data[..7].copy_from_slice(&[0x47, 0x41, 0x00, 0b00010000, 0x00, 0x00, 0x01]);
        let packet = Packet(data);
        let (prev, next) = packet.payload_units();
        assert!(prev.is_empty());
        assert_eq!(next, &packet.0[4..]);

        // ポインターバイトが範囲外
        let mut data = [0xAA_u8; PACKET_SIZE];
        data[..5].copy_from_slice(&[0x47, 0x40, 0x00, 0b00010000, 0xFF]);
        let packet = Packet(data);
        let (prev, next) = packet.payload_units();
        assert!(prev.is_empty());
        assert!(next.is_empty());

        // ペイロードなし
        let (prev, next) = PACKET_PCR.payload_units();
        assert!(prev.is_empty());
        assert!(next.is_empty());
    }

    #[test]
    fn test_validate_cc() {
        let mut data = [0x00_u8; PACKET_SIZE];
        data[..4].copy_from_slice(&[0x47, 0x00, 0x10, 0b00010000]);
        let mut last_cc = 0x10;
        for cc in 0..=0x0F_u8 {
            data[3] = 0b00010000 | cc;
            assert!(Packet(data).validate_cc(&mut last_cc));
        }
        // 欠落を検知
        data[3] = 0b00010000 | 0x05;
        assert!(!Packet(data).validate_cc(&mut last_cc));
    }

    #[test]
    fn test_packet_iter() {
        let data = [PACKET_PAT.0, PACKET_PCR.0].concat();
        let mut iter = Packet::iter(&*data);
        assert_eq!(iter.next().unwrap().unwrap(), PACKET_PAT);
        assert_eq!(iter.next().unwrap().unwrap(), PACKET_PCR);
        assert_matches!(iter.next(), None);
    }
}
