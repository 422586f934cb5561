//! 8単位符号の復号処理。

use encoding_rs::ISO_2022_JP;
use smallvec::SmallVec;

use super::gaiji::GaijiTable;

/// 8単位符号の復号で発生するエラー。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// エスケープシーケンス中に未定義のバイトが現れた。
    #[error("invalid escape sequence: step={step}, byte={byte:#04X}")]
    EscapeSequence {
        /// エスケープシーケンス中の位置（1～4）。
        step: u8,
        /// 現れたバイト。
        byte: u8,
    },
    /// 指示の終端が未定義の符号集合だった。
    #[error("unknown code set: {byte:#04X}")]
    Designation {
        /// 現れたバイト。
        byte: u8,
    },
}

/// 符号集合の種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Code {
    Kanji,
    Alphanumeric,
    Hiragana,
    Katakana,
    Mosaic,
    PropAlphanumeric,
    PropHiragana,
    PropKatakana,
    JisX0201Katakana,
    JisKanjiPlane1,
    JisKanjiPlane2,
    AdditionalSymbols,
    Drcs,
    Macro,
}

/// G0～G3に指示される符号集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeSet {
    code: Code,
    /// 1文字のバイト数（1または2）。
    bytes: u8,
}

/// 図形集合の終端符号から符号集合を引く（ARIB STD-B24 第1編 第2部 表7-3）。
fn graphic_set(byte: u8) -> Option<CodeSet> {
    let (code, bytes) = match byte {
        0x42 => (Code::Kanji, 2),
        0x4A => (Code::Alphanumeric, 1),
        0x30 => (Code::Hiragana, 1),
        0x31 => (Code::Katakana, 1),
        0x32..=0x35 => (Code::Mosaic, 1),
        0x36 => (Code::PropAlphanumeric, 1),
        0x37 => (Code::PropHiragana, 1),
        0x38 => (Code::PropKatakana, 1),
        0x49 => (Code::JisX0201Katakana, 1),
        0x39 => (Code::JisKanjiPlane1, 2),
        0x3A => (Code::JisKanjiPlane2, 2),
        0x3B => (Code::AdditionalSymbols, 2),
        _ => return None,
    };
    Some(CodeSet { code, bytes })
}

/// DRCS集合の終端符号から符号集合を引く。
fn drcs_set(byte: u8) -> Option<CodeSet> {
    let (code, bytes) = match byte {
        0x40 => (Code::Drcs, 2),
        0x41..=0x4F => (Code::Drcs, 1),
        0x70 => (Code::Macro, 1),
        _ => return None,
    };
    Some(CodeSet { code, bytes })
}

// ISO-2022-JPへ書き出す際のエスケープシーケンス
const ESC_ASCII: [u8; 3] = [0x1B, 0x28, 0x42];
const ESC_ZENKAKU: [u8; 3] = [0x1B, 0x24, 0x42];
const ESC_HANKAKU: [u8; 3] = [0x1B, 0x28, 0x49];

/// JIS X 0208にない繰り返し記号などの置き換え先（0x77～0x7E）。
///
/// ゝゞー。「」、・に対応する1区の文字へ写像する。
const HIRAGANA_EXTRA: [u8; 8] = [0x35, 0x36, 0x3C, 0x23, 0x56, 0x57, 0x22, 0x26];
/// ヽヾー。「」、・に対応する1区の文字へ写像する。
const KATAKANA_EXTRA: [u8; 8] = [0x33, 0x34, 0x3C, 0x23, 0x56, 0x57, 0x22, 0x26];

/// 変換待ちのバイト列に付いているエスケープシーケンスの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunTag {
    Ascii,
    Zenkaku,
    Hankaku,
}

impl RunTag {
    fn escape(self) -> &'static [u8; 3] {
        match self {
            RunTag::Ascii => &ESC_ASCII,
            RunTag::Zenkaku => &ESC_ZENKAKU,
            RunTag::Hankaku => &ESC_HANKAKU,
        }
    }
}

/// 8単位符号を解釈する状態機械。
///
/// 生成した直後の状態はG0＝漢字、G1＝英数、G2＝平仮名、G3＝片仮名で、
/// GL側にG0、GR側にG2が呼び出されている。
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,

    sets: [CodeSet; 4],
    left: usize,
    right: usize,
    single_shift: Option<usize>,

    /// エスケープシーケンス中の位置。0はエスケープ中でないことを表す。
    esc_step: u8,
    esc_slot: usize,
    esc_drcs: bool,

    run: SmallVec<[u8; 32]>,
    run_tag: Option<RunTag>,
    buf: String,
    symbol_buf: String,
}

impl<'a> Decoder<'a> {
    /// `data`を復号する`Decoder`を生成する。
    pub fn new(data: &'a [u8]) -> Decoder<'a> {
        const KANJI: CodeSet = CodeSet {
            code: Code::Kanji,
            bytes: 2,
        };
        const ALNUM: CodeSet = CodeSet {
            code: Code::Alphanumeric,
            bytes: 1,
        };
        const HIRAGANA: CodeSet = CodeSet {
            code: Code::Hiragana,
            bytes: 1,
        };
        const KATAKANA: CodeSet = CodeSet {
            code: Code::Katakana,
            bytes: 1,
        };

        Decoder {
            data,
            pos: 0,
            sets: [KANJI, ALNUM, HIRAGANA, KATAKANA],
            left: 0,
            right: 2,
            single_shift: None,
            esc_step: 0,
            esc_slot: 0,
            esc_drcs: false,
            run: SmallVec::new_const(),
            run_tag: None,
            buf: String::new(),
            symbol_buf: String::new(),
        }
    }

    /// 全体を復号してUnicode文字列を返す。
    ///
    /// 末尾の空白は取り除かれる。
    /// 文字の途中で符号列が尽きた場合はエラーとせず、そこまでの文字列を返す。
    pub fn decode(mut self, gaiji: &GaijiTable) -> Result<String, DecodeError> {
        self.run_all(gaiji, false)?;
        Ok(self.finish())
    }

    /// 全体を復号し、番組情報の記号を分離したUnicode文字列を返す。
    ///
    /// 戻り値は`(記号以外, 記号)`の組。[`GaijiTable`]の番組情報の記号に
    /// 登録された外字だけが後者に入る。
    pub fn decode_split(mut self, gaiji: &GaijiTable) -> Result<(String, String), DecodeError> {
        self.run_all(gaiji, true)?;
        let symbol = std::mem::take(&mut self.symbol_buf);
        Ok((self.finish(), symbol))
    }

    fn next_byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn run_all(&mut self, gaiji: &GaijiTable, split: bool) -> Result<(), DecodeError> {
        while let Some(b) = self.next_byte() {
            if self.esc_step > 0 {
                self.escape(b)?;
                continue;
            }

            match b {
                0x21..=0x7E | 0xA1..=0xFE => self.graphic(b, gaiji, split),
                // SP・HT・ARIBのSP
                0x20 | 0x09 | 0xA0 => self.push_run(RunTag::Ascii, &[0x20]),
                // CR・LF
                0x0D | 0x0A => self.push_run(RunTag::Ascii, &[0x0A]),
                // LS0・LS1
                0x0F => self.left = 0,
                0x0E => self.left = 1,
                // SS2・SS3
                0x19 => self.single_shift = Some(2),
                0x1D => self.single_shift = Some(3),
                // ESC
                0x1B => self.esc_step = 1,
                // その他の制御符号は無視する
                _ => {}
            }
        }
        Ok(())
    }

    /// GL・GR領域の1文字を消費して出力する。
    fn graphic(&mut self, first: u8, gaiji: &GaijiTable, split: bool) {
        let set = if (0x21..=0x7E).contains(&first) {
            match self.single_shift.take() {
                Some(slot) => self.sets[slot],
                None => self.sets[self.left],
            }
        } else {
            self.sets[self.right]
        };

        let mut c1 = first;
        let mut c2 = 0;
        if set.bytes == 2 {
            let Some(b) = self.next_byte() else {
                // 文字の途中で尽きたら打ち切る
                return;
            };
            c2 = b;
        }
        if c1 >= 0xA1 {
            c1 &= 0x7F;
            c2 &= 0x7F;
        }

        match set.code {
            Code::Kanji | Code::JisKanjiPlane1 | Code::JisKanjiPlane2 => {
                self.push_run(RunTag::Zenkaku, &[c1, c2]);
            }
            Code::Alphanumeric | Code::PropAlphanumeric => {
                self.push_run(RunTag::Ascii, &[c1]);
            }
            Code::Hiragana | Code::PropHiragana => {
                if c1 >= 0x77 {
                    let c = HIRAGANA_EXTRA[(c1 - 0x77) as usize];
                    self.push_run(RunTag::Zenkaku, &[0x21, c]);
                } else {
                    self.push_run(RunTag::Zenkaku, &[0x24, c1]);
                }
            }
            Code::Katakana | Code::PropKatakana => {
                if c1 >= 0x77 {
                    let c = KATAKANA_EXTRA[(c1 - 0x77) as usize];
                    self.push_run(RunTag::Zenkaku, &[0x21, c]);
                } else {
                    self.push_run(RunTag::Zenkaku, &[0x25, c1]);
                }
            }
            Code::JisX0201Katakana => self.push_run(RunTag::Hankaku, &[c1]),
            Code::AdditionalSymbols => {
                // 外字はJISを経由できないため先に変換待ちを吐き出す
                self.flush();
                let code = (c1 as u16) << 8 | c2 as u16;
                if split {
                    if let Some(s) = gaiji.get_title(code) {
                        self.symbol_buf.push_str(s);
                    } else {
                        self.buf.push_str(gaiji.get_other(code).unwrap_or("??"));
                    }
                } else {
                    self.buf.push_str(gaiji.get(code).unwrap_or("??"));
                }
            }
            Code::Mosaic | Code::Drcs | Code::Macro => {}
        }
    }

    /// エスケープシーケンスの1バイトを処理する。
    fn escape(&mut self, byte: u8) -> Result<(), DecodeError> {
        match self.esc_step {
            1 => match byte {
                // LS2・LS3
                0x6E => {
                    self.left = 2;
                    self.esc_step = 0;
                }
                0x6F => {
                    self.left = 3;
                    self.esc_step = 0;
                }
                // LS1R・LS2R・LS3R
                0x7E => {
                    self.right = 1;
                    self.esc_step = 0;
                }
                0x7D => {
                    self.right = 2;
                    self.esc_step = 0;
                }
                0x7C => {
                    self.right = 3;
                    self.esc_step = 0;
                }
                0x24 | 0x28 => self.set_escape(0),
                0x29 => self.set_escape(1),
                0x2A => self.set_escape(2),
                0x2B => self.set_escape(3),
                _ => return Err(DecodeError::EscapeSequence { step: 1, byte }),
            },
            2 => match byte {
                0x20 => {
                    self.esc_drcs = true;
                    self.esc_step = 3;
                }
                0x28 => self.set_escape(0),
                0x29 => self.set_escape(1),
                0x2A => self.set_escape(2),
                0x2B => self.set_escape(3),
                _ => self.designate(byte)?,
            },
            3 => match byte {
                0x20 => {
                    self.esc_drcs = true;
                    self.esc_step = 4;
                }
                _ => self.designate(byte)?,
            },
            _ => self.designate(byte)?,
        }
        Ok(())
    }

    fn set_escape(&mut self, slot: usize) {
        self.esc_slot = slot;
        self.esc_drcs = false;
        self.esc_step += 1;
    }

    /// 終端符号`byte`の符号集合を指示対象のバッファへ指示する。
    fn designate(&mut self, byte: u8) -> Result<(), DecodeError> {
        let set = if self.esc_drcs {
            drcs_set(byte)
        } else {
            graphic_set(byte)
        };
        let set = set.ok_or(DecodeError::Designation { byte })?;

        self.sets[self.esc_slot] = set;
        self.esc_step = 0;
        Ok(())
    }

    fn push_run(&mut self, tag: RunTag, bytes: &[u8]) {
        if self.run_tag != Some(tag) {
            self.run.extend_from_slice(tag.escape());
            self.run_tag = Some(tag);
        }
        self.run.extend_from_slice(bytes);
    }

    /// 変換待ちのバイト列をISO-2022-JPとして復号して吐き出す。
    fn flush(&mut self) {
        if self.run.is_empty() {
            return;
        }

        let (text, _, _) = ISO_2022_JP.decode(&self.run);
        self.buf.push_str(&text);
        self.run.clear();
        self.run_tag = None;
    }

    fn finish(mut self) -> String {
        self.flush();

        let mut buf = self.buf;
        buf.truncate(buf.trim_end().len());
        buf
    }
}
