//! ビット列表記によるデータ構造の宣言と復号。
//!
//! PSI/SIのセクションやPESパケットは、規格書のビット列表記をそのまま写した
//! [`SyntaxDef`]の静的なテーブルとして宣言する。[`SyntaxDef::decode`]が返す
//! [`Instance`]は名前によるアクセスを提供し、フィールドの開始位置・長さ・値は
//! 初回アクセス時に計算されて以降は記憶される。
//!
//! フィールドの長さには固定ビット数のほか、先行フィールドの値（バイト単位）や
//! 実行時に評価される式を指定できる。条件付きサブ構造（[`Field::case`]）が
//! 成立している場合、そのフィールドは外側の構造から透過的に参照できる。
//!
//! # サンプル
//!
//! ```
//! use aribts::syntax::{Field, Length, SyntaxDef};
//!
//! static HEADER: SyntaxDef = SyntaxDef {
//!     name: "Header",
//!     fields: &[
//!         Field::uimsbf("tag", 8),
//!         Field::uimsbf("length", 8),
//!         Field::raw("data", Length::Field("length")),
//!     ],
//! };
//!
//! # fn main() -> Result<(), aribts::syntax::SyntaxError> {
//! let header = HEADER.decode(&[0x48_u8, 0x02, 0xAB, 0xCD] as &[u8]);
//! assert_eq!(header.uint("tag")?, 0x48);
//! assert_eq!(header.bytes("data")?, &[0xAB, 0xCD]);
//! # Ok(())
//! # }
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use thiserror::Error;

use crate::eight::str::AribStr;
use crate::time::{DateTime, MjdDate};
use crate::utils::read_bcd_digit;

/// 復号時に発生するエラー。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// バッファの終端を超えて読み取ろうとした。
    #[error("buffer exhausted while reading {length} bits at bit {index}")]
    BufferExhausted {
        /// 読み取り開始位置（ビット単位）。
        index: u64,
        /// 読み取ろうとした長さ（ビット単位）。
        length: u64,
    },
    /// 指定された名前のフィールドが存在しない。
    #[error("unknown field: {0}")]
    UnknownField(&'static str),
}

/// `buf`のビット位置`index`から`length`ビットを符号なし整数として読み取る。
///
/// ビット位置はバッファ先頭からMSBファーストで数える。`length`は64以下で
/// なければならない。バッファが足りない場合は
/// [`SyntaxError::BufferExhausted`]を返す。
pub fn read_bits(buf: &[u8], index: u64, length: u64) -> Result<u64, SyntaxError> {
    debug_assert!(length <= 64);
    if length == 0 {
        return Ok(0);
    }

    let block = (index / 8) as usize;
    let bitstart = index % 8;
    let pos = 8 - bitstart;
    if length + bitstart <= 8 {
        // 1バイトに収まる場合はマスクとシフトで取り出す
        let byte = *buf
            .get(block)
            .ok_or(SyntaxError::BufferExhausted { index, length })? as u64;
        let shift = pos - length;
        let filter = (1 << pos) - (1 << shift);
        Ok((byte & filter) >> shift)
    } else {
        // バイト境界をまたぐ場合は上位と下位に分けて読む
        let high = read_bits(buf, index, pos)?;
        let low = read_bits(buf, index + pos, length - pos)?;
        Ok((high << (length - pos)) | low)
    }
}

/// 長さや回数を実行時に評価する式。
pub type ExprFn = fn(&Instance) -> Result<u64, SyntaxError>;

/// 条件付きサブ構造の有効条件。
pub type CondFn = fn(&Instance) -> Result<bool, SyntaxError>;

/// フィールドの長さ指定。
#[derive(Debug, Clone, Copy)]
pub enum Length {
    /// 固定ビット数。
    Bits(u64),
    /// 先行フィールドの値をバイト数として解釈する。
    Field(&'static str),
    /// 式の評価結果をバイト数として解釈する。
    Expr(ExprFn),
    /// サブ構造の内容から自動で決まる。
    Auto,
}

/// 繰り返し回数の指定。
#[derive(Debug, Clone, Copy)]
pub enum Count {
    /// 固定回数。
    Times(u64),
    /// 先行フィールドの値を回数として解釈する。
    Field(&'static str),
    /// 式の評価結果を回数として解釈する。
    Expr(ExprFn),
}

/// フィールドの種別。
#[derive(Debug, Clone, Copy)]
enum FieldKind {
    /// 符号なし整数（MSBファースト）。
    Uimsbf,
    /// ビット列（左詰め）。
    Bslbf,
    /// CRC等の剰余。
    Rpchof,
    /// 生のバイト列。
    Raw,
    /// 8単位符号の文字列。
    Text,
    /// Latin-1の文字列。
    Latin,
    /// 修正ユリウス日とBCDによる日付時刻。
    Mjd,
    /// BCDによる時刻。
    BcdTime,
    /// バイト長で区切られたサブ構造の繰り返し。
    Loop(&'static SyntaxDef),
    /// 回数で区切られたサブ構造の繰り返し。
    Times(&'static SyntaxDef, Count),
    /// 条件付きサブ構造。
    Case(&'static SyntaxDef, CondFn),
}

/// 構造を構成する1つのフィールド。
#[derive(Debug, Clone, Copy)]
pub struct Field {
    name: &'static str,
    kind: FieldKind,
    len: Length,
}

impl Field {
    /// 符号なし整数（uimsbf）のフィールドを宣言する。
    #[inline]
    pub const fn uimsbf(name: &'static str, bits: u64) -> Field {
        Field {
            name,
            kind: FieldKind::Uimsbf,
            len: Length::Bits(bits),
        }
    }

    /// ビット列（bslbf）のフィールドを宣言する。値は整数として読み取れる。
    #[inline]
    pub const fn bslbf(name: &'static str, bits: u64) -> Field {
        Field {
            name,
            kind: FieldKind::Bslbf,
            len: Length::Bits(bits),
        }
    }

    /// CRC等の剰余（rpchof）のフィールドを宣言する。
    #[inline]
    pub const fn rpchof(name: &'static str, bits: u64) -> Field {
        Field {
            name,
            kind: FieldKind::Rpchof,
            len: Length::Bits(bits),
        }
    }

    /// 生のバイト列のフィールドを宣言する。
    #[inline]
    pub const fn raw(name: &'static str, len: Length) -> Field {
        Field {
            name,
            kind: FieldKind::Raw,
            len,
        }
    }

    /// 8単位符号の文字列フィールドを宣言する。
    #[inline]
    pub const fn text(name: &'static str, len: Length) -> Field {
        Field {
            name,
            kind: FieldKind::Text,
            len,
        }
    }

    /// Latin-1の文字列フィールドを宣言する。
    #[inline]
    pub const fn latin(name: &'static str, len: Length) -> Field {
        Field {
            name,
            kind: FieldKind::Latin,
            len,
        }
    }

    /// 修正ユリウス日とBCDによる日付時刻フィールドを宣言する。
    ///
    /// `bits`は16（日付のみ）または40（日付と時刻）。
    #[inline]
    pub const fn mjd(name: &'static str, bits: u64) -> Field {
        Field {
            name,
            kind: FieldKind::Mjd,
            len: Length::Bits(bits),
        }
    }

    /// BCDによる時刻フィールドを宣言する。
    ///
    /// `bits`は24（時分秒）または40（時分秒とミリ秒）。
    #[inline]
    pub const fn bcd_time(name: &'static str, bits: u64) -> Field {
        Field {
            name,
            kind: FieldKind::BcdTime,
            len: Length::Bits(bits),
        }
    }

    /// バイト長で区切られたサブ構造の繰り返しを宣言する。
    #[inline]
    pub const fn byte_loop(name: &'static str, def: &'static SyntaxDef, len: Length) -> Field {
        Field {
            name,
            kind: FieldKind::Loop(def),
            len,
        }
    }

    /// 回数で区切られたサブ構造の繰り返しを宣言する。
    #[inline]
    pub const fn times(name: &'static str, def: &'static SyntaxDef, count: Count) -> Field {
        Field {
            name,
            kind: FieldKind::Times(def, count),
            len: Length::Auto,
        }
    }

    /// 条件付きサブ構造を宣言する。
    ///
    /// `cond`が真を返す場合のみサブ構造が存在するものとして扱われ、
    /// その長さはサブ構造の内容から決まる。`cond`は同じ構造内で
    /// 解決可能なフィールドのみを参照できる。
    #[inline]
    pub const fn case(name: &'static str, def: &'static SyntaxDef, cond: CondFn) -> Field {
        Field {
            name,
            kind: FieldKind::Case(def, cond),
            len: Length::Auto,
        }
    }
}

/// ビット列表記によるデータ構造の定義。
#[derive(Debug)]
pub struct SyntaxDef {
    /// 構造の名前。
    pub name: &'static str,
    /// 宣言順のフィールド。
    pub fields: &'static [Field],
}

impl SyntaxDef {
    /// `data`を先頭から復号する[`Instance`]を生成する。
    ///
    /// 実際の読み取りは各フィールドへの初回アクセス時まで行われない。
    #[inline]
    pub fn decode(&'static self, data: impl Into<Rc<[u8]>>) -> Instance {
        Instance::new(self, data.into(), 0, None)
    }
}

#[derive(Clone)]
enum Value {
    Uint(u64),
    List(Rc<[Instance]>),
    Case(Option<Instance>),
}

struct Inner {
    def: &'static SyntaxDef,
    buf: Rc<[u8]>,
    pos: u64,
    parent: Option<Weak<Inner>>,
    lens: RefCell<Box<[Option<u64>]>>,
    values: RefCell<Box<[Option<Value>]>>,
}

/// [`SyntaxDef`]に従ってバッファを復号した構造。
///
/// 複製してもバッファや計算結果は共有される。`Instance`は単一スレッドでの
/// 使用を前提としており、スレッド間で共有することはできない。
///
/// # パニック
///
/// 各アクセサはフィールドの種別が一致しない場合（整数フィールドに対する
/// [`Instance::bytes`]など）にパニックする。種別の不一致は定義の誤りであり、
/// 実行時データによって発生することはない。
#[derive(Clone)]
pub struct Instance {
    inner: Rc<Inner>,
}

impl Instance {
    fn new(def: &'static SyntaxDef, buf: Rc<[u8]>, pos: u64, parent: Option<&Instance>) -> Instance {
        let n = def.fields.len();
        Instance {
            inner: Rc::new(Inner {
                def,
                buf,
                pos,
                parent: parent.map(|p| Rc::downgrade(&p.inner)),
                lens: RefCell::new(vec![None; n].into_boxed_slice()),
                values: RefCell::new(vec![None; n].into_boxed_slice()),
            }),
        }
    }

    pub(crate) fn with_offset(def: &'static SyntaxDef, buf: Rc<[u8]>, pos: u64) -> Instance {
        Instance::new(def, buf, pos, None)
    }

    /// この構造の定義を返す。
    #[inline]
    pub fn def(&self) -> &'static SyntaxDef {
        self.inner.def
    }

    /// この構造の開始位置（ビット単位）を返す。
    #[inline]
    pub fn position(&self) -> u64 {
        self.inner.pos
    }

    /// この構造全体のビット長を返す。
    pub fn bit_len(&self) -> Result<u64, SyntaxError> {
        Ok(self.start_of(self.inner.def.fields.len())? - self.inner.pos)
    }

    /// 指定した名前のフィールドが参照可能かどうかを返す。
    #[inline]
    pub fn has(&self, name: &'static str) -> bool {
        self.resolve(name).is_some()
    }

    /// 整数フィールドの値を返す。
    pub fn uint(&self, name: &'static str) -> Result<u64, SyntaxError> {
        let (owner, index) = self.resolve(name).ok_or(SyntaxError::UnknownField(name))?;
        owner.uint_at(index)
    }

    /// バイト列フィールドの内容を返す。
    ///
    /// バイト境界に揃っていない開始位置や端数ビットは切り捨てられる。
    pub fn bytes(&self, name: &'static str) -> Result<&[u8], SyntaxError> {
        let (owner, index) = self.resolve(name).ok_or(SyntaxError::UnknownField(name))?;
        match owner.inner.def.fields[index].kind {
            FieldKind::Raw | FieldKind::Text | FieldKind::Latin => {}
            _ => panic!("field {:?} is not a byte field", name),
        }
        let (a, b) = owner.byte_range(index)?;
        // 全インスタンスが同じバッファを共有しているため自身のバッファで切り出せる
        self.inner.buf.get(a..b).ok_or(SyntaxError::BufferExhausted {
            index: a as u64 * 8,
            length: (b - a) as u64 * 8,
        })
    }

    /// 8単位符号の文字列フィールドの内容を返す。
    pub fn text(&self, name: &'static str) -> Result<&AribStr, SyntaxError> {
        Ok(AribStr::from_bytes(self.bytes(name)?))
    }

    /// Latin-1の文字列フィールドの内容を`String`で返す。
    pub fn latin(&self, name: &'static str) -> Result<String, SyntaxError> {
        Ok(self.bytes(name)?.iter().map(|&b| b as char).collect())
    }

    /// 日付時刻フィールドの値を返す。未定義を表す全ビット1の場合は`None`を返す。
    pub fn date_time(&self, name: &'static str) -> Result<Option<DateTime>, SyntaxError> {
        let (owner, index) = self.resolve(name).ok_or(SyntaxError::UnknownField(name))?;
        match owner.inner.def.fields[index].kind {
            FieldKind::Mjd => {}
            _ => panic!("field {:?} is not a date field", name),
        }
        let (a, b) = owner.byte_range(index)?;
        let slice = self.inner.buf.get(a..b).ok_or(SyntaxError::BufferExhausted {
            index: a as u64 * 8,
            length: (b - a) as u64 * 8,
        })?;
        match *slice {
            [b0, b1, b2, b3, b4, ..] => Ok(DateTime::read_opt(&[b0, b1, b2, b3, b4])),
            [b0, b1, ..] => Ok(MjdDate::read_opt(&[b0, b1]).map(|date| DateTime {
                date,
                hour: 0,
                minute: 0,
                second: 0,
            })),
            _ => Err(SyntaxError::BufferExhausted {
                index: a as u64 * 8,
                length: 16,
            }),
        }
    }

    /// BCDによる時刻フィールドの値を返す。未定義を表す全ビット1の場合は`None`を返す。
    pub fn bcd_time(&self, name: &'static str) -> Result<Option<Duration>, SyntaxError> {
        let (owner, index) = self.resolve(name).ok_or(SyntaxError::UnknownField(name))?;
        match owner.inner.def.fields[index].kind {
            FieldKind::BcdTime => {}
            _ => panic!("field {:?} is not a BCD time field", name),
        }
        let (a, b) = owner.byte_range(index)?;
        let slice = self.inner.buf.get(a..b).ok_or(SyntaxError::BufferExhausted {
            index: a as u64 * 8,
            length: (b - a) as u64 * 8,
        })?;
        let &[hour, minute, second, ref rest @ ..] = slice else {
            return Err(SyntaxError::BufferExhausted {
                index: a as u64 * 8,
                length: 24,
            });
        };
        if [hour, minute, second] == [0xFF; 3] {
            return Ok(None);
        }

        let secs = read_bcd_digit(hour) as u64 * 3600
            + read_bcd_digit(minute) as u64 * 60
            + read_bcd_digit(second) as u64;
        let millis = match rest {
            &[m0, m1, ..] => read_bcd_digit(m0) as u64 * 10 + (m1 >> 4) as u64,
            _ => 0,
        };
        Ok(Some(Duration::from_millis(secs * 1000 + millis)))
    }

    /// 繰り返しフィールドのサブ構造一覧を返す。
    pub fn list(&self, name: &'static str) -> Result<Rc<[Instance]>, SyntaxError> {
        let (owner, index) = self.resolve(name).ok_or(SyntaxError::UnknownField(name))?;
        owner.list_at(index)
    }

    /// 条件付きサブ構造を返す。条件が不成立の場合は`None`を返す。
    pub fn case(&self, name: &'static str) -> Result<Option<Instance>, SyntaxError> {
        let (owner, index) = self.resolve(name).ok_or(SyntaxError::UnknownField(name))?;
        owner.case_at(index)
    }

    fn parent(&self) -> Option<Instance> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Instance { inner })
    }

    /// 自身のフィールド、成立している条件分岐、親の順で`name`を探す。
    fn resolve(&self, name: &'static str) -> Option<(Instance, usize)> {
        let mut node = Some(self.clone());
        while let Some(cur) = node {
            if let Some(found) = cur.resolve_local(name) {
                return Some(found);
            }
            node = cur.parent();
        }
        None
    }

    fn resolve_local(&self, name: &'static str) -> Option<(Instance, usize)> {
        if let Some(index) = self.field_index(name) {
            return Some((self.clone(), index));
        }
        for (index, field) in self.inner.def.fields.iter().enumerate() {
            if let FieldKind::Case(..) = field.kind {
                if let Ok(Some(sub)) = self.case_at(index) {
                    if let Some(found) = sub.resolve_local(name) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.inner.def.fields.iter().position(|f| f.name == name)
    }

    /// `index`番目のフィールドの開始位置（ビット単位）を返す。
    fn start_of(&self, index: usize) -> Result<u64, SyntaxError> {
        let mut pos = self.inner.pos;
        for i in 0..index {
            pos += self.len_of(i)?;
        }
        Ok(pos)
    }

    /// `index`番目のフィールドのビット長を返す。結果は記憶される。
    fn len_of(&self, index: usize) -> Result<u64, SyntaxError> {
        let cached = self.inner.lens.borrow()[index];
        if let Some(len) = cached {
            return Ok(len);
        }

        let field = &self.inner.def.fields[index];
        let len = match field.len {
            Length::Bits(bits) => bits,
            Length::Field(name) => self.uint(name)? * 8,
            Length::Expr(f) => f(self)? * 8,
            Length::Auto => match field.kind {
                FieldKind::Case(..) => match self.case_at(index)? {
                    Some(sub) => sub.bit_len()?,
                    None => 0,
                },
                FieldKind::Times(..) => {
                    let mut len = 0;
                    for item in self.list_at(index)?.iter() {
                        len += item.bit_len()?;
                    }
                    len
                }
                _ => panic!("field {:?} has no length", field.name),
            },
        };
        self.inner.lens.borrow_mut()[index] = Some(len);
        Ok(len)
    }

    fn byte_range(&self, index: usize) -> Result<(usize, usize), SyntaxError> {
        let start = self.start_of(index)?;
        let len = self.len_of(index)?;
        let a = (start / 8) as usize;
        Ok((a, a + (len / 8) as usize))
    }

    fn uint_at(&self, index: usize) -> Result<u64, SyntaxError> {
        let cached = self.inner.values.borrow()[index].clone();
        if let Some(Value::Uint(v)) = cached {
            return Ok(v);
        }

        let field = &self.inner.def.fields[index];
        match field.kind {
            FieldKind::Uimsbf | FieldKind::Bslbf | FieldKind::Rpchof => {}
            _ => panic!("field {:?} is not an integer field", field.name),
        }
        let start = self.start_of(index)?;
        let len = self.len_of(index)?;
        assert!(len <= 64, "field {:?} does not fit in u64", field.name);

        let v = read_bits(&self.inner.buf, start, len)?;
        self.inner.values.borrow_mut()[index] = Some(Value::Uint(v));
        Ok(v)
    }

    fn case_at(&self, index: usize) -> Result<Option<Instance>, SyntaxError> {
        let cached = self.inner.values.borrow()[index].clone();
        if let Some(Value::Case(sub)) = cached {
            return Ok(sub);
        }

        let field = &self.inner.def.fields[index];
        let FieldKind::Case(def, cond) = field.kind else {
            panic!("field {:?} is not a case field", field.name);
        };
        let sub = if cond(self)? {
            let start = self.start_of(index)?;
            Some(Instance::new(def, self.inner.buf.clone(), start, Some(self)))
        } else {
            None
        };
        self.inner.values.borrow_mut()[index] = Some(Value::Case(sub.clone()));
        Ok(sub)
    }

    fn list_at(&self, index: usize) -> Result<Rc<[Instance]>, SyntaxError> {
        let cached = self.inner.values.borrow()[index].clone();
        if let Some(Value::List(items)) = cached {
            return Ok(items);
        }

        let field = &self.inner.def.fields[index];
        let start = self.start_of(index)?;
        let mut items = Vec::new();
        match field.kind {
            FieldKind::Loop(def) => {
                let end = start + self.len_of(index)?;
                let mut pos = start;
                while pos < end {
                    let item = Instance::new(def, self.inner.buf.clone(), pos, Some(self));
                    let len = item.bit_len()?;
                    if len == 0 {
                        break;
                    }
                    pos += len;
                    items.push(item);
                }
            }
            FieldKind::Times(def, count) => {
                let n = match count {
                    Count::Times(n) => n,
                    Count::Field(name) => self.uint(name)?,
                    Count::Expr(f) => f(self)?,
                };
                let mut pos = start;
                for _ in 0..n {
                    let item = Instance::new(def, self.inner.buf.clone(), pos, Some(self));
                    pos += item.bit_len()?;
                    items.push(item);
                }
            }
            _ => panic!("field {:?} is not a loop field", field.name),
        }

        let items: Rc<[Instance]> = items.into();
        self.inner.values.borrow_mut()[index] = Some(Value::List(items.clone()));
        Ok(items)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Instance({} @ bit {})",
            self.inner.def.name, self.inner.pos
        )
    }
}
