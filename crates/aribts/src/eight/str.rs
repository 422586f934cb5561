//! 8単位符号の文字列表現。

use std::borrow::Borrow;
use std::fmt;
use std::ops;

use super::decode::{DecodeError, Decoder};
use super::gaiji::GaijiTable;

/// 借用された8単位符号を表す型。
///
/// `AribStr`と[`AribString`]は、<code>&[str]</code>と[`String`]の関係と相似しており、
/// 前者は借用された参照、後者は所有権を持つ文字列である。
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AribStr([u8]);

impl AribStr {
    /// バイト列から`AribStr`を生成する。
    #[must_use]
    #[inline]
    pub const fn from_bytes(bytes: &[u8]) -> &AribStr {
        unsafe { &*(bytes as *const [u8] as *const AribStr) }
    }

    /// この文字列の長さを返す。
    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// この文字列が空であるかどうかを返す。
    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 文字列スライスをバイトスライスに変換する。
    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 8単位符号を復号して`String`に変換する。
    ///
    /// 外字は`gaiji`に従って置き換えられ、未登録の外字は`??`になる。
    /// 文字の途中で符号列が尽きた場合はエラーとせず、そこまでの文字列を返す。
    pub fn to_string(&self, gaiji: &GaijiTable) -> Result<String, DecodeError> {
        Decoder::new(self.as_bytes()).decode(gaiji)
    }

    /// 8単位符号を復号し、番組情報の記号を分離した`String`の組を返す。
    ///
    /// 戻り値は`(記号以外, 記号)`の組。
    pub fn to_string_split(&self, gaiji: &GaijiTable) -> Result<(String, String), DecodeError> {
        Decoder::new(self.as_bytes()).decode_split(gaiji)
    }
}

impl Default for &AribStr {
    fn default() -> Self {
        AribStr::from_bytes(&[])
    }
}

impl fmt::Debug for AribStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AribStr(")?;
        f.debug_list()
            .entries(self.0.iter().map(|c| crate::utils::UpperHex(c)))
            .finish()?;
        f.write_str(")")
    }
}

impl AsRef<AribStr> for AribStr {
    #[inline]
    fn as_ref(&self) -> &AribStr {
        self
    }
}

impl ToOwned for AribStr {
    type Owned = AribString;

    #[inline]
    fn to_owned(&self) -> AribString {
        AribString(self.as_bytes().to_vec())
    }
}

/// 所有権を持つ8単位符号を表す型。
///
/// `AribString`と<code>&[AribStr]</code>は、[`String`]と<code>&[str]</code>の関係と相似しており、
/// 前者は所有権を持つ文字列、後者は借用された参照である。
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AribString(Vec<u8>);

impl AribString {
    /// 空の`AribString`を生成する。
    #[inline]
    #[must_use]
    pub const fn new() -> AribString {
        AribString(Vec::new())
    }

    /// `AribString`をバイトのベクタに変換する。
    ///
    /// `AribString`を消費するため内容はコピーされない。
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// `AribString`の内容をバイトのスライスで返す。
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &*self.0
    }

    /// 文字列全体を含む[`AribStr`]スライスを抽出する。
    #[inline]
    #[must_use]
    pub fn as_arib_str(&self) -> &AribStr {
        &**self
    }

    /// `AribString`を切り詰めて全内容を削除する。
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// 8単位符号の文字列を末尾に追加する。
    pub fn push_str(&mut self, s: &AribStr) {
        self.0.extend_from_slice(s.as_bytes());
    }
}

impl Default for AribString {
    #[inline]
    fn default() -> Self {
        AribString::new()
    }
}

impl fmt::Debug for AribString {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl ops::Deref for AribString {
    type Target = AribStr;

    #[inline]
    fn deref(&self) -> &AribStr {
        AribStr::from_bytes(&self.0)
    }
}

impl Borrow<AribStr> for AribString {
    #[inline]
    fn borrow(&self) -> &AribStr {
        self
    }
}

impl AsRef<AribStr> for AribString {
    #[inline]
    fn as_ref(&self) -> &AribStr {
        self
    }
}

impl From<&AribStr> for AribString {
    #[inline]
    fn from(s: &AribStr) -> AribString {
        s.to_owned()
    }
}

impl From<Vec<u8>> for AribString {
    #[inline]
    fn from(v: Vec<u8>) -> AribString {
        AribString(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arib_str() {
        let s = AribStr::from_bytes(&[0x46, 0x7C]);
        assert_eq!(s.len(), 2);
        assert!(!s.is_empty());
        assert_eq!(s.as_bytes(), &[0x46, 0x7C]);
        assert_eq!(s.to_string(&GaijiTable::new()).unwrap(), "日");

        let s = <&AribStr>::default();
        assert!(s.is_empty());
        assert_eq!(s.to_string(&GaijiTable::new()).unwrap(), "");
    }

    #[test]
    fn test_arib_string() {
        let mut s = AribString::new();
        assert!(s.is_empty());

        s.push_str(AribStr::from_bytes(&[0x46, 0x7C]));
        assert_eq!(s.as_bytes(), &[0x46, 0x7C]);
        assert_eq!(s.as_arib_str(), AribStr::from_bytes(&[0x46, 0x7C]));

        let owned = AribStr::from_bytes(&[0xA4]).to_owned();
        assert_eq!(owned, AribString::from(vec![0xA4]));

        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.into_bytes(), Vec::<u8>::new());
    }
}
