use std::fmt;

/// 条件`cond`が満たされていることをコンパイラに伝えるためのマクロ。
///
/// `debug_assert!`と同じようにデバッグビルドでは条件を確認するが、
/// リリースビルドでは条件が満たされない場合の動作が未定義となる。
///
/// # 安全性
///
/// 呼び出し側は`cond`が常に真であることを保証しなければならない。
macro_rules! assume {
    ($cond:expr) => {{
        let cond: bool = $cond;
        debug_assert!(cond);
        if !cond {
            std::hint::unreachable_unchecked()
        }
    }};
}
pub(crate) use assume;

/// バイト列から数値を読み取るための拡張トレイト。
pub trait BytesExt {
    /// 先頭2バイトをビッグエンディアンの`u16`として読み取る。
    ///
    /// # パニック
    ///
    /// スライスの長さが2未満の場合、このメソッドはパニックする。
    fn read_be_16(&self) -> u16;

    /// 先頭4バイトをビッグエンディアンの`u32`として読み取る。
    ///
    /// # パニック
    ///
    /// スライスの長さが4未満の場合、このメソッドはパニックする。
    fn read_be_32(&self) -> u32;
}

impl BytesExt for [u8] {
    #[inline]
    fn read_be_16(&self) -> u16 {
        u16::from_be_bytes(self[..2].try_into().unwrap())
    }

    #[inline]
    fn read_be_32(&self) -> u32 {
        u32::from_be_bytes(self[..4].try_into().unwrap())
    }
}

/// スライス操作の拡張トレイト。
pub trait SliceExt {
    /// `mid`が範囲内にある場合に限り、`mid`を境としてスライスを分割する。
    fn split_at_checked(&self, mid: usize) -> Option<(&Self, &Self)>;
}

impl<T> SliceExt for [T] {
    #[inline]
    fn split_at_checked(&self, mid: usize) -> Option<(&[T], &[T])> {
        if mid <= self.len() {
            Some(self.split_at(mid))
        } else {
            None
        }
    }
}

/// タプル構造体の内包値に数値系のフォーマットを委譲するマクロ。
macro_rules! delegate_fmt {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::fmt::Binary for $ty {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Binary::fmt(&self.0, f)
            }
        }

        impl std::fmt::Octal for $ty {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Octal::fmt(&self.0, f)
            }
        }

        impl std::fmt::LowerHex for $ty {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::LowerHex::fmt(&self.0, f)
            }
        }

        impl std::fmt::UpperHex for $ty {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::UpperHex::fmt(&self.0, f)
            }
        }
    };
}
pub(crate) use delegate_fmt;

/// 2桁のBCDを数値に変換する。
#[inline]
pub fn read_bcd_digit(b: u8) -> u8 {
    (b >> 4) * 10 + (b & 0x0F)
}

/// `{:02X}`の形式でフォーマットするための構造体。
pub struct UpperHex<T>(pub T);

impl<T: fmt::UpperHex> fmt::Debug for UpperHex<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}
