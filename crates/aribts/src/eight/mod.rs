//! ARIB STD-B24における8単位符号。
//!
//! 8単位符号はISO/IEC 2022と同様にG0～G3の符号集合と
//! エスケープシーケンスによる指示・呼び出しで構成される。
//! [`AribStr`]が保持する符号列を[`Decoder`]が状態機械として解釈し、
//! 外字は[`GaijiTable`]を通してUnicodeに置き換える。

pub mod decode;
pub mod gaiji;
pub mod str;

pub use decode::{DecodeError, Decoder};
pub use gaiji::GaijiTable;
pub use self::str::{AribStr, AribString};
