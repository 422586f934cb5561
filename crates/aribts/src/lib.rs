//! ARIBに基づいたMPEG2-TSを解析するためのクレート。
//!
//! TSパケットの分離、セクションの再構築、ビット列定義による構造の復号、
//! 8単位符号の文字列変換を提供する。

#![deny(missing_docs)]

pub mod desc;
pub mod eight;
pub mod packet;
pub mod pid;
pub mod section;
pub mod syntax;
pub mod table;
pub mod time;
mod utils;

pub use eight::str::{AribStr, AribString};
pub use packet::Packet;
pub use pid::Pid;
pub use section::{Section, Sections, Selector};
