//! 記述子の解析。
//!
//! PMTやSDTの記述子ループは[`DescriptorRegistry`]で解析する。登録済みのタグは
//! [`SyntaxDef`]に従って復号でき、未登録のタグは生のバイト列として取り出せる。
//! 利用側は[`DescriptorRegistry::register`]で独自の記述子を追加できる。

use std::fmt;
use std::rc::Rc;

use fxhash::FxHashMap;

use crate::syntax::{Field, Instance, Length, SyntaxDef};

/// サービス記述子（ARIB STD-B10 第2部 6.2.13）。
pub static SERVICE_DESCRIPTOR: SyntaxDef = SyntaxDef {
    name: "ServiceDescriptor",
    fields: &[
        Field::uimsbf("descriptor_tag", 8),
        Field::uimsbf("descriptor_length", 8),
        Field::uimsbf("service_type", 8),
        Field::uimsbf("service_provider_name_length", 8),
        Field::text(
            "service_provider_name",
            Length::Field("service_provider_name_length"),
        ),
        Field::uimsbf("service_name_length", 8),
        Field::text("service_name", Length::Field("service_name_length")),
    ],
};

/// 短形式イベント記述子（ARIB STD-B10 第2部 6.2.15）。
pub static SHORT_EVENT_DESCRIPTOR: SyntaxDef = SyntaxDef {
    name: "ShortEventDescriptor",
    fields: &[
        Field::uimsbf("descriptor_tag", 8),
        Field::uimsbf("descriptor_length", 8),
        Field::latin("ISO_639_language_code", Length::Bits(24)),
        Field::uimsbf("event_name_length", 8),
        Field::text("event_name", Length::Field("event_name_length")),
        Field::uimsbf("text_length", 8),
        Field::text("text", Length::Field("text_length")),
    ],
};

/// ストリーム識別記述子（ARIB STD-B10 第2部 6.2.16）。
pub static STREAM_IDENTIFIER_DESCRIPTOR: SyntaxDef = SyntaxDef {
    name: "StreamIdentifierDescriptor",
    fields: &[
        Field::uimsbf("descriptor_tag", 8),
        Field::uimsbf("descriptor_length", 8),
        Field::uimsbf("component_tag", 8),
    ],
};

/// タグから記述子の構造定義を引くための登録簿。
#[derive(Debug, Clone)]
pub struct DescriptorRegistry {
    map: FxHashMap<u8, &'static SyntaxDef>,
}

impl DescriptorRegistry {
    /// 組み込みの記述子が登録された登録簿を生成する。
    #[must_use]
    pub fn new() -> DescriptorRegistry {
        let mut registry = DescriptorRegistry::empty();
        registry.register(0x48, &SERVICE_DESCRIPTOR);
        registry.register(0x4D, &SHORT_EVENT_DESCRIPTOR);
        registry.register(0x52, &STREAM_IDENTIFIER_DESCRIPTOR);
        registry
    }

    /// 何も登録されていない登録簿を生成する。
    #[inline]
    #[must_use]
    pub fn empty() -> DescriptorRegistry {
        DescriptorRegistry {
            map: FxHashMap::default(),
        }
    }

    /// `tag`の記述子を`def`に従って復号するよう登録する。
    ///
    /// 同じタグを再登録した場合は後の登録が優先される。
    #[inline]
    pub fn register(&mut self, tag: u8, def: &'static SyntaxDef) {
        self.map.insert(tag, def);
    }

    /// 記述子ループ`data`を解析する。
    ///
    /// 長さがループの残りを超える記述子が現れた時点で解析を打ち切る。
    pub fn parse(&self, data: &[u8]) -> Vec<Descriptor> {
        let buf: Rc<[u8]> = Rc::from(data);
        let mut descriptors = Vec::new();

        let mut offset = 0;
        while offset + 2 <= buf.len() {
            let tag = buf[offset];
            let len = buf[offset + 1] as usize;
            let end = offset + 2 + len;
            if end > buf.len() {
                log::debug!("descriptor out of range: tag={:#04X}, len={}", tag, len);
                break;
            }

            descriptors.push(Descriptor {
                tag,
                def: self.map.get(&tag).copied(),
                buf: buf.clone(),
                start: offset,
                end,
            });
            offset = end;
        }
        descriptors
    }
}

impl Default for DescriptorRegistry {
    #[inline]
    fn default() -> Self {
        DescriptorRegistry::new()
    }
}

/// 記述子ループから取り出された1つの記述子。
#[derive(Clone)]
pub struct Descriptor {
    tag: u8,
    def: Option<&'static SyntaxDef>,
    buf: Rc<[u8]>,
    start: usize,
    end: usize,
}

impl Descriptor {
    /// 記述子タグを返す。
    #[inline]
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// タグと長さを除いた記述子の内容を返す。
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.start + 2..self.end]
    }

    /// この記述子のタグが登録済みかどうかを返す。
    #[inline]
    pub fn is_known(&self) -> bool {
        self.def.is_some()
    }

    /// 登録済みの構造定義に従って復号する[`Instance`]を返す。
    ///
    /// タグが未登録の場合は`None`を返す。
    pub fn instance(&self) -> Option<Instance> {
        self.def
            .map(|def| Instance::with_offset(def, self.buf.clone(), self.start as u64 * 8))
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("tag", &crate::utils::UpperHex(self.tag))
            .field("len", &(self.end - self.start - 2))
            .field("known", &self.is_known())
            .finish()
    }
}
