//! 組み込みのセクション・PESパケット定義。
//!
//! 各定義は規格書のビット列表記をそのまま写した[`SyntaxDef`]からなる。
//! 利用側は同じ形で独自の[`SectionDef`]を宣言して[`Selector`]に登録できる。
//!
//! [`Selector`]: crate::section::Selector

use std::time::Duration;

use crate::desc::DescriptorRegistry;
use crate::pid::Pid;
use crate::section::SectionDef;
use crate::syntax::{Count, Field, Instance, Length, SyntaxDef, SyntaxError};

/// PAT（ISO/IEC 13818-1 2.4.4.3）。
pub static PAT: SectionDef = SectionDef {
    syntax: SyntaxDef {
        name: "ProgramAssociationSection",
        fields: &[
            Field::uimsbf("table_id", 8),
            Field::bslbf("section_syntax_indicator", 1),
            Field::bslbf("reserved_future_use", 1),
            Field::bslbf("reserved_1", 2),
            Field::uimsbf("section_length", 12),
            Field::uimsbf("transport_stream_id", 16),
            Field::bslbf("reserved_2", 2),
            Field::uimsbf("version_number", 5),
            Field::bslbf("current_next_indicator", 1),
            Field::uimsbf("section_number", 8),
            Field::uimsbf("last_section_number", 8),
            Field::byte_loop(
                "pids",
                &PAT_PID,
                Length::Expr(|s| Ok(s.uint("section_length")?.saturating_sub(9))),
            ),
            Field::rpchof("CRC_32", 32),
        ],
    },
    pids: &[Pid::PAT],
    table_ids: &[0x00],
    pes: false,
};

static PAT_PID: SyntaxDef = SyntaxDef {
    name: "PatPid",
    fields: &[
        Field::uimsbf("program_number", 16),
        Field::bslbf("reserved", 3),
        Field::uimsbf("program_map_PID", 13),
    ],
};

/// PMT（ISO/IEC 13818-1 2.4.4.8）。
///
/// 監視するPIDはPATから得られるため、[`Selector::add_with_pids`]で登録する。
///
/// [`Selector::add_with_pids`]: crate::section::Selector::add_with_pids
pub static PMT: SectionDef = SectionDef {
    syntax: SyntaxDef {
        name: "ProgramMapSection",
        fields: &[
            Field::uimsbf("table_id", 8),
            Field::bslbf("section_syntax_indicator", 1),
            Field::bslbf("reserved_future_use", 1),
            Field::bslbf("reserved_1", 2),
            Field::uimsbf("section_length", 12),
            Field::uimsbf("program_number", 16),
            Field::bslbf("reserved_2", 2),
            Field::uimsbf("version_number", 5),
            Field::bslbf("current_next_indicator", 1),
            Field::uimsbf("section_number", 8),
            Field::uimsbf("last_section_number", 8),
            Field::bslbf("reserved_3", 3),
            Field::uimsbf("PCR_PID", 13),
            Field::bslbf("reserved_4", 4),
            Field::uimsbf("program_info_length", 12),
            Field::raw("descriptors", Length::Field("program_info_length")),
            Field::byte_loop(
                "maps",
                &PMT_MAP,
                Length::Expr(|s| {
                    let fixed = 13 + s.uint("program_info_length")?;
                    Ok(s.uint("section_length")?.saturating_sub(fixed))
                }),
            ),
            Field::rpchof("CRC_32", 32),
        ],
    },
    pids: &[],
    table_ids: &[0x02],
    pes: false,
};

static PMT_MAP: SyntaxDef = SyntaxDef {
    name: "PmtMap",
    fields: &[
        Field::uimsbf("stream_type", 8),
        Field::bslbf("reserved_1", 3),
        Field::uimsbf("elementary_PID", 13),
        Field::bslbf("reserved_2", 4),
        Field::uimsbf("ES_info_length", 12),
        Field::raw("descriptors", Length::Field("ES_info_length")),
    ],
};

/// SDT（ARIB STD-B10 第2部 5.2.6）。
pub static SDT: SectionDef = SectionDef {
    syntax: SyntaxDef {
        name: "ServiceDescriptionSection",
        fields: &[
            Field::uimsbf("table_id", 8),
            Field::bslbf("section_syntax_indicator", 1),
            Field::bslbf("reserved_future_use_1", 1),
            Field::bslbf("reserved_1", 2),
            Field::uimsbf("section_length", 12),
            Field::uimsbf("transport_stream_id", 16),
            Field::bslbf("reserved_2", 2),
            Field::uimsbf("version_number", 5),
            Field::bslbf("current_next_indicator", 1),
            Field::uimsbf("section_number", 8),
            Field::uimsbf("last_section_number", 8),
            Field::uimsbf("original_network_id", 16),
            Field::bslbf("reserved_future_use_2", 8),
            Field::byte_loop(
                "services",
                &SDT_SERVICE,
                Length::Expr(|s| Ok(s.uint("section_length")?.saturating_sub(12))),
            ),
            Field::rpchof("CRC_32", 32),
        ],
    },
    pids: &[Pid::SDT],
    table_ids: &[0x42, 0x46],
    pes: false,
};

static SDT_SERVICE: SyntaxDef = SyntaxDef {
    name: "SdtService",
    fields: &[
        Field::uimsbf("service_id", 16),
        Field::bslbf("reserved_future_use", 3),
        Field::bslbf("EIT_user_defined_flags", 3),
        Field::bslbf("EIT_schedule_flag", 1),
        Field::bslbf("EIT_present_following_flag", 1),
        Field::uimsbf("running_status", 3),
        Field::bslbf("free_CA_mode", 1),
        Field::uimsbf("descriptors_loop_length", 12),
        Field::raw("descriptors", Length::Field("descriptors_loop_length")),
    ],
};

/// TOT（ARIB STD-B10 第2部 5.2.9）。
pub static TOT: SectionDef = SectionDef {
    syntax: SyntaxDef {
        name: "TimeOffsetSection",
        fields: &[
            Field::uimsbf("table_id", 8),
            Field::bslbf("section_syntax_indicator", 1),
            Field::bslbf("reserved_future_use", 1),
            Field::bslbf("reserved_1", 2),
            Field::uimsbf("section_length", 12),
            Field::mjd("JST_time", 40),
            Field::bslbf("reserved_2", 4),
            Field::uimsbf("descriptors_loop_length", 12),
            Field::raw("descriptors", Length::Field("descriptors_loop_length")),
            Field::rpchof("CRC_32", 32),
        ],
    },
    pids: &[Pid::TOT],
    table_ids: &[0x73],
    pes: false,
};

/// 字幕のPESパケット（ISO/IEC 13818-1 2.4.3.7、ARIB STD-B24 第1編 第3部 9）。
///
/// 監視するPIDはPMTのストリーム識別記述子から得られるため、
/// [`Selector::add_with_pids`]で登録する。
///
/// [`Selector::add_with_pids`]: crate::section::Selector::add_with_pids
pub static SPES: SectionDef = SectionDef {
    syntax: SyntaxDef {
        name: "SynchronizedPes",
        fields: &[
            Field::bslbf("packet_start_code_prefix", 24),
            Field::uimsbf("stream_id", 8),
            Field::uimsbf("PES_packet_length", 16),
            Field::bslbf("should_be_10", 2),
            Field::bslbf("PES_scrambling_control", 2),
            Field::bslbf("PES_priority", 1),
            Field::bslbf("data_alignment_indicator", 1),
            Field::bslbf("copyright", 1),
            Field::bslbf("original_or_copy", 1),
            Field::bslbf("PTS_DTS_flags", 2),
            Field::bslbf("ESCR_flag", 1),
            Field::bslbf("ES_rate_flag", 1),
            Field::bslbf("DSM_trick_mode_flag", 1),
            Field::bslbf("additional_copy_info_flag", 1),
            Field::bslbf("PES_CRC_flag", 1),
            Field::bslbf("PES_extension_flag", 1),
            Field::uimsbf("PES_header_data_length", 8),
            Field::bslbf("should_be_0010", 4),
            Field::uimsbf("PTS_1", 3),
            Field::bslbf("marker_bit_1", 1),
            Field::uimsbf("PTS_2", 15),
            Field::bslbf("marker_bit_2", 1),
            Field::uimsbf("PTS_3", 15),
            Field::bslbf("marker_bit_3", 1),
            Field::bslbf("PES_private_data_flag", 1),
            Field::bslbf("pack_header_field_flag", 1),
            Field::bslbf("program_packet_sequence_counter_flag", 1),
            Field::bslbf("P_STD_buffer_flag", 1),
            Field::bslbf("reserved_4", 3),
            Field::bslbf("PES_extension_flag_2", 1),
            Field::raw("PES_private_data", Length::Bits(128)),
            Field::raw(
                "stuffing_byte",
                Length::Expr(|s| Ok(s.uint("PES_header_data_length")?.saturating_sub(22))),
            ),
            Field::uimsbf("data_identifier", 8),
            Field::uimsbf("private_stream_id", 8),
            Field::bslbf("reserved_future_use", 4),
            Field::uimsbf("PES_data_packet_header_length", 4),
            Field::raw(
                "PES_data_private_data_byte",
                Length::Field("PES_data_packet_header_length"),
            ),
            Field::uimsbf("data_group_id", 6),
            Field::bslbf("data_group_version", 2),
            Field::uimsbf("data_group_link_number", 8),
            Field::uimsbf("last_data_group_link_number", 8),
            Field::uimsbf("data_group_size", 16),
            // 字幕管理データ（ARIB STD-B24 第1編 第3部 表9-3）
            Field::case("with_languages", &SPES_MANAGEMENT, |s| {
                Ok(matches!(s.uint("data_group_id")?, 0x00 | 0x20))
            }),
            // 字幕文データ（ARIB STD-B24 第1編 第3部 表9-10）
            Field::case("without_languages", &SPES_STATEMENT, |s| {
                Ok(!matches!(s.uint("data_group_id")?, 0x00 | 0x20))
            }),
            Field::uimsbf("data_unit_loop_length", 24),
            Field::byte_loop(
                "data_units",
                &SPES_DATA_UNIT,
                Length::Field("data_unit_loop_length"),
            ),
        ],
    },
    pids: &[],
    table_ids: &[],
    pes: true,
};

static SPES_MANAGEMENT: SyntaxDef = SyntaxDef {
    name: "CaptionManagementData",
    fields: &[
        Field::bslbf("TMD", 2),
        Field::bslbf("reserved_10", 6),
        Field::case("with_OTM", &SPES_OTM, |s| Ok(s.uint("TMD")? == 0b10)),
        Field::uimsbf("num_languages", 8),
        Field::times("languages", &SPES_LANGUAGE, Count::Field("num_languages")),
    ],
};

static SPES_OTM: SyntaxDef = SyntaxDef {
    name: "CaptionOtm",
    fields: &[Field::bcd_time("OTM", 40)],
};

static SPES_LANGUAGE: SyntaxDef = SyntaxDef {
    name: "CaptionLanguage",
    fields: &[
        Field::bslbf("language_tag", 3),
        Field::bslbf("reserved_11", 1),
        Field::bslbf("DMF1", 2),
        Field::bslbf("DMF2", 2),
        Field::case("with_DC", &SPES_DC, |s| Ok(s.uint("DMF1")? == 0b11)),
        Field::latin("ISO_639_language_code", Length::Bits(24)),
        Field::bslbf("format", 4),
        Field::bslbf("TCS", 2),
        Field::bslbf("rollup_mode", 2),
    ],
};

static SPES_DC: SyntaxDef = SyntaxDef {
    name: "CaptionDc",
    fields: &[Field::bslbf("DC", 8)],
};

static SPES_STATEMENT: SyntaxDef = SyntaxDef {
    name: "CaptionStatementData",
    fields: &[
        Field::bslbf("TMD", 2),
        Field::bslbf("reserved_10", 6),
        Field::case("with_STM", &SPES_STM, |s| {
            Ok(matches!(s.uint("TMD")?, 0b01 | 0b10))
        }),
    ],
};

static SPES_STM: SyntaxDef = SyntaxDef {
    name: "CaptionStm",
    fields: &[Field::bcd_time("STM", 40)],
};

static SPES_DATA_UNIT: SyntaxDef = SyntaxDef {
    name: "CaptionDataUnit",
    fields: &[
        Field::uimsbf("unit_separator", 8),
        Field::uimsbf("data_unit_parameter", 8),
        // 本文（8単位符号）
        Field::case("CProfileString", &SPES_C_PROFILE, |s| {
            Ok(s.uint("data_unit_parameter")? == 0x20)
        }),
        // DRCS（ARIB STD-B24 第1編 第2部 表D-1）
        Field::case("DRCSString", &SPES_DRCS, |s| {
            Ok(s.uint("data_unit_parameter")? == 0x30)
        }),
    ],
};

static SPES_C_PROFILE: SyntaxDef = SyntaxDef {
    name: "CProfileString",
    fields: &[
        Field::uimsbf("data_unit_size", 24),
        Field::text("data_unit_data", Length::Field("data_unit_size")),
    ],
};

static SPES_DRCS: SyntaxDef = SyntaxDef {
    name: "DrcsString",
    fields: &[
        Field::uimsbf("data_unit_size", 24),
        Field::uimsbf("number_of_code", 8),
        Field::times("codes", &SPES_DRCS_CODE, Count::Field("number_of_code")),
    ],
};

static SPES_DRCS_CODE: SyntaxDef = SyntaxDef {
    name: "DrcsCode",
    fields: &[
        Field::uimsbf("character_code", 16),
        Field::uimsbf("number_of_font", 8),
        Field::times("fonts", &SPES_DRCS_FONT, Count::Field("number_of_font")),
    ],
};

static SPES_DRCS_FONT: SyntaxDef = SyntaxDef {
    name: "DrcsFont",
    fields: &[
        Field::uimsbf("font_id", 4),
        Field::bslbf("mode", 4),
        Field::uimsbf("depth", 8),
        Field::uimsbf("width", 8),
        Field::uimsbf("height", 8),
        Field::times("patterns", &SPES_DRCS_PATTERN, Count::Field("height")),
    ],
};

static SPES_DRCS_PATTERN: SyntaxDef = SyntaxDef {
    name: "DrcsPattern",
    fields: &[Field::raw("pattern_data", Length::Bits(16))],
};

/// PATからPMTのPID一覧を返す。
pub fn pat_pmt_pids(pat: &Instance) -> Result<Vec<Pid>, SyntaxError> {
    let mut pids = Vec::new();
    for entry in pat.list("pids")?.iter() {
        if entry.uint("program_number")? == 0 {
            continue;
        }
        if let Some(pid) = Pid::try_new(entry.uint("program_map_PID")? as u16) {
            pids.push(pid);
        }
    }
    Ok(pids)
}

/// PATからネットワークPIDを返す。
pub fn pat_network_pid(pat: &Instance) -> Result<Option<Pid>, SyntaxError> {
    for entry in pat.list("pids")?.iter() {
        if entry.uint("program_number")? == 0 {
            return Ok(Pid::try_new(entry.uint("program_map_PID")? as u16));
        }
    }
    Ok(None)
}

/// PMTから字幕PESのPIDを返す。
///
/// stream_typeが0x06（プライベートデータ）で、ストリーム識別記述子の
/// component_tagが0x87のエレメンタリーストリームを字幕とする。
pub fn pmt_caption_pid(
    pmt: &Instance,
    registry: &DescriptorRegistry,
) -> Result<Option<Pid>, SyntaxError> {
    for map in pmt.list("maps")?.iter() {
        if map.uint("stream_type")? != 0x06 {
            continue;
        }
        for descriptor in registry.parse(map.bytes("descriptors")?) {
            if descriptor.tag() != 0x52 {
                continue;
            }
            let Some(inst) = descriptor.instance() else {
                continue;
            };
            if inst.uint("component_tag")? == 0x87 {
                return Ok(Pid::try_new(map.uint("elementary_PID")? as u16));
            }
        }
    }
    Ok(None)
}

/// 字幕PESのPTSを返す。
///
/// PTSは90kHz単位の33ビット値であり、ナノ秒未満は切り捨てられる。
pub fn spes_pts(spes: &Instance) -> Result<Duration, SyntaxError> {
    let pts =
        spes.uint("PTS_1")? << 30 | spes.uint("PTS_2")? << 15 | spes.uint("PTS_3")?;
    Ok(Duration::from_nanos(pts * 100_000 / 9))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    // ariblibのテストより
    const PAT_SECTION: [u8; 32] = hex!(
        "00 B0 1D 7E 87 D9 00 00 00 00 E0 10 5C 38 E1 01"
        "5C 39 E1 02 5D B8 FF C8 5D B9 FF C9 90 3F 0A 85"
    );

    #[test]
    fn test_pat() {
        let pat = PAT.syntax.decode(&PAT_SECTION[..]);

        assert_eq!(pat.uint("table_id").unwrap(), 0x00);
        assert_eq!(pat.uint("section_syntax_indicator").unwrap(), 1);
        assert_eq!(pat.uint("section_length").unwrap(), 29);
        assert_eq!(pat.uint("transport_stream_id").unwrap(), 0x7E87);
        assert_eq!(pat.uint("version_number").unwrap(), 0x0C);
        assert_eq!(pat.uint("current_next_indicator").unwrap(), 1);
        assert_eq!(pat.uint("section_number").unwrap(), 0);
        assert_eq!(pat.uint("last_section_number").unwrap(), 0);
        assert_eq!(pat.uint("CRC_32").unwrap(), 0x903F0A85);

        let entries = pat.list("pids").unwrap();
        assert_eq!(entries.len(), 5);
        let numbers: Vec<u64> = entries
            .iter()
            .map(|e| e.uint("program_number").unwrap())
            .collect();
        assert_eq!(numbers, [0x0000, 0x5C38, 0x5C39, 0x5DB8, 0x5DB9]);

        assert_eq!(pat_network_pid(&pat).unwrap(), Some(Pid::NIT));
        assert_eq!(
            pat_pmt_pids(&pat).unwrap(),
            [
                Pid::new(0x0101),
                Pid::new(0x0102),
                Pid::new(0x1FC8),
                Pid::new(0x1FC9),
            ],
        );
    }

    #[test]
    fn test_pmt_caption_pid() {
        let section = hex!(
            "02 B0 15 5C 38 C1 00 00 E1 00 F0 00"
            "06 E1 30 F0 03 52 01 87"
            "DE AD BE EF"
        );
        let pmt = PMT.syntax.decode(&section[..]);

        assert_eq!(pmt.uint("program_number").unwrap(), 0x5C38);
        assert_eq!(pmt.uint("PCR_PID").unwrap(), 0x0100);
        assert_eq!(pmt.uint("program_info_length").unwrap(), 0);

        let maps = pmt.list("maps").unwrap();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].uint("stream_type").unwrap(), 0x06);
        assert_eq!(maps[0].uint("elementary_PID").unwrap(), 0x0130);

        let registry = DescriptorRegistry::new();
        assert_eq!(
            pmt_caption_pid(&pmt, &registry).unwrap(),
            Some(Pid::new(0x0130)),
        );
    }

    #[test]
    fn test_sdt() {
        let section = hex!(
            "42 F0 11 7E 87 C3 00 00 00 04 00"
            "04 08 00 80 00"
            "DE AD BE EF"
        );
        let sdt = SDT.syntax.decode(&section[..]);

        assert_eq!(sdt.uint("transport_stream_id").unwrap(), 0x7E87);
        assert_eq!(sdt.uint("original_network_id").unwrap(), 0x0004);

        let services = sdt.list("services").unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].uint("service_id").unwrap(), 0x0408);
        assert_eq!(services[0].uint("running_status").unwrap(), 0b100);
        assert_eq!(services[0].uint("descriptors_loop_length").unwrap(), 0);
    }

    #[test]
    fn test_tot() {
        let section = hex!("73 70 0B B0 A2 12 34 56 F0 00 DE AD BE EF");
        let tot = TOT.syntax.decode(&section[..]);

        assert_eq!(tot.uint("table_id").unwrap(), 0x73);
        let jst = tot.date_time("JST_time").unwrap().unwrap();
        assert_eq!(jst.to_string(), "1982-09-06 12:34:56");
        assert_eq!(tot.uint("descriptors_loop_length").unwrap(), 0);
    }

    /// 字幕文データのPESを組み立てる。
    fn caption_statement_pes() -> Vec<u8> {
        let mut pes = Vec::new();
        pes.extend_from_slice(&hex!("00 00 01 BD 00 2F"));
        // フラグ類とPES_header_data_length
        pes.extend_from_slice(&hex!("84 80 16"));
        // PTS = 2700000（30秒）
        pes.extend_from_slice(&hex!("21 00 A5 65 C1"));
        // 拡張フラグ類とPES_private_data
        pes.push(0x00);
        pes.extend_from_slice(&[0x00; 16]);
        // data_identifier、private_stream_id、ヘッダー長
        pes.extend_from_slice(&hex!("80 FF F0"));
        // data_group: 字幕文（第1言語）、TMDは自由
        pes.extend_from_slice(&hex!("04 00 00 00 0E 00"));
        // data_unit_loop_length = 10
        pes.extend_from_slice(&hex!("00 00 0A"));
        // 本文ユニット: 1B 24 42（漢字指示）、46 7C（「日」）
        pes.extend_from_slice(&hex!("1F 20 00 00 05 1B 24 42 46 7C"));
        pes
    }

    #[test]
    fn test_spes_statement() {
        let pes = caption_statement_pes();
        let spes = SPES.syntax.decode(&pes[..]);

        assert_eq!(spes.uint("packet_start_code_prefix").unwrap(), 0x000001);
        assert_eq!(spes.uint("stream_id").unwrap(), 0xBD);
        assert_eq!(spes.uint("PES_packet_length").unwrap() as usize, pes.len() - 6);
        assert_eq!(spes.uint("PTS_DTS_flags").unwrap(), 0b10);
        assert_eq!(spes.uint("PES_header_data_length").unwrap(), 22);
        assert_eq!(spes_pts(&spes).unwrap(), Duration::from_secs(30));

        assert_eq!(spes.uint("data_group_id").unwrap(), 0x01);
        assert_matches!(spes.case("with_languages"), Ok(None));
        let statement = spes.case("without_languages").unwrap().unwrap();
        assert_eq!(statement.uint("TMD").unwrap(), 0b00);
        assert_matches!(statement.case("with_STM"), Ok(None));

        assert_eq!(spes.uint("data_unit_loop_length").unwrap(), 10);
        let units = spes.list("data_units").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].uint("unit_separator").unwrap(), 0x1F);
        assert_eq!(units[0].uint("data_unit_parameter").unwrap(), 0x20);
        assert_eq!(units[0].uint("data_unit_size").unwrap(), 5);
        assert_eq!(
            units[0].text("data_unit_data").unwrap().as_bytes(),
            &hex!("1B 24 42 46 7C"),
        );
    }

    #[test]
    fn test_spes_management() {
        let mut pes = Vec::new();
        pes.extend_from_slice(&hex!("00 00 01 BD 00 2B"));
        pes.extend_from_slice(&hex!("84 80 16"));
        pes.extend_from_slice(&hex!("21 00 A5 65 C1"));
        pes.push(0x00);
        pes.extend_from_slice(&[0x00; 16]);
        pes.extend_from_slice(&hex!("80 FF F0"));
        // data_group: 字幕管理、言語数1、jpn
        pes.extend_from_slice(&hex!("00 00 00 00 0A"));
        pes.extend_from_slice(&hex!("00 01 00 6A 70 6E 00"));
        pes.extend_from_slice(&hex!("00 00 00"));

        let spes = SPES.syntax.decode(&pes[..]);
        assert_eq!(spes.uint("data_group_id").unwrap(), 0x00);

        let management = spes.case("with_languages").unwrap().unwrap();
        assert_eq!(management.uint("TMD").unwrap(), 0b00);
        assert_matches!(management.case("with_OTM"), Ok(None));
        assert_eq!(management.uint("num_languages").unwrap(), 1);

        let languages = management.list("languages").unwrap();
        assert_eq!(languages.len(), 1);
        assert_eq!(
            languages[0].latin("ISO_639_language_code").unwrap(),
            "jpn",
        );
        assert_matches!(languages[0].case("with_DC"), Ok(None));

        // 分岐内のフィールドも外側から参照できる
        assert_eq!(spes.uint("num_languages").unwrap(), 1);
        assert!(spes.list("data_units").unwrap().is_empty());
    }
}
