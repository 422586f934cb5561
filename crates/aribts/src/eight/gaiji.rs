//! 外字の変換表。

use fxhash::FxHashMap;

/// 外字の変換表を読み込む際のエラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseGaijiError {
    /// 符号が16進数として解釈できない。
    #[error("invalid gaiji code at line {0}")]
    InvalidCode(usize),
    /// 置換文字列の列がない。
    #[error("missing replacement text at line {0}")]
    MissingText(usize),
}

/// 2バイトの外字符号からUnicode文字列への変換表。
///
/// 番組情報の記号（`[字]`や`[再]`など）は番組名と区別するため
/// 別の表として保持し、[`AribStr::to_string_split`]で分離して取り出せる。
///
/// [`AribStr::to_string_split`]: crate::AribStr::to_string_split
#[derive(Debug, Clone)]
pub struct GaijiTable {
    title: FxHashMap<u16, String>,
    other: FxHashMap<u16, String>,
}

/// 番組情報の記号。
static BUILTIN_TITLE: &[(u16, &str)] = &[
    (0x7A50, "[HV]"),
    (0x7A51, "[SD]"),
    (0x7A52, "[P]"),
    (0x7A53, "[W]"),
    (0x7A54, "[MV]"),
    (0x7A55, "[手]"),
    (0x7A56, "[字]"),
    (0x7A57, "[双]"),
    (0x7A58, "[デ]"),
    (0x7A59, "[S]"),
    (0x7A5A, "[二]"),
    (0x7A5B, "[多]"),
    (0x7A5C, "[解]"),
    (0x7A5D, "[SS]"),
    (0x7A5E, "[B]"),
    (0x7A5F, "[N]"),
    (0x7A62, "[天]"),
    (0x7A63, "[交]"),
    (0x7A64, "[映]"),
    (0x7A65, "[無]"),
    (0x7A66, "[料]"),
    (0x7A67, "[年齢制限]"),
    (0x7A68, "[前]"),
    (0x7A69, "[後]"),
    (0x7A6A, "[再]"),
    (0x7A6B, "[新]"),
    (0x7A6C, "[初]"),
    (0x7A6D, "[終]"),
    (0x7A6E, "[生]"),
    (0x7A6F, "[販]"),
    (0x7A70, "[声]"),
    (0x7A71, "[吹]"),
    (0x7A72, "[PPV]"),
];

static BUILTIN_OTHER: &[(u16, &str)] = &[
    (0x7A60, "■"),
    (0x7A61, "●"),
    (0x7C21, "→"),
    (0x7C22, "←"),
    (0x7C23, "↑"),
    (0x7C24, "↓"),
];

impl GaijiTable {
    /// 組み込みの外字が登録された変換表を生成する。
    #[must_use]
    pub fn new() -> GaijiTable {
        let mut table = GaijiTable::empty();
        for &(code, text) in BUILTIN_TITLE {
            table.insert_title(code, text);
        }
        for &(code, text) in BUILTIN_OTHER {
            table.insert(code, text);
        }
        table
    }

    /// 何も登録されていない変換表を生成する。
    #[inline]
    #[must_use]
    pub fn empty() -> GaijiTable {
        GaijiTable {
            title: FxHashMap::default(),
            other: FxHashMap::default(),
        }
    }

    /// タブ区切りのテキストから変換表を読み込む。
    ///
    /// 各行は`符号<TAB>置換文字列[<TAB>title]`の形式で、符号は16進数4桁、
    /// 3列目に`title`と書かれた行は番組情報の記号として登録される。
    /// 空行と`#`で始まる行は無視する。
    pub fn parse(s: &str) -> Result<GaijiTable, ParseGaijiError> {
        let mut table = GaijiTable::empty();
        for (no, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut cols = line.split('\t');
            let code = cols.next().unwrap_or("");
            let code = u16::from_str_radix(code, 16)
                .map_err(|_| ParseGaijiError::InvalidCode(no + 1))?;
            let Some(text) = cols.next() else {
                return Err(ParseGaijiError::MissingText(no + 1));
            };

            if cols.next() == Some("title") {
                table.insert_title(code, text);
            } else {
                table.insert(code, text);
            }
        }
        Ok(table)
    }

    /// `code`の外字を`text`に変換するよう登録する。
    #[inline]
    pub fn insert(&mut self, code: u16, text: impl Into<String>) {
        self.other.insert(code, text.into());
    }

    /// `code`の外字を番組情報の記号`text`に変換するよう登録する。
    #[inline]
    pub fn insert_title(&mut self, code: u16, text: impl Into<String>) {
        self.title.insert(code, text.into());
    }

    /// `code`に対応する文字列を返す。番組情報の記号が優先される。
    #[must_use]
    pub fn get(&self, code: u16) -> Option<&str> {
        self.title
            .get(&code)
            .or_else(|| self.other.get(&code))
            .map(String::as_str)
    }

    /// `code`に対応する番組情報の記号を返す。
    #[inline]
    #[must_use]
    pub fn get_title(&self, code: u16) -> Option<&str> {
        self.title.get(&code).map(String::as_str)
    }

    /// `code`に対応する、番組情報の記号を除いた文字列を返す。
    #[inline]
    #[must_use]
    pub fn get_other(&self, code: u16) -> Option<&str> {
        self.other.get(&code).map(String::as_str)
    }
}

impl Default for GaijiTable {
    #[inline]
    fn default() -> Self {
        GaijiTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_builtin() {
        let table = GaijiTable::new();
        assert_eq!(table.get(0x7A50), Some("[HV]"));
        assert_eq!(table.get_title(0x7A50), Some("[HV]"));
        assert_eq!(table.get_other(0x7A50), None);
        assert_eq!(table.get(0x7C21), Some("→"));
        assert_eq!(table.get(0x2121), None);

        assert_eq!(GaijiTable::empty().get(0x7A50), None);
    }

    #[test]
    fn test_parse() {
        let table = GaijiTable::parse(
            "# コメント\n\n7A50\t[ハイビジョン]\ttitle\n7C7B\t♪\n",
        )
        .unwrap();
        assert_eq!(table.get_title(0x7A50), Some("[ハイビジョン]"));
        assert_eq!(table.get(0x7C7B), Some("♪"));
        assert_eq!(table.get(0x7A51), None);

        assert_matches!(
            GaijiTable::parse("XXXX\tあ"),
            Err(ParseGaijiError::InvalidCode(1))
        );
        assert_matches!(
            GaijiTable::parse("7A50\tあ\n7A51"),
            Err(ParseGaijiError::MissingText(2))
        );
    }

    #[test]
    fn test_insert_override() {
        let mut table = GaijiTable::new();
        table.insert_title(0x7A56, "[cc]");
        assert_eq!(table.get(0x7A56), Some("[cc]"));
    }
}
