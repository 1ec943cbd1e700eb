//! Cell-level cleaning shared by every stage: header text, numeric values and
//! stock codes.

use crate::identity::IdentityMap;
use crate::schema::{Amount, Metric};
use std::collections::BTreeMap;

pub const STOCK_CODE_WIDTH: usize = 6;

const NULL_SENTINELS: [&str; 2] = ["[null]", "null"];

/// Removes ordinary and non-breaking spaces so that headers and line-item
/// names from different filing vintages compare equal.
pub fn clean_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{feff}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parses a monetary cell. Anything other than digits and `-` is discarded;
/// malformed cells are absent data, never an error.
pub fn parse_money(raw: &str) -> Option<i64> {
    let cleaned = retain_numeric(raw, false)?;
    cleaned.parse().ok()
}

/// Parses a per-share cell, keeping the decimal point.
pub fn parse_per_share(raw: &str) -> Option<f64> {
    let cleaned = retain_numeric(raw, true)?;
    cleaned.parse().ok()
}

pub fn parse_amount(raw: &str, metric: Metric) -> Option<Amount> {
    if metric.is_per_share() {
        parse_per_share(raw).map(Amount::PerShare)
    } else {
        parse_money(raw).map(Amount::Won)
    }
}

fn retain_numeric(raw: &str, keep_decimal_point: bool) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || (keep_decimal_point && *c == '.'))
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    Some(cleaned)
}

pub fn is_null_sentinel(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || NULL_SENTINELS
            .iter()
            .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
}

/// Canonical six-digit form of a stock code cell.
///
/// Bracket and space decoration is stripped first; a code that still holds a
/// non-digit afterwards is corrupted and rejected rather than guessed.
pub fn normalize_stock_code(raw: &str) -> Option<String> {
    if is_null_sentinel(raw) {
        return None;
    }
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '[' | ']') && !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if stripped.is_empty() || !stripped.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>width$}", stripped, width = STOCK_CODE_WIDTH))
}

/// Resolves a row's entity code, falling back to the display name when the
/// code cell is unusable.
#[derive(Debug, Clone, Copy)]
pub struct CodeResolver<'a> {
    aliases: &'a BTreeMap<String, String>,
    identity: Option<&'a IdentityMap>,
}

impl<'a> CodeResolver<'a> {
    pub fn new(aliases: &'a BTreeMap<String, String>) -> Self {
        Self {
            aliases,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: &'a IdentityMap) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn resolve(&self, raw_code: &str, display_name: Option<&str>) -> Option<String> {
        if let Some(code) = normalize_stock_code(raw_code) {
            return Some(code);
        }
        let name = display_name.map(str::trim).filter(|n| !n.is_empty())?;
        if let Some(code) = self.aliases.get(name) {
            return Some(code.clone());
        }
        self.identity
            .and_then(|identity| identity.code_for_name(name))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_header() {
        assert_eq!(clean_header(" 당기 1분기\u{a0}3개월 "), "당기1분기3개월");
        assert_eq!(clean_header("종목코드"), "종목코드");
        assert_eq!(clean_header("   "), "");
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("1,234,567"), Some(1_234_567));
        assert_eq!(parse_money("-98,765"), Some(-98_765));
        assert_eq!(parse_money(" "), None);
        assert_eq!(parse_money(""), None);
        assert_eq!(parse_money("-"), None);
        assert_eq!(parse_money("N/A"), None);
        assert_eq!(parse_money("12-34"), None);
    }

    #[test]
    fn test_parse_per_share() {
        assert_eq!(parse_per_share("1,234.5"), Some(1234.5));
        assert_eq!(parse_per_share("-12"), Some(-12.0));
        assert_eq!(parse_per_share("--"), None);
        assert_eq!(parse_amount("3,000", Metric::Eps), Some(Amount::PerShare(3000.0)));
        assert_eq!(parse_amount("3,000", Metric::Revenue), Some(Amount::Won(3000)));
    }

    #[test]
    fn test_normalize_stock_code_decoration() {
        assert_eq!(normalize_stock_code("[005490]").as_deref(), Some("005490"));
        assert_eq!(normalize_stock_code(" 005490 ").as_deref(), Some("005490"));
        assert_eq!(normalize_stock_code("5930").as_deref(), Some("005930"));
        assert_eq!(
            normalize_stock_code("[005490]"),
            normalize_stock_code(" 005490 ")
        );
    }

    #[test]
    fn test_normalize_stock_code_rejects() {
        assert_eq!(normalize_stock_code("0008Z0"), None);
        assert_eq!(normalize_stock_code("[null]"), None);
        assert_eq!(normalize_stock_code("NULL"), None);
        assert_eq!(normalize_stock_code(""), None);
        assert_eq!(normalize_stock_code("[]"), None);
    }

    #[test]
    fn test_resolver_name_fallback() {
        let mut aliases = BTreeMap::new();
        aliases.insert("포스코".to_string(), "005490".to_string());
        let resolver = CodeResolver::new(&aliases);

        assert_eq!(
            resolver.resolve("[null]", Some(" 포스코 ")).as_deref(),
            Some("005490")
        );
        assert_eq!(resolver.resolve("[null]", Some("삼성전자")), None);
        assert_eq!(resolver.resolve("[null]", None), None);
        assert_eq!(resolver.resolve("0008Z0", None), None);
        assert_eq!(
            resolver.resolve("005930", Some("포스코")).as_deref(),
            Some("005930")
        );
    }

    #[test]
    fn test_resolver_uses_identity_map() {
        let aliases = BTreeMap::new();
        let mut identity = IdentityMap::default();
        identity.record("005930", "삼성전자");
        let resolver = CodeResolver::new(&aliases).with_identity(&identity);

        assert_eq!(
            resolver.resolve("", Some("삼성전자")).as_deref(),
            Some("005930")
        );
    }
}
