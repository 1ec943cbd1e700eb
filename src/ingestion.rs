use crate::config::SourceEncoding;
use crate::diagnostics::SkippedFile;
use crate::error::{DisclosureError, Result};
use crate::normalize::clean_header;
use crate::periods::{resolve_periods, ColumnIndex, ResolvedPeriod};
use crate::schema::{ReportType, StatementCategory, StatementScope};
use csv::ReaderBuilder;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const STOCK_CODE_HEADER: &str = "종목코드";
pub const COMPANY_NAME_HEADER: &str = "회사명";
pub const SECTOR_HEADERS: [&str; 2] = ["업종명", "업종"];
pub const ITEM_CODE_HEADER: &str = "항목코드";
pub const ITEM_NAME_HEADER: &str = "항목명";

const SOURCE_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// What a filing's name says about its contents: `<year>_<report>_..._<scope/category tokens>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingDescriptor {
    pub fiscal_year: i32,
    pub report_type: ReportType,
    pub scope: StatementScope,
    pub category: StatementCategory,
}

impl FilingDescriptor {
    pub fn from_filename(name: &str) -> Result<Self> {
        let mut parts = name.split('_');
        let fiscal_year = parts
            .next()
            .and_then(|year| year.trim().parse::<i32>().ok())
            .ok_or_else(|| DisclosureError::InvalidFilename(name.to_string()))?;
        let report_type = parts
            .next()
            .and_then(ReportType::from_token)
            .ok_or_else(|| DisclosureError::InvalidFilename(name.to_string()))?;

        let scope = if name.contains("연결") {
            StatementScope::Consolidated
        } else {
            StatementScope::Separate
        };

        Ok(Self {
            fiscal_year,
            report_type,
            scope,
            category: StatementCategory::from_filename(name),
        })
    }
}

/// Decoded rows of one filing. Headers are already cleaned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilingTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filing {
    pub source: String,
    pub descriptor: FilingDescriptor,
    pub table: FilingTable,
}

impl Filing {
    pub fn new(source: impl Into<String>, table: FilingTable) -> Result<Self> {
        let source = source.into();
        let descriptor = FilingDescriptor::from_filename(&source)?;
        Ok(Self {
            source,
            descriptor,
            table,
        })
    }

    /// Builds a filing from already decoded delimited text.
    pub fn from_text(source: impl Into<String>, text: &str) -> Result<Self> {
        Self::new(source, parse_table(text)?)
    }

    /// Processing order inside a pass: oldest fiscal year first, then report
    /// type, then the comprehensive statement ahead of the plain one.
    pub fn precedence_key(
        &self,
    ) -> (i32, ReportType, StatementCategory, StatementScope, &str) {
        (
            self.descriptor.fiscal_year,
            self.descriptor.report_type,
            self.descriptor.category,
            self.descriptor.scope,
            self.source.as_str(),
        )
    }
}

/// Decodes raw bytes with one candidate encoding. `None` when the bytes are
/// not valid in that encoding.
pub fn decode(bytes: &[u8], encoding: SourceEncoding) -> Option<String> {
    match encoding {
        SourceEncoding::Utf8Sig => {
            let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            std::str::from_utf8(bytes).ok().map(str::to_string)
        }
        SourceEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
        // WHATWG's EUC-KR decoder is the windows-949 superset, so it covers both.
        SourceEncoding::Cp949 | SourceEncoding::EucKr => encoding_rs::EUC_KR
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned()),
    }
}

fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or_default();
    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();
    if tabs > commas {
        b'\t'
    } else {
        b','
    }
}

/// Splits delimited text into a header row and data rows. Comma or tab is
/// chosen from the header line; rows may have uneven lengths.
pub fn parse_table(text: &str) -> Result<FilingTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(text))
        .from_reader(text.as_bytes());

    let mut table = FilingTable::default();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        if i == 0 {
            table.headers = record.iter().map(clean_header).collect();
        } else {
            table.rows.push(record.iter().map(str::to_string).collect());
        }
    }
    Ok(table)
}

/// Reads one filing, trying each encoding in order until one decodes and parses.
pub fn read_filing(path: &Path, encodings: &[SourceEncoding]) -> Result<Filing> {
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let descriptor = FilingDescriptor::from_filename(&source)?;
    let bytes = fs::read(path)?;

    for encoding in encodings {
        let Some(text) = decode(&bytes, *encoding) else {
            continue;
        };
        match parse_table(&text) {
            Ok(table) => {
                debug!("Decoded {} as {}", source, encoding.label());
                return Ok(Filing {
                    source,
                    descriptor,
                    table,
                });
            }
            Err(e) => debug!("{} decoded as {} but did not parse: {}", source, encoding.label(), e),
        }
    }

    Err(DisclosureError::UnreadableFile {
        source_name: source,
        tried: encodings
            .iter()
            .map(|e| e.label())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

#[derive(Debug, Default)]
pub struct LoadedFilings {
    pub filings: Vec<Filing>,
    pub skipped: Vec<SkippedFile>,
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SOURCE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Loads every delimited file in `dir`. Only failing to enumerate the
/// directory is an error; each unreadable file becomes a skip entry.
pub fn load_directory(dir: &Path, encodings: &[SourceEncoding]) -> Result<LoadedFilings> {
    let input_error = |source| DisclosureError::InputDirectory {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(input_error)? {
        let path = entry.map_err(input_error)?.path();
        if path.is_file() && has_source_extension(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut loaded = LoadedFilings::default();
    for path in paths {
        match read_filing(&path, encodings) {
            Ok(filing) => loaded.filings.push(filing),
            Err(e) => {
                let source = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                warn!("Skipping {}: {}", source, e);
                loaded.skipped.push(SkippedFile {
                    source,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(loaded)
}

/// Column positions a filing's rows are read through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingLayout {
    pub code: usize,
    pub name: Option<usize>,
    pub sector: Option<usize>,
    pub item_code: usize,
    pub item_name: Option<usize>,
    pub periods: Vec<ResolvedPeriod>,
    required_len: usize,
}

impl FilingLayout {
    pub fn resolve(filing: &Filing) -> Result<Self> {
        let index = ColumnIndex::from_headers(&filing.table.headers);
        let code = index.get(STOCK_CODE_HEADER);
        let item_code = index.get(ITEM_CODE_HEADER);

        let (Some(code), Some(item_code)) = (code, item_code) else {
            let columns = [(STOCK_CODE_HEADER, code), (ITEM_CODE_HEADER, item_code)]
                .iter()
                .filter(|(_, found)| found.is_none())
                .map(|(header, _)| header.to_string())
                .collect();
            return Err(DisclosureError::MissingColumns {
                source_name: filing.source.clone(),
                columns,
            });
        };

        let name = index.get(COMPANY_NAME_HEADER);
        let sector = index.resolve(&SECTOR_HEADERS);
        let item_name = index.get(ITEM_NAME_HEADER);
        let periods = resolve_periods(filing.descriptor.report_type, &index);

        let required_len = [Some(code), name, sector, Some(item_code), item_name]
            .into_iter()
            .flatten()
            .chain(periods.iter().map(|p| p.column))
            .max()
            .map_or(0, |max| max + 1);

        Ok(Self {
            code,
            name,
            sector,
            item_code,
            item_name,
            periods,
            required_len,
        })
    }

    /// Whether the row reaches every column this layout reads.
    pub fn covers(&self, row: &[String]) -> bool {
        row.len() >= self.required_len
    }
}

/// Cell text at an optional column, trimmed; `None` when absent or blank.
pub fn cell(row: &[String], column: Option<usize>) -> Option<&str> {
    column
        .and_then(|i| row.get(i))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Period;

    #[test]
    fn test_descriptor_from_filename() {
        let descriptor =
            FilingDescriptor::from_filename("2023_3분기보고서_연결_포괄손익계산서.csv").unwrap();
        assert_eq!(descriptor.fiscal_year, 2023);
        assert_eq!(descriptor.report_type, ReportType::ThirdQuarter);
        assert_eq!(descriptor.scope, StatementScope::Consolidated);
        assert_eq!(descriptor.category, StatementCategory::ComprehensiveIncome);

        let descriptor = FilingDescriptor::from_filename("2022_사업보고서_손익계산서.csv").unwrap();
        assert_eq!(descriptor.scope, StatementScope::Separate);
        assert_eq!(descriptor.category, StatementCategory::IncomeStatement);

        let descriptor =
            FilingDescriptor::from_filename("2022_사업보고서_연결_재무상태표.csv").unwrap();
        assert_eq!(descriptor.category, StatementCategory::Other);
    }

    #[test]
    fn test_descriptor_rejects_bad_names() {
        assert!(matches!(
            FilingDescriptor::from_filename("notes.csv"),
            Err(DisclosureError::InvalidFilename(_))
        ));
        assert!(matches!(
            FilingDescriptor::from_filename("2023_감사보고서_연결.csv"),
            Err(DisclosureError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_decode_fallback_encodings() {
        let (bytes, _, had_errors) = encoding_rs::EUC_KR.encode("종목코드,회사명");
        assert!(!had_errors);
        assert_eq!(decode(&bytes, SourceEncoding::Utf8Sig), None);
        assert_eq!(
            decode(&bytes, SourceEncoding::Cp949).as_deref(),
            Some("종목코드,회사명")
        );

        let mut with_bom = UTF8_BOM.to_vec();
        with_bom.extend_from_slice("종목코드".as_bytes());
        assert_eq!(
            decode(&with_bom, SourceEncoding::Utf8Sig).as_deref(),
            Some("종목코드")
        );
    }

    #[test]
    fn test_parse_table_tab_delimited() {
        let table = parse_table("종목 코드\t회사명\t당기\n005930\t삼성전자\t1,000\n").unwrap();
        assert_eq!(table.headers, vec!["종목코드", "회사명", "당기"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][2], "1,000");
    }

    #[test]
    fn test_parse_table_quoted_commas() {
        let table = parse_table("종목코드,당기\n005930,\"1,000\"\n").unwrap();
        assert_eq!(table.rows[0], vec!["005930", "1,000"]);
    }

    #[test]
    fn test_layout_requires_code_columns() {
        let filing = Filing::from_text(
            "2023_1분기보고서_연결_포괄손익계산서.csv",
            "회사명,항목명,당기\n삼성전자,매출액,100\n",
        )
        .unwrap();
        match FilingLayout::resolve(&filing) {
            Err(DisclosureError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, vec!["종목코드", "항목코드"]);
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_layout_row_coverage() {
        let filing = Filing::from_text(
            "2023_1분기보고서_연결_포괄손익계산서.csv",
            "종목코드,회사명,항목코드,항목명,당기 1분기 3개월\n005930,삼성전자,ifrs-full_Revenue,매출액,100\n",
        )
        .unwrap();
        let layout = FilingLayout::resolve(&filing).unwrap();
        assert_eq!(layout.periods.len(), 1);
        assert_eq!(layout.periods[0].period, Period::Q1);
        assert_eq!(layout.periods[0].column, 4);
        assert!(layout.covers(&filing.table.rows[0]));
        assert!(!layout.covers(&filing.table.rows[0][..4]));
    }
}
