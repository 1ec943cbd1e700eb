//! # Disclosure History Builder
//!
//! A library for turning exported Korean regulatory filings (quarterly,
//! half-year and annual income statements) into a per-company quarterly or
//! annual history of revenue, operating profit, net income and EPS.
//!
//! ## Core Concepts
//!
//! - **Filing**: one exported statement; its name carries fiscal year, report type,
//!   statement scope (consolidated or separate) and statement category
//! - **Period**: the bucket a value lands in (`Q1`, `Q2`, `Q3`, `Q3_Acc`,
//!   `Annual_Current`, `Annual_Previous`); Q4 is always derived
//! - **Accumulation cell**: one (company, year, period, metric) value with its
//!   provenance; the first write wins
//! - **Passes**: consolidated statements first, then separate statements only
//!   for companies that received nothing from the consolidated pass
//!
//! ## Example
//!
//! ```rust,ignore
//! use disclosure_history_builder::*;
//!
//! let config = BuilderConfig::default();
//! let report = process_directory(&config, "csv_output")?;
//!
//! println!("{}", report.diagnostics.summary());
//! std::fs::write("financial_data.json", report.output.to_json()?)?;
//! ```

pub mod classifier;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod identity;
pub mod ingestion;
pub mod normalize;
pub mod periods;
pub mod schema;
pub mod store;
pub mod utils;

pub use classifier::{disambiguate, Classification, FallbackCandidate, FallbackResolution, MetricClassifier};
pub use compiler::HistoryCompiler;
pub use config::{
    AnnualPrecedence, BuilderConfig, PassEligibility, PassPolicy, PassRule, PipelineMode,
    SourceEncoding,
};
pub use diagnostics::*;
pub use engine::ReconciliationEngine;
pub use error::{DisclosureError, Result};
pub use identity::{build_mapping, IdentityMap};
pub use ingestion::*;
pub use normalize::{normalize_stock_code, CodeResolver};
pub use periods::{periods_for, resolve_periods, ColumnIndex, PeriodTarget, ResolvedPeriod};
pub use schema::*;
pub use store::{AccumulationStore, Cell, EntityMeta, WriteOutcome};
pub use utils::*;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything one batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub output: HistoryOutput,
    pub diagnostics: Diagnostics,
    /// Name and code mapping the batch resolved companies with.
    pub identity: IdentityMap,
    /// Raw accumulation cells with per-value provenance.
    pub store: AccumulationStore,
}

impl BuildReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct DisclosureHistoryProcessor;

impl DisclosureHistoryProcessor {
    pub fn process(config: &BuilderConfig, filings: &[Filing]) -> Result<BuildReport> {
        config.validate()?;
        Ok(Self::build(config, filings, Vec::new()))
    }

    /// Loads and processes every filing in `dir`. Fails only on an invalid
    /// configuration or an input directory that cannot be listed.
    pub fn process_directory(config: &BuilderConfig, dir: impl AsRef<Path>) -> Result<BuildReport> {
        config.validate()?;
        let loaded = load_directory(dir.as_ref(), &config.encodings)?;
        Ok(Self::build(config, &loaded.filings, loaded.skipped))
    }

    fn build(
        config: &BuilderConfig,
        filings: &[Filing],
        mut skipped: Vec<SkippedFile>,
    ) -> BuildReport {
        info!(
            "Processing {} filings in {:?} mode ({}-{})",
            filings.len(),
            config.mode,
            config.start_year,
            config.end_year
        );
        debug!(
            "{} passes configured, annual precedence {:?}",
            config.pass_policy.passes.len(),
            config.annual_precedence
        );

        let identity = build_mapping(filings);

        let mut engine = ReconciliationEngine::new(config, &identity);
        engine.run(filings);
        let (store, mut diagnostics) = engine.finish();

        diagnostics.files_processed = filings.len();
        skipped.append(&mut diagnostics.skipped_files);
        diagnostics.skipped_files = skipped;

        let output = HistoryCompiler::new(config, &identity).compile(&store, &mut diagnostics);
        diagnostics.log_summary();

        BuildReport {
            output,
            diagnostics,
            identity,
            store,
        }
    }
}

pub fn process_disclosures(config: &BuilderConfig, filings: &[Filing]) -> Result<BuildReport> {
    DisclosureHistoryProcessor::process(config, filings)
}

pub fn process_directory(config: &BuilderConfig, dir: impl AsRef<Path>) -> Result<BuildReport> {
    DisclosureHistoryProcessor::process_directory(config, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "종목코드,회사명,업종명,항목코드,항목명";

    fn filing(source: &str, periods: &str, rows: &[&str]) -> Filing {
        let mut text = format!("{},{}\n", HEADER, periods);
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        Filing::from_text(source, &text).unwrap()
    }

    fn year_of_filings() -> Vec<Filing> {
        vec![
            filing(
                "2023_1분기보고서_연결_포괄손익계산서.csv",
                "당기1분기3개월",
                &[
                    "005930,삼성전자,통신 및 방송 장비 제조업,ifrs-full_Revenue,수익(매출액),\"63,745,371,000,000\"",
                    "005930,삼성전자,통신 및 방송 장비 제조업,ifrs-full_ProfitLossFromOperatingActivities,영업이익,\"640,178,000,000\"",
                ],
            ),
            filing(
                "2023_반기보고서_연결_포괄손익계산서.csv",
                "당기반기3개월",
                &["005930,삼성전자,통신 및 방송 장비 제조업,ifrs-full_Revenue,수익(매출액),\"60,005,533,000,000\""],
            ),
            filing(
                "2023_3분기보고서_연결_포괄손익계산서.csv",
                "당기3분기3개월,당기3분기누적",
                &["005930,삼성전자,통신 및 방송 장비 제조업,ifrs-full_Revenue,수익(매출액),\"67,404,652,000,000\",\"191,155,556,000,000\""],
            ),
            filing(
                "2023_사업보고서_연결_포괄손익계산서.csv",
                "당기,전기",
                &["005930,삼성전자,통신 및 방송 장비 제조업,ifrs-full_Revenue,수익(매출액),\"258,935,494,000,000\",\"302,231,360,000,000\""],
            ),
        ]
    }

    #[test]
    fn test_end_to_end_processing() {
        let report = process_disclosures(&BuilderConfig::default(), &year_of_filings()).unwrap();
        let company = report.output.get("005930").unwrap();

        assert_eq!(company.name, "삼성전자");
        assert_eq!(company.statement_type, StatementScope::Consolidated);

        let quarters: Vec<(i32, Option<Quarter>)> =
            company.history.iter().map(|r| (r.year, r.quarter)).collect();
        assert_eq!(
            quarters,
            vec![
                (2023, Some(Quarter::Q1)),
                (2023, Some(Quarter::Q2)),
                (2023, Some(Quarter::Q3)),
                (2023, Some(Quarter::Q4)),
            ]
        );
        assert_eq!(company.history[0].op_profit, Some(640_178_000_000));
        assert_eq!(company.history[3].revenue, Some(67_779_938_000_000));
        assert_eq!(report.diagnostics.files_processed, 4);
        assert!(!report.diagnostics.has_issues());
    }

    #[test]
    fn test_processing_is_idempotent() {
        let config = BuilderConfig::default();
        let mut filings = year_of_filings();
        let first = process_disclosures(&config, &filings).unwrap();
        filings.reverse();
        let second = process_disclosures(&config, &filings).unwrap();

        assert_eq!(first.output.to_json().unwrap(), second.output.to_json().unwrap());
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BuilderConfig {
            fiscal_year_end_month: 13,
            ..BuilderConfig::default()
        };
        assert!(matches!(
            process_disclosures(&config, &[]),
            Err(DisclosureError::InvalidFiscalYearEndMonth(13))
        ));
    }
}
