use crate::error::{DisclosureError, Result};
use crate::schema::StatementScope;
use crate::utils::validate_fiscal_year_end_month;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PipelineMode {
    #[default]
    #[schemars(
        description = "Quarterly history: Q1-Q3 as reported, Q4 derived as annual total minus Q3 year-to-date."
    )]
    Quarterly,

    #[schemars(description = "Annual history: one record per fiscal year, read from annual reports only.")]
    Annual,
}

/// Which annual total wins when a year has both its own annual figure and the
/// prior-year figure restated in the following year's annual report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AnnualPrecedence {
    #[default]
    #[schemars(description = "Prefer the figure from the year's own annual report.")]
    CurrentFirst,

    #[schemars(description = "Prefer the restated figure from the following year's annual report.")]
    RestatedFirst,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PassEligibility {
    #[schemars(description = "Every known entity is extracted in this pass.")]
    AllEntities,

    #[schemars(
        description = "Only entities with no data from any earlier pass that are still missing periods inside the target year range."
    )]
    MissingWithoutPriorData,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct PassRule {
    pub scope: StatementScope,
    pub eligibility: PassEligibility,
}

/// Ordered extraction passes. Earlier passes have higher authority because
/// cells are never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct PassPolicy {
    pub passes: Vec<PassRule>,
}

impl Default for PassPolicy {
    fn default() -> Self {
        Self {
            passes: vec![
                PassRule {
                    scope: StatementScope::Consolidated,
                    eligibility: PassEligibility::AllEntities,
                },
                PassRule {
                    scope: StatementScope::Separate,
                    eligibility: PassEligibility::MissingWithoutPriorData,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEncoding {
    Utf8Sig,
    Cp949,
    Utf8,
    EucKr,
}

impl SourceEncoding {
    pub const fn label(self) -> &'static str {
        match self {
            SourceEncoding::Utf8Sig => "utf-8-sig",
            SourceEncoding::Cp949 => "cp949",
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::EucKr => "euc-kr",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BuilderConfig {
    pub mode: PipelineMode,

    #[schemars(description = "Extract basic EPS alongside the monetary metrics.")]
    pub include_eps: bool,

    #[schemars(description = "First fiscal year checked by the missing-data scan.")]
    pub start_year: i32,

    #[schemars(description = "Last fiscal year checked by the missing-data scan (inclusive).")]
    pub end_year: i32,

    #[schemars(description = "Month the fiscal year ends (1 = January, 12 = December).")]
    pub fiscal_year_end_month: u32,

    #[schemars(description = "Sector substrings whose companies are skipped entirely.")]
    pub excluded_sectors: Vec<String>,

    #[schemars(description = "Encodings tried in order when decoding a source file.")]
    pub encodings: Vec<SourceEncoding>,

    #[schemars(description = "Display name to stock code for companies disclosed without a usable code.")]
    pub code_aliases: BTreeMap<String, String>,

    #[schemars(description = "Stock code to display name, applied to the compiled output.")]
    pub name_overrides: BTreeMap<String, String>,

    pub annual_precedence: AnnualPrecedence,

    pub pass_policy: PassPolicy,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        let excluded_sectors = [
            "은행",
            "금융",
            "증권",
            "보험",
            "여신전문",
            "카드",
            "캐피탈",
            "저축은행",
            "금융업",
            "보험업",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let code_aliases = [("포스코", "005490"), ("POSCO", "005490")]
            .iter()
            .map(|(name, code)| (name.to_string(), code.to_string()))
            .collect();

        // The 2022 holding-company rename is not reliably captured by the mapping pass.
        let name_overrides = [("005490", "POSCO홀딩스")]
            .iter()
            .map(|(code, name)| (code.to_string(), name.to_string()))
            .collect();

        Self {
            mode: PipelineMode::default(),
            include_eps: false,
            start_year: 2020,
            end_year: 2024,
            fiscal_year_end_month: 12,
            excluded_sectors,
            encodings: vec![
                SourceEncoding::Utf8Sig,
                SourceEncoding::Cp949,
                SourceEncoding::Utf8,
                SourceEncoding::EucKr,
            ],
            code_aliases,
            name_overrides,
            annual_precedence: AnnualPrecedence::default(),
            pass_policy: PassPolicy::default(),
        }
    }
}

impl BuilderConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_year > self.end_year {
            return Err(DisclosureError::InvalidYearRange {
                start: self.start_year,
                end: self.end_year,
            });
        }
        validate_fiscal_year_end_month(self.fiscal_year_end_month)
    }

    pub fn target_years(&self) -> std::ops::RangeInclusive<i32> {
        self.start_year..=self.end_year
    }

    pub fn is_excluded_sector(&self, sector: Option<&str>) -> bool {
        let Some(sector) = sector.map(str::trim) else {
            return false;
        };
        !sector.is_empty()
            && self
                .excluded_sectors
                .iter()
                .any(|excluded| sector.contains(excluded.as_str()))
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(BuilderConfig)
    }
}
