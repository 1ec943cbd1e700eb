//! Operator-facing summary of everything the batch refused to guess.

use crate::schema::{Amount, Period, Quarter};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAmount {
    pub period: Period,
    pub year: i32,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub item_code: String,
    pub item_name: String,
    pub source: String,
    pub amounts: Vec<CandidateAmount>,
}

/// An entity-year whose fallback revenue candidates could not be narrowed to
/// one line item. Nothing was stored for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguousFallback {
    pub code: String,
    pub name: Option<String>,
    pub year: i32,
    pub candidates: Vec<CandidateSummary>,
}

/// A derived quarter dropped because its revenue came out negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedQuarter {
    pub code: String,
    pub year: i32,
    pub quarter: Quarter,
    pub revenue: i64,
    pub annual_revenue: i64,
    pub accumulated_revenue: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub files_processed: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub short_rows: usize,
    pub blocked_overwrites: usize,
    pub ambiguous_fallbacks: Vec<AmbiguousFallback>,
    pub rejected_quarters: Vec<RejectedQuarter>,
}

impl Diagnostics {
    pub fn skip_file(&mut self, source: impl Into<String>, reason: impl Into<String>) {
        let skipped = SkippedFile {
            source: source.into(),
            reason: reason.into(),
        };
        warn!("Skipping {}: {}", skipped.source, skipped.reason);
        self.skipped_files.push(skipped);
    }

    /// True when anything needs an operator's attention.
    pub fn has_issues(&self) -> bool {
        !self.skipped_files.is_empty()
            || !self.ambiguous_fallbacks.is_empty()
            || !self.rejected_quarters.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} files processed, {} skipped, {} ambiguous entity-years, {} rejected quarters",
            self.files_processed,
            self.skipped_files.len(),
            self.ambiguous_fallbacks.len(),
            self.rejected_quarters.len()
        )
    }

    pub fn log_summary(&self) {
        if self.has_issues() {
            warn!("Finished with issues: {}", self.summary());
        } else {
            info!("Finished: {}", self.summary());
        }
        for ambiguity in &self.ambiguous_fallbacks {
            warn!(
                "{} {} {}: {} competing revenue candidates",
                ambiguity.code,
                ambiguity.name.as_deref().unwrap_or("Unknown"),
                ambiguity.year,
                ambiguity.candidates.len()
            );
            for (i, candidate) in ambiguity.candidates.iter().enumerate() {
                let amounts = if candidate.amounts.is_empty() {
                    "no amounts".to_string()
                } else {
                    candidate
                        .amounts
                        .iter()
                        .map(|a| format!("{} {}: {}", a.year, a.period, a.amount))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                warn!(
                    "  {}. {} [{}] in {} ({})",
                    i + 1,
                    candidate.item_name,
                    candidate.item_code,
                    candidate.source,
                    amounts
                );
            }
        }
    }
}
