use crate::ingestion::{cell, Filing, COMPANY_NAME_HEADER, STOCK_CODE_HEADER};
use crate::normalize::normalize_stock_code;
use crate::periods::ColumnIndex;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Corpus-wide name and code mapping.
///
/// Both directions keep the first entry recorded. Filings are fed newest
/// first, so a code maps to its latest display name and a name stays bound
/// to the code it carried in the latest filing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMap {
    pub name_to_code: BTreeMap<String, String>,
    pub code_to_name: BTreeMap<String, String>,
}

impl IdentityMap {
    pub fn record(&mut self, code: &str, name: &str) {
        self.name_to_code
            .entry(name.to_string())
            .or_insert_with(|| code.to_string());
        self.code_to_name
            .entry(code.to_string())
            .or_insert_with(|| name.to_string());
    }

    pub fn code_for_name(&self, name: &str) -> Option<&str> {
        self.name_to_code.get(name).map(String::as_str)
    }

    pub fn name_for_code(&self, code: &str) -> Option<&str> {
        self.code_to_name.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.code_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_to_name.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.code_to_name.keys().map(String::as_str)
    }
}

/// Builds the identity map from every filing, newest first. Only rows whose
/// code cell is itself valid contribute; name-based recovery happens later.
pub fn build_mapping(filings: &[Filing]) -> IdentityMap {
    let mut ordered: Vec<&Filing> = filings.iter().collect();
    ordered.sort_by(|a, b| b.precedence_key().cmp(&a.precedence_key()));

    let mut identity = IdentityMap::default();
    for filing in ordered {
        let index = ColumnIndex::from_headers(&filing.table.headers);
        let (Some(code_col), Some(name_col)) =
            (index.get(STOCK_CODE_HEADER), index.get(COMPANY_NAME_HEADER))
        else {
            continue;
        };

        for row in &filing.table.rows {
            let Some(code) = cell(row, Some(code_col)).and_then(normalize_stock_code) else {
                continue;
            };
            if let Some(name) = cell(row, Some(name_col)) {
                identity.record(&code, name);
            }
        }
    }

    info!(
        "Identity map built: {} codes, {} names",
        identity.code_to_name.len(),
        identity.name_to_code.len()
    );
    identity
}
