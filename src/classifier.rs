//! Line-item classification.
//!
//! Stable codes are checked first. Revenue alone has a name-based fallback,
//! and fallback candidates are only queued here; [`disambiguate`] decides
//! which of them, if any, are stored.

use crate::diagnostics::{CandidateAmount, CandidateSummary};
use crate::normalize::clean_header;
use crate::schema::Metric;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeMatch {
    /// The item code must equal an allowed code.
    Exact,
    /// The item code must contain an allowed code.
    Contains,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDefinition {
    pub metric: Metric,
    pub codes: &'static [&'static str],
    pub code_match: CodeMatch,
    pub names: &'static [&'static str],
    pub exclude_codes: &'static [&'static str],
    pub exclude_names: &'static [&'static str],
}

impl MetricDefinition {
    pub fn excludes(&self, item_code: &str, clean_name: &str) -> bool {
        self.exclude_codes.iter().any(|c| item_code.contains(c))
            || self.exclude_names.iter().any(|n| clean_name.contains(n))
    }

    pub fn matches(&self, item_code: &str, clean_name: &str) -> bool {
        let code_hit = match self.code_match {
            CodeMatch::Exact => self.codes.iter().any(|c| item_code == *c),
            CodeMatch::Contains => self.codes.iter().any(|c| item_code.contains(c)),
        };
        code_hit || self.names.iter().any(|n| clean_name.contains(n))
    }
}

// Many unrelated codes embed the revenue code, so revenue matches exactly and
// carries no name list.
pub const REVENUE: MetricDefinition = MetricDefinition {
    metric: Metric::Revenue,
    codes: &["ifrs_Revenue", "ifrs-full_Revenue"],
    code_match: CodeMatch::Exact,
    names: &[],
    exclude_codes: &[
        "RevenueFrom",
        "OtherRevenue",
        "InterestRevenue",
        "InterestIncome",
        "InterestRevenueExpense",
        "InterestRevenueCalculatedUsingEffectiveInterestMethod",
        "InterestIncomeFinanceIncome",
        "TotalOperatingRevenue",
        "DividendRevenue",
        "Dividends",
        "dart_",
    ],
    exclude_names: &[],
};

pub const OP_PROFIT: MetricDefinition = MetricDefinition {
    metric: Metric::OpProfit,
    codes: &[
        "dart_OperatingIncomeLoss",
        "ifrs_OperatingIncomeLoss",
        "ifrs-full_ProfitLossFromOperatingActivities",
    ],
    code_match: CodeMatch::Contains,
    names: &["영업이익", "영업이익(손실)", "영업손익"],
    exclude_codes: &[],
    exclude_names: &[],
};

pub const NET_INCOME: MetricDefinition = MetricDefinition {
    metric: Metric::NetIncome,
    codes: &[
        "ifrs_ProfitLoss",
        "ifrs-full_ProfitLoss",
        "ifrs-full_ProfitLossAttributableToOwnersOfParent",
        "ifrs_ProfitLossAttributableToOwnersOfParent",
    ],
    code_match: CodeMatch::Contains,
    names: &["당기순이익", "당기순손익", "지배기업소유주순이익", "당기순이익(손실)"],
    exclude_codes: &[],
    exclude_names: &[],
};

pub const EPS: MetricDefinition = MetricDefinition {
    metric: Metric::Eps,
    codes: &[
        "ifrs-full_BasicEarningsLossPerShare",
        "ifrs_BasicEarningsLossPerShare",
        "dart_BasicEarningsPerShare",
    ],
    code_match: CodeMatch::Contains,
    names: &["기본주당순이익", "기본주당이익", "주당순이익"],
    exclude_codes: &["Diluted"],
    exclude_names: &["희석"],
};

/// Fallback revenue labels, highest priority first.
pub const FALLBACK_REVENUE_NAMES: [&str; 4] = ["매출액", "영업수익", "매출", "수익"];

/// Qualifiers marking a non-operating or sector-specific revenue line.
pub const FALLBACK_EXCLUDE_PATTERNS: [&str; 16] = [
    "이자", "금융", "임대", "광고", "채권", "기타", "배당", "수수료", "시험", "공사", "가공", "상품",
    "원가", "외", "이지", "법인",
];

const STRUCTURAL_EXCLUDE_CODES: [&str; 2] = ["CostOfSales", "GrossProfit"];
const STRUCTURAL_EXCLUDE_NAMES: [&str; 3] = ["매출원가", "매출총이익", "매출총손실"];

/// Cost-of-sales and gross-profit lines are never a metric.
pub fn is_structural_exclusion(item_code: &str, clean_name: &str) -> bool {
    STRUCTURAL_EXCLUDE_CODES.iter().any(|c| item_code.contains(c))
        || STRUCTURAL_EXCLUDE_NAMES.iter().any(|n| clean_name.contains(n))
}

/// The highest-priority fallback label contained in `clean_name`, unless a
/// qualifier rules the line out.
pub fn fallback_match(clean_name: &str) -> Option<&'static str> {
    if FALLBACK_EXCLUDE_PATTERNS
        .iter()
        .any(|pattern| clean_name.contains(pattern))
    {
        return None;
    }
    FALLBACK_REVENUE_NAMES
        .iter()
        .copied()
        .find(|label| clean_name.contains(label))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Metric(Metric),
    FallbackRevenue,
    Excluded,
    Unmatched,
}

#[derive(Debug, Clone)]
pub struct MetricClassifier {
    definitions: Vec<MetricDefinition>,
}

impl MetricClassifier {
    pub fn new(include_eps: bool) -> Self {
        let mut definitions = vec![REVENUE, OP_PROFIT, NET_INCOME];
        if include_eps {
            definitions.push(EPS);
        }
        Self { definitions }
    }

    /// Definitions are tried in order, so an operating-profit code that also
    /// contains a net-income code resolves to operating profit.
    pub fn classify(&self, item_code: &str, item_name: &str) -> Classification {
        let item_code = item_code.trim();
        let clean_name = clean_header(item_name);

        if is_structural_exclusion(item_code, &clean_name) {
            return Classification::Excluded;
        }

        for definition in &self.definitions {
            if definition.excludes(item_code, &clean_name) {
                continue;
            }
            if definition.matches(item_code, &clean_name) {
                return Classification::Metric(definition.metric);
            }
        }

        if fallback_match(&clean_name).is_some() {
            Classification::FallbackRevenue
        } else {
            Classification::Unmatched
        }
    }

    pub fn is_stable_revenue_code(&self, item_code: &str) -> bool {
        REVENUE.codes.contains(&item_code.trim())
    }
}

/// A revenue line matched by name only, with every amount its row carried.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackCandidate {
    pub item_code: String,
    pub item_name: String,
    pub clean_name: String,
    pub source: String,
    pub amounts: Vec<CandidateAmount>,
}

impl FallbackCandidate {
    pub fn summary(&self) -> CandidateSummary {
        CandidateSummary {
            item_code: self.item_code.clone(),
            item_name: self.item_name.clone(),
            source: self.source.clone(),
            amounts: self.amounts.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackResolution {
    /// Candidates to store, all sharing one cleaned name.
    Accepted(Vec<FallbackCandidate>),
    /// No unique winner; every remaining candidate is reported.
    Ambiguous(Vec<FallbackCandidate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WinningLabel {
    Sales,
    OperatingRevenue,
    OperatingRevenueWithSales,
}

impl WinningLabel {
    fn admits(self, clean_name: &str) -> bool {
        match self {
            WinningLabel::Sales => clean_name == "매출액",
            WinningLabel::OperatingRevenue => clean_name == "영업수익",
            WinningLabel::OperatingRevenueWithSales => {
                clean_name.contains("영업수익") && clean_name.contains("매출")
            }
        }
    }
}

/// The one line item `label` admits, if exactly one distinct code carries it.
fn single_line(candidates: &[FallbackCandidate], label: WinningLabel) -> Option<String> {
    let codes: BTreeSet<&str> = candidates
        .iter()
        .filter(|c| label.admits(&c.clean_name))
        .map(|c| c.item_code.as_str())
        .collect();
    match codes.len() {
        1 => codes.into_iter().next().map(str::to_string),
        _ => None,
    }
}

/// Narrows one entity-year's fallback candidates.
///
/// Candidates are deduplicated by (code, source). When they all share a
/// cleaned name they are the same line across filings and all are accepted.
/// Otherwise exact `매출액` wins outright, else exact `영업수익` if a single
/// line carries it, else a single `영업수익` line that also mentions `매출`.
/// A line reported in several filings counts once.
pub fn disambiguate(candidates: Vec<FallbackCandidate>) -> FallbackResolution {
    let mut seen = HashSet::new();
    let deduped: Vec<FallbackCandidate> = candidates
        .into_iter()
        .filter(|c| seen.insert((c.item_code.clone(), c.source.clone())))
        .collect();

    let names: BTreeSet<&str> = deduped.iter().map(|c| c.clean_name.as_str()).collect();
    if names.len() <= 1 {
        return FallbackResolution::Accepted(deduped);
    }

    let winner = if names.contains("매출액") {
        Some((WinningLabel::Sales, None))
    } else {
        [
            WinningLabel::OperatingRevenue,
            WinningLabel::OperatingRevenueWithSales,
        ]
        .into_iter()
        .find_map(|label| single_line(&deduped, label).map(|code| (label, Some(code))))
    };

    match winner {
        Some((label, code)) => FallbackResolution::Accepted(
            deduped
                .into_iter()
                .filter(|c| label.admits(&c.clean_name))
                .filter(|c| code.as_ref().is_none_or(|code| *code == c.item_code))
                .collect(),
        ),
        None => FallbackResolution::Ambiguous(deduped),
    }
}
