use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[schemars(description = "Operating revenue (매출액)")]
    Revenue,

    #[schemars(description = "Operating profit (영업이익)")]
    OpProfit,

    #[schemars(description = "Net income for the period (당기순이익)")]
    NetIncome,

    #[schemars(description = "Basic earnings per share (기본주당순이익)")]
    Eps,
}

impl Metric {
    pub const MONEY: [Metric; 3] = [Metric::Revenue, Metric::OpProfit, Metric::NetIncome];

    /// Whether this metric alone can justify emitting a history record.
    pub const fn is_primary(self) -> bool {
        matches!(self, Metric::Revenue | Metric::OpProfit)
    }

    pub const fn is_per_share(self) -> bool {
        matches!(self, Metric::Eps)
    }

    pub const fn key(self) -> &'static str {
        match self {
            Metric::Revenue => "revenue",
            Metric::OpProfit => "op_profit",
            Metric::NetIncome => "net_income",
            Metric::Eps => "eps",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Canonical bucket inside a fiscal year. Q4 is never observed, only derived.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub enum Period {
    Q1,
    Q2,
    Q3,
    #[serde(rename = "Q3_Acc")]
    Q3Acc,
    #[serde(rename = "Annual_Current")]
    AnnualCurrent,
    #[serde(rename = "Annual_Previous")]
    AnnualPrevious,
}

impl Period {
    pub const fn label(self) -> &'static str {
        match self {
            Period::Q1 => "Q1",
            Period::Q2 => "Q2",
            Period::Q3 => "Q3",
            Period::Q3Acc => "Q3_Acc",
            Period::AnnualCurrent => "Annual_Current",
            Period::AnnualPrevious => "Annual_Previous",
        }
    }

    /// Fiscal year a value read from a filing of `filing_year` belongs to.
    pub const fn target_year(self, filing_year: i32) -> i32 {
        match self {
            Period::AnnualPrevious => filing_year - 1,
            _ => filing_year,
        }
    }

    pub const fn quarter(self) -> Option<Quarter> {
        match self {
            Period::Q1 => Some(Quarter::Q1),
            Period::Q2 => Some(Quarter::Q2),
            Period::Q3 => Some(Quarter::Q3),
            _ => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const fn number(self) -> u32 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 2,
            Quarter::Q3 => 3,
            Quarter::Q4 => 4,
        }
    }
}

/// Declared report type of a filing. Variant order is the precedence order
/// inside a fiscal year.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    FirstQuarter,
    HalfYear,
    ThirdQuarter,
    Annual,
}

impl ReportType {
    /// Classifies a report-type token such as `1분기보고서` or `사업보고서`.
    pub fn from_token(token: &str) -> Option<Self> {
        if token.contains("1분기보고서") {
            Some(Self::FirstQuarter)
        } else if token.contains("반기보고서") {
            Some(Self::HalfYear)
        } else if token.contains("3분기보고서") {
            Some(Self::ThirdQuarter)
        } else if token.contains("사업보고서") {
            Some(Self::Annual)
        } else {
            None
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StatementScope {
    #[default]
    #[schemars(description = "Parent and subsidiaries combined (연결)")]
    Consolidated,

    #[schemars(description = "Parent-only statement (별도)")]
    Separate,
}

/// Variant order is the precedence order: the comprehensive statement fills
/// cells first, the plain income statement only fills what it left empty.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StatementCategory {
    ComprehensiveIncome,
    IncomeStatement,
    /// Balance sheet, cash flow and equity statements. Read for company
    /// identity only, never for metrics.
    Other,
}

impl StatementCategory {
    pub fn from_filename(name: &str) -> Self {
        if name.contains("현금흐름표") || name.contains("재무상태표") || name.contains("자본변동표")
        {
            Self::Other
        } else if name.contains("포괄손익계산서") {
            Self::ComprehensiveIncome
        } else if name.contains("손익계산서") {
            Self::IncomeStatement
        } else {
            Self::Other
        }
    }

    pub const fn is_income(self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// A stored numeric value. Monetary metrics are whole won, EPS is per share.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum Amount {
    Won(i64),
    PerShare(f64),
}

impl Amount {
    pub const fn as_won(self) -> Option<i64> {
        match self {
            Amount::Won(v) => Some(v),
            Amount::PerShare(_) => None,
        }
    }

    pub const fn as_per_share(self) -> Option<f64> {
        match self {
            Amount::PerShare(v) => Some(v),
            Amount::Won(_) => None,
        }
    }

    pub fn is_negative(self) -> bool {
        match self {
            Amount::Won(v) => v < 0,
            Amount::PerShare(v) => v < 0.0,
        }
    }

    /// `self - other`, `None` on overflow or when the kinds differ.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        match (self, other) {
            (Amount::Won(a), Amount::Won(b)) => a.checked_sub(b).map(Amount::Won),
            (Amount::PerShare(a), Amount::PerShare(b)) => Some(Amount::PerShare(a - b)),
            _ => None,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Won(v) => write!(f, "{}원", v),
            Amount::PerShare(v) => write!(f, "{:.2}원", v),
        }
    }
}

/// Where a stored value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Provenance {
    #[schemars(description = "Line-item code as disclosed (e.g. 'ifrs-full_Revenue')")]
    pub item_code: String,

    #[schemars(description = "Line-item display name as disclosed (e.g. '매출액')")]
    pub item_name: String,

    #[schemars(description = "Source filing the value was read from")]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryRecord {
    pub year: i32,

    #[schemars(description = "Quarter of the record; null for annual records")]
    pub quarter: Option<Quarter>,

    #[schemars(description = "Last day of the reporting period")]
    pub period_end: NaiveDate,

    pub revenue: Option<i64>,
    pub op_profit: Option<i64>,
    pub net_income: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eps: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_profit_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_profit_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_income_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_income_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eps_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eps_name: Option<String>,
}

impl HistoryRecord {
    pub fn empty(year: i32, quarter: Option<Quarter>, period_end: NaiveDate) -> Self {
        Self {
            year,
            quarter,
            period_end,
            revenue: None,
            op_profit: None,
            net_income: None,
            eps: None,
            revenue_code: None,
            revenue_name: None,
            op_profit_code: None,
            op_profit_name: None,
            net_income_code: None,
            net_income_name: None,
            eps_code: None,
            eps_name: None,
        }
    }

    pub fn set(&mut self, metric: Metric, amount: Amount, provenance: &Provenance) {
        let code = Some(provenance.item_code.clone());
        let name = Some(provenance.item_name.clone());
        match metric {
            Metric::Revenue => {
                self.revenue = amount.as_won();
                self.revenue_code = code;
                self.revenue_name = name;
            }
            Metric::OpProfit => {
                self.op_profit = amount.as_won();
                self.op_profit_code = code;
                self.op_profit_name = name;
            }
            Metric::NetIncome => {
                self.net_income = amount.as_won();
                self.net_income_code = code;
                self.net_income_name = name;
            }
            Metric::Eps => {
                self.eps = amount.as_per_share();
                self.eps_code = code;
                self.eps_name = name;
            }
        }
    }

    pub fn has_primary_metric(&self) -> bool {
        self.revenue.is_some() || self.op_profit.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompanyHistory {
    pub name: String,
    pub sector: Option<String>,
    pub statement_type: StatementScope,
    pub history: Vec<HistoryRecord>,
}

/// Compiled output keyed by six-digit stock code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct HistoryOutput(pub BTreeMap<String, CompanyHistory>);

impl HistoryOutput {
    pub fn get(&self, code: &str) -> Option<&CompanyHistory> {
        self.0.get(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn companies(&self) -> impl Iterator<Item = (&String, &CompanyHistory)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(HistoryOutput)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}
