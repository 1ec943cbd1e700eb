//! Which periods a filing can supply and which column holds each one.
//!
//! Column naming drifts between filing vintages, so every period carries an
//! ordered list of candidate headers. The first header present wins.

use crate::schema::{Period, ReportType};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodTarget {
    pub period: Period,
    pub candidates: &'static [&'static str],
}

static FIRST_QUARTER: [PeriodTarget; 1] = [PeriodTarget {
    period: Period::Q1,
    candidates: &["당기1분기3개월", "당기1분기", "당기"],
}];

static HALF_YEAR: [PeriodTarget; 1] = [PeriodTarget {
    period: Period::Q2,
    candidates: &["당기반기3개월", "당기2분기3개월", "당기2분기"],
}];

static THIRD_QUARTER: [PeriodTarget; 2] = [
    PeriodTarget {
        period: Period::Q3,
        candidates: &["당기3분기3개월"],
    },
    PeriodTarget {
        period: Period::Q3Acc,
        candidates: &["당기3분기누적"],
    },
];

static ANNUAL: [PeriodTarget; 2] = [
    PeriodTarget {
        period: Period::AnnualCurrent,
        candidates: &["당기", "당기사업년도"],
    },
    PeriodTarget {
        period: Period::AnnualPrevious,
        candidates: &["전기", "전기사업년도"],
    },
];

pub fn periods_for(report_type: ReportType) -> &'static [PeriodTarget] {
    match report_type {
        ReportType::FirstQuarter => &FIRST_QUARTER,
        ReportType::HalfYear => &HALF_YEAR,
        ReportType::ThirdQuarter => &THIRD_QUARTER,
        ReportType::Annual => &ANNUAL,
    }
}

/// Cleaned header to column position. Blank headers are not indexed and a
/// repeated header keeps its first position.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn from_headers(headers: &[String]) -> Self {
        let mut positions = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            if !header.is_empty() {
                positions.entry(header.clone()).or_insert(i);
            }
        }
        Self { positions }
    }

    pub fn get(&self, header: &str) -> Option<usize> {
        self.positions.get(header).copied()
    }

    pub fn resolve(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|candidate| self.get(candidate))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPeriod {
    pub period: Period,
    pub column: usize,
}

/// Periods of `report_type` whose column could be found, in table order.
pub fn resolve_periods(report_type: ReportType, index: &ColumnIndex) -> Vec<ResolvedPeriod> {
    periods_for(report_type)
        .iter()
        .filter_map(|target| {
            index.resolve(target.candidates).map(|column| ResolvedPeriod {
                period: target.period,
                column,
            })
        })
        .collect()
}
