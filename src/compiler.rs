use crate::config::{AnnualPrecedence, BuilderConfig, PipelineMode};
use crate::diagnostics::{Diagnostics, RejectedQuarter};
use crate::identity::IdentityMap;
use crate::schema::{
    CompanyHistory, HistoryOutput, HistoryRecord, Metric, Period, Quarter, StatementScope,
};
use crate::store::{AccumulationStore, Cell, EntityRecord, YearCells};
use crate::utils::{fiscal_year_end_date, quarter_end_date};
use log::{info, warn};
use std::collections::BTreeMap;

const REPORTED_PERIODS: [Period; 3] = [Period::Q1, Period::Q2, Period::Q3];

/// Flattens the accumulation store into per-company history.
pub struct HistoryCompiler<'a> {
    config: &'a BuilderConfig,
    identity: &'a IdentityMap,
}

impl<'a> HistoryCompiler<'a> {
    pub fn new(config: &'a BuilderConfig, identity: &'a IdentityMap) -> Self {
        Self { config, identity }
    }

    fn metrics(&self) -> Vec<Metric> {
        let mut metrics = Metric::MONEY.to_vec();
        if self.config.include_eps {
            metrics.push(Metric::Eps);
        }
        metrics
    }

    pub fn compile(&self, store: &AccumulationStore, diagnostics: &mut Diagnostics) -> HistoryOutput {
        let mut companies = BTreeMap::new();

        for (code, record) in store.entities() {
            let history = match self.config.mode {
                PipelineMode::Quarterly => self.quarterly_history(code, record, diagnostics),
                PipelineMode::Annual => self.annual_history(record),
            };
            if history.is_empty() {
                continue;
            }

            let meta = record.meta.as_ref();
            companies.insert(
                code.clone(),
                CompanyHistory {
                    name: self.display_name(code, meta.and_then(|m| m.name.as_deref())),
                    sector: meta.and_then(|m| m.sector.clone()),
                    statement_type: meta.map_or(StatementScope::default(), |m| m.tier),
                    history,
                },
            );
        }

        info!("Compiled history for {} companies", companies.len());
        HistoryOutput(companies)
    }

    /// Name overrides first, then the latest name in the identity map, then
    /// the name captured on first sight.
    pub fn display_name(&self, code: &str, first_seen: Option<&str>) -> String {
        self.config
            .name_overrides
            .get(code)
            .map(String::as_str)
            .or_else(|| self.identity.name_for_code(code))
            .or(first_seen)
            .unwrap_or("Unknown")
            .to_string()
    }

    fn quarterly_history(
        &self,
        code: &str,
        record: &EntityRecord,
        diagnostics: &mut Diagnostics,
    ) -> Vec<HistoryRecord> {
        let fy_end_month = self.config.fiscal_year_end_month;
        let mut history = Vec::new();

        for (&year, periods) in &record.years {
            for period in REPORTED_PERIODS {
                let (Some(cells), Some(quarter)) = (periods.get(&period), period.quarter()) else {
                    continue;
                };
                let Some(period_end) = quarter_end_date(year, quarter, fy_end_month) else {
                    continue;
                };
                let mut entry = HistoryRecord::empty(year, Some(quarter), period_end);
                for metric in self.metrics() {
                    if let Some(cell) = cells.get(&metric) {
                        entry.set(metric, cell.amount, &cell.provenance);
                    }
                }
                if entry.has_primary_metric() {
                    history.push(entry);
                }
            }

            if let Some(q4) = self.derive_q4(code, year, periods, diagnostics) {
                history.push(q4);
            }
        }
        history
    }

    /// The annual cell for `metric` under the configured precedence.
    fn annual_cell<'s>(&self, periods: &'s YearCells, metric: Metric) -> Option<&'s Cell> {
        let order = match self.config.annual_precedence {
            AnnualPrecedence::CurrentFirst => [Period::AnnualCurrent, Period::AnnualPrevious],
            AnnualPrecedence::RestatedFirst => [Period::AnnualPrevious, Period::AnnualCurrent],
        };
        order
            .into_iter()
            .find_map(|period| periods.get(&period)?.get(&metric))
    }

    /// Q4 = annual total - Q3 year-to-date, per metric. A negative revenue
    /// result rejects the whole quarter.
    pub fn derive_q4(
        &self,
        code: &str,
        year: i32,
        periods: &YearCells,
        diagnostics: &mut Diagnostics,
    ) -> Option<HistoryRecord> {
        let accumulated = periods.get(&Period::Q3Acc)?;
        let period_end = quarter_end_date(year, Quarter::Q4, self.config.fiscal_year_end_month)?;
        let mut q4 = HistoryRecord::empty(year, Some(Quarter::Q4), period_end);

        for metric in self.metrics() {
            let (Some(annual), Some(to_date)) =
                (self.annual_cell(periods, metric), accumulated.get(&metric))
            else {
                continue;
            };
            let Some(derived) = annual.amount.checked_sub(to_date.amount) else {
                continue;
            };
            if metric == Metric::Revenue && derived.is_negative() {
                let rejected = RejectedQuarter {
                    code: code.to_string(),
                    year,
                    quarter: Quarter::Q4,
                    revenue: derived.as_won().unwrap_or_default(),
                    annual_revenue: annual.amount.as_won().unwrap_or_default(),
                    accumulated_revenue: to_date.amount.as_won().unwrap_or_default(),
                };
                warn!(
                    "{} {} Q4 revenue {} is negative (annual {}, Q3 accumulated {}); dropping quarter",
                    code, year, rejected.revenue, rejected.annual_revenue, rejected.accumulated_revenue
                );
                diagnostics.rejected_quarters.push(rejected);
                return None;
            }
            q4.set(metric, derived, &annual.provenance);
        }

        q4.has_primary_metric().then_some(q4)
    }

    fn annual_history(&self, record: &EntityRecord) -> Vec<HistoryRecord> {
        let mut history = Vec::new();
        for (&year, periods) in &record.years {
            let Some(period_end) = fiscal_year_end_date(year, self.config.fiscal_year_end_month)
            else {
                continue;
            };
            let mut entry = HistoryRecord::empty(year, None, period_end);
            for metric in self.metrics() {
                if let Some(cell) = self.annual_cell(periods, metric) {
                    entry.set(metric, cell.amount, &cell.provenance);
                }
            }
            if entry.has_primary_metric() {
                history.push(entry);
            }
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Amount, Provenance};
    use chrono::NaiveDate;

    const CODE: &str = "005930";

    fn provenance(source: &str) -> Provenance {
        Provenance {
            item_code: "ifrs-full_Revenue".to_string(),
            item_name: "매출액".to_string(),
            source: source.to_string(),
        }
    }

    fn put(store: &mut AccumulationStore, year: i32, period: Period, metric: Metric, amount: Amount) {
        store.write_if_empty(CODE, year, period, metric, amount, &provenance(period.label()));
    }

    fn compile(config: &BuilderConfig, store: &AccumulationStore) -> (HistoryOutput, Diagnostics) {
        let identity = IdentityMap::default();
        let mut diagnostics = Diagnostics::default();
        let output = HistoryCompiler::new(config, &identity).compile(store, &mut diagnostics);
        (output, diagnostics)
    }

    fn q4_of(output: &HistoryOutput, year: i32) -> Option<&HistoryRecord> {
        output
            .get(CODE)?
            .history
            .iter()
            .find(|r| r.year == year && r.quarter == Some(Quarter::Q4))
    }

    #[test]
    fn test_q4_derivation() {
        let mut store = AccumulationStore::new();
        put(&mut store, 2023, Period::AnnualCurrent, Metric::Revenue, Amount::Won(358_221_900_000_000));
        put(&mut store, 2023, Period::Q3Acc, Metric::Revenue, Amount::Won(269_140_400_000_000));

        let (output, diagnostics) = compile(&BuilderConfig::default(), &store);
        let q4 = q4_of(&output, 2023).unwrap();
        assert_eq!(q4.revenue, Some(89_081_500_000_000));
        assert_eq!(q4.revenue_name.as_deref(), Some("매출액"));
        assert_eq!(q4.period_end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert!(diagnostics.rejected_quarters.is_empty());
    }

    #[test]
    fn test_negative_q4_is_rejected() {
        let mut store = AccumulationStore::new();
        put(&mut store, 2023, Period::AnnualCurrent, Metric::Revenue, Amount::Won(100));
        put(&mut store, 2023, Period::Q3Acc, Metric::Revenue, Amount::Won(150));
        put(&mut store, 2023, Period::AnnualCurrent, Metric::OpProfit, Amount::Won(10));
        put(&mut store, 2023, Period::Q3Acc, Metric::OpProfit, Amount::Won(5));

        let (output, diagnostics) = compile(&BuilderConfig::default(), &store);
        assert!(output.get(CODE).is_none());
        assert_eq!(diagnostics.rejected_quarters.len(), 1);
        let rejected = &diagnostics.rejected_quarters[0];
        assert_eq!(rejected.revenue, -50);
        assert_eq!(rejected.annual_revenue, 100);
        assert_eq!(rejected.accumulated_revenue, 150);
    }

    #[test]
    fn test_current_annual_beats_restated() {
        let mut store = AccumulationStore::new();
        put(&mut store, 2022, Period::AnnualCurrent, Metric::Revenue, Amount::Won(1_000));
        put(&mut store, 2022, Period::AnnualPrevious, Metric::Revenue, Amount::Won(1_100));
        put(&mut store, 2022, Period::Q3Acc, Metric::Revenue, Amount::Won(700));

        let (output, _) = compile(&BuilderConfig::default(), &store);
        assert_eq!(q4_of(&output, 2022).unwrap().revenue, Some(300));

        let restated = BuilderConfig {
            annual_precedence: AnnualPrecedence::RestatedFirst,
            ..BuilderConfig::default()
        };
        let (output, _) = compile(&restated, &store);
        let q4 = q4_of(&output, 2022).unwrap();
        assert_eq!(q4.revenue, Some(400));
        assert_eq!(q4.revenue_code.as_deref(), Some("ifrs-full_Revenue"));
    }

    #[test]
    fn test_restated_used_when_current_absent() {
        let mut store = AccumulationStore::new();
        put(&mut store, 2022, Period::AnnualPrevious, Metric::Revenue, Amount::Won(1_100));
        put(&mut store, 2022, Period::Q3Acc, Metric::Revenue, Amount::Won(700));

        let (output, _) = compile(&BuilderConfig::default(), &store);
        assert_eq!(q4_of(&output, 2022).unwrap().revenue, Some(400));
    }

    #[test]
    fn test_quarter_needs_primary_metric() {
        let mut store = AccumulationStore::new();
        put(&mut store, 2023, Period::Q1, Metric::NetIncome, Amount::Won(5));
        put(&mut store, 2023, Period::Q2, Metric::OpProfit, Amount::Won(7));

        let (output, _) = compile(&BuilderConfig::default(), &store);
        let history = &output.get(CODE).unwrap().history;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].quarter, Some(Quarter::Q2));
        assert_eq!(history[0].op_profit, Some(7));
        assert_eq!(history[0].revenue, None);
    }

    #[test]
    fn test_negative_q4_eps_is_kept() {
        let mut store = AccumulationStore::new();
        put(&mut store, 2023, Period::AnnualCurrent, Metric::Revenue, Amount::Won(400));
        put(&mut store, 2023, Period::Q3Acc, Metric::Revenue, Amount::Won(300));
        put(&mut store, 2023, Period::AnnualCurrent, Metric::Eps, Amount::PerShare(100.0));
        put(&mut store, 2023, Period::Q3Acc, Metric::Eps, Amount::PerShare(150.5));

        let config = BuilderConfig {
            include_eps: true,
            ..BuilderConfig::default()
        };
        let (output, _) = compile(&config, &store);
        let q4 = q4_of(&output, 2023).unwrap();
        assert_eq!(q4.revenue, Some(100));
        assert_eq!(q4.eps, Some(-50.5));

        let (output, _) = compile(&BuilderConfig::default(), &store);
        assert_eq!(q4_of(&output, 2023).unwrap().eps, None);
    }

    #[test]
    fn test_annual_mode_records() {
        let mut store = AccumulationStore::new();
        put(&mut store, 2022, Period::AnnualPrevious, Metric::Revenue, Amount::Won(900));
        put(&mut store, 2023, Period::AnnualCurrent, Metric::Revenue, Amount::Won(1_000));
        put(&mut store, 2023, Period::AnnualCurrent, Metric::NetIncome, Amount::Won(80));
        put(&mut store, 2023, Period::Q1, Metric::Revenue, Amount::Won(250));

        let config = BuilderConfig {
            mode: PipelineMode::Annual,
            ..BuilderConfig::default()
        };
        let (output, _) = compile(&config, &store);
        let history = &output.get(CODE).unwrap().history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].year, 2022);
        assert_eq!(history[0].quarter, None);
        assert_eq!(history[0].revenue, Some(900));
        assert_eq!(history[1].revenue, Some(1_000));
        assert_eq!(history[1].net_income, Some(80));
        assert_eq!(history[1].period_end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn test_display_name_resolution() {
        let config = BuilderConfig::default();
        let mut identity = IdentityMap::default();
        identity.record("005490", "포스코");
        identity.record("000660", "SK하이닉스");
        let compiler = HistoryCompiler::new(&config, &identity);

        assert_eq!(compiler.display_name("005490", Some("포스코")), "POSCO홀딩스");
        assert_eq!(compiler.display_name("000660", Some("하이닉스반도체")), "SK하이닉스");
        assert_eq!(compiler.display_name("000001", Some("첫이름")), "첫이름");
        assert_eq!(compiler.display_name("000002", None), "Unknown");
    }
}
