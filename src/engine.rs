use crate::classifier::{disambiguate, Classification, FallbackCandidate, FallbackResolution, MetricClassifier};
use crate::config::{BuilderConfig, PassEligibility, PassRule, PipelineMode};
use crate::diagnostics::{AmbiguousFallback, CandidateAmount, Diagnostics};
use crate::identity::IdentityMap;
use crate::ingestion::{cell, Filing, FilingLayout};
use crate::normalize::{clean_header, parse_amount, CodeResolver};
use crate::schema::{Amount, Metric, Period, Provenance, ReportType, StatementScope};
use crate::store::{AccumulationStore, WriteOutcome};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Accumulates metric observations across the configured passes.
///
/// Every pass walks its filings in precedence order and writes through the
/// store's first-write-wins rule, so the earliest pass and the earliest
/// filing inside a pass hold authority over a cell.
pub struct ReconciliationEngine<'a> {
    config: &'a BuilderConfig,
    identity: &'a IdentityMap,
    classifier: MetricClassifier,
    store: AccumulationStore,
    fallback_queue: BTreeMap<(String, i32), Vec<FallbackCandidate>>,
    stable_revenue_years: BTreeSet<(String, i32)>,
    entities_with_data: BTreeSet<String>,
    diagnostics: Diagnostics,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(config: &'a BuilderConfig, identity: &'a IdentityMap) -> Self {
        Self {
            config,
            identity,
            classifier: MetricClassifier::new(config.include_eps),
            store: AccumulationStore::new(),
            fallback_queue: BTreeMap::new(),
            stable_revenue_years: BTreeSet::new(),
            entities_with_data: BTreeSet::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Runs every configured pass over `filings`, in policy order.
    pub fn run(&mut self, filings: &[Filing]) {
        let config = self.config;
        for (i, rule) in config.pass_policy.passes.iter().enumerate() {
            self.run_pass(i + 1, rule, filings);
        }
    }

    fn run_pass(&mut self, number: usize, rule: &PassRule, filings: &[Filing]) {
        let eligible = match rule.eligibility {
            PassEligibility::AllEntities => None,
            PassEligibility::MissingWithoutPriorData => {
                let missing = self.missing_entities();
                if missing.is_empty() {
                    info!("Pass {} ({:?}): no entities qualify, skipping", number, rule.scope);
                    return;
                }
                Some(missing)
            }
        };

        let mut pass_filings: Vec<&Filing> = filings
            .iter()
            .filter(|f| f.descriptor.scope == rule.scope && self.reads_metrics(f))
            .collect();
        pass_filings.sort_by(|a, b| a.precedence_key().cmp(&b.precedence_key()));

        info!(
            "Pass {} ({:?}): {} filings, {}",
            number,
            rule.scope,
            pass_filings.len(),
            eligible
                .as_ref()
                .map_or("all entities".to_string(), |e| format!("{} qualifying entities", e.len()))
        );

        let mut seen = BTreeSet::new();
        for filing in pass_filings {
            self.extract_filing(filing, rule.scope, eligible.as_ref(), &mut seen);
        }
        self.resolve_fallbacks();

        info!("Pass {} touched {} entities", number, seen.len());
        self.entities_with_data.extend(seen);
    }

    fn reads_metrics(&self, filing: &Filing) -> bool {
        if !filing.descriptor.category.is_income() {
            return false;
        }
        match self.config.mode {
            PipelineMode::Quarterly => true,
            PipelineMode::Annual => filing.descriptor.report_type == ReportType::Annual,
        }
    }

    /// Reads one filing into the store. Rows for entities outside `eligible`
    /// are ignored; every entity a row resolves to is added to `seen`.
    pub fn extract_filing(
        &mut self,
        filing: &Filing,
        scope: StatementScope,
        eligible: Option<&BTreeSet<String>>,
        seen: &mut BTreeSet<String>,
    ) {
        let layout = match FilingLayout::resolve(filing) {
            Ok(layout) => layout,
            Err(e) => {
                self.diagnostics.skip_file(&filing.source, e.to_string());
                return;
            }
        };
        debug!(
            "Processing {} ({} rows, {} period columns)",
            filing.source,
            filing.table.rows.len(),
            layout.periods.len()
        );

        let config = self.config;
        let resolver = CodeResolver::new(&config.code_aliases).with_identity(self.identity);
        let year = filing.descriptor.fiscal_year;

        for row in &filing.table.rows {
            if !layout.covers(row) {
                self.diagnostics.short_rows += 1;
                continue;
            }

            let name = cell(row, layout.name);
            let Some(code) = resolver.resolve(&row[layout.code], name) else {
                continue;
            };
            if eligible.is_some_and(|set| !set.contains(&code)) {
                continue;
            }
            seen.insert(code.clone());

            let sector = self
                .store
                .register_entity(&code, name, cell(row, layout.sector), scope)
                .sector
                .clone();
            if config.is_excluded_sector(sector.as_deref()) {
                continue;
            }

            let item_code = cell(row, Some(layout.item_code)).unwrap_or_default();
            let item_name = cell(row, layout.item_name).unwrap_or_default();

            match self.classifier.classify(item_code, item_name) {
                Classification::Metric(metric) => {
                    if metric == Metric::Revenue && self.classifier.is_stable_revenue_code(item_code)
                    {
                        self.stable_revenue_years.insert((code.clone(), year));
                    }
                    let provenance = Provenance {
                        item_code: item_code.to_string(),
                        item_name: item_name.to_string(),
                        source: filing.source.clone(),
                    };
                    for resolved in &layout.periods {
                        if let Some(amount) = parse_amount(&row[resolved.column], metric) {
                            self.write(
                                &code,
                                resolved.period.target_year(year),
                                resolved.period,
                                metric,
                                amount,
                                &provenance,
                            );
                        }
                    }
                }
                Classification::FallbackRevenue => {
                    let amounts = layout
                        .periods
                        .iter()
                        .filter_map(|resolved| {
                            parse_amount(&row[resolved.column], Metric::Revenue).map(|amount| {
                                CandidateAmount {
                                    period: resolved.period,
                                    year: resolved.period.target_year(year),
                                    amount,
                                }
                            })
                        })
                        .collect();
                    self.fallback_queue
                        .entry((code, year))
                        .or_default()
                        .push(FallbackCandidate {
                            item_code: item_code.to_string(),
                            item_name: item_name.to_string(),
                            clean_name: clean_header(item_name),
                            source: filing.source.clone(),
                            amounts,
                        });
                }
                Classification::Excluded | Classification::Unmatched => {}
            }
        }
    }

    fn write(
        &mut self,
        code: &str,
        year: i32,
        period: Period,
        metric: Metric,
        amount: Amount,
        provenance: &Provenance,
    ) {
        if self
            .store
            .write_if_empty(code, year, period, metric, amount, provenance)
            == WriteOutcome::Occupied
        {
            self.diagnostics.blocked_overwrites += 1;
            debug!(
                "{} {} {} {} already set; ignoring {} from {}",
                code, year, period, metric, amount, provenance.source
            );
        }
    }

    /// Drains the fallback queue. Entity-years that saw a stable revenue code
    /// are skipped, unresolved ones are reported and nothing is stored.
    pub fn resolve_fallbacks(&mut self) {
        let queue = std::mem::take(&mut self.fallback_queue);
        if queue.is_empty() {
            return;
        }
        debug!("Resolving fallback revenue for {} entity-years", queue.len());

        for ((code, year), candidates) in queue {
            if self.stable_revenue_years.contains(&(code.clone(), year)) {
                continue;
            }

            match disambiguate(candidates) {
                FallbackResolution::Accepted(accepted) => {
                    for candidate in accepted {
                        let provenance = Provenance {
                            item_code: candidate.item_code.clone(),
                            item_name: candidate.item_name.clone(),
                            source: candidate.source.clone(),
                        };
                        for value in &candidate.amounts {
                            self.write(
                                &code,
                                value.year,
                                value.period,
                                Metric::Revenue,
                                value.amount,
                                &provenance,
                            );
                        }
                    }
                }
                FallbackResolution::Ambiguous(candidates) => {
                    let name = self.store.meta(&code).and_then(|m| m.name.clone());
                    warn!(
                        "{} {} {}: {} fallback revenue candidates, none stored",
                        code,
                        name.as_deref().unwrap_or("Unknown"),
                        year,
                        candidates.len()
                    );
                    self.diagnostics.ambiguous_fallbacks.push(AmbiguousFallback {
                        code,
                        name,
                        year,
                        candidates: candidates.iter().map(FallbackCandidate::summary).collect(),
                    });
                }
            }
        }
    }

    /// Entities with no data from any earlier pass that still lack something
    /// inside the target year range. Alias codes count only once their name
    /// or code has appeared in the filings.
    pub fn missing_entities(&self) -> BTreeSet<String> {
        let aliases = self
            .config
            .code_aliases
            .iter()
            .filter(|(name, code)| {
                self.identity.code_for_name(name).is_some()
                    || self.identity.name_for_code(code).is_some()
                    || self.store.entity(code).is_some()
            })
            .map(|(_, code)| code.as_str());
        let universe: BTreeSet<&str> = self
            .identity
            .codes()
            .chain(self.store.entities().map(|(code, _)| code.as_str()))
            .chain(aliases)
            .collect();

        universe
            .into_iter()
            .filter(|code| !self.entities_with_data.contains(*code))
            .filter(|code| self.is_missing_data(code))
            .map(str::to_string)
            .collect()
    }

    fn is_missing_data(&self, code: &str) -> bool {
        let has_revenue =
            |year: i32, period: Period| self.store.amount(code, year, period, Metric::Revenue).is_some();

        self.config.target_years().any(|year| match self.config.mode {
            PipelineMode::Quarterly => {
                let quarter_gap = [Period::Q1, Period::Q2, Period::Q3]
                    .into_iter()
                    .any(|period| !has_revenue(year, period));
                let has_annual = self.store.has_period(code, year, Period::AnnualCurrent)
                    || self.store.has_period(code, year, Period::AnnualPrevious);
                let has_accumulated = self.store.has_period(code, year, Period::Q3Acc);
                quarter_gap || !(has_annual && has_accumulated)
            }
            PipelineMode::Annual => {
                !has_revenue(year, Period::AnnualCurrent) && !has_revenue(year, Period::AnnualPrevious)
            }
        })
    }

    pub fn finish(self) -> (AccumulationStore, Diagnostics) {
        (self.store, self.diagnostics)
    }
}
