use crate::schema::{Amount, Metric, Period, Provenance, StatementScope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One stored value and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub amount: Amount,
    pub provenance: Provenance,
}

/// Metadata captured the first time an entity is seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub tier: StatementScope,
}

pub type PeriodCells = BTreeMap<Metric, Cell>;
pub type YearCells = BTreeMap<Period, PeriodCells>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub meta: Option<EntityMeta>,
    pub years: BTreeMap<i32, YearCells>,
}

impl EntityRecord {
    pub fn has_cells(&self) -> bool {
        self.years
            .values()
            .any(|periods| periods.values().any(|metrics| !metrics.is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The cell already held a value; nothing changed.
    Occupied,
}

/// Accumulation cells keyed by (entity, fiscal year, period, metric).
///
/// A populated cell is never overwritten: the first successful write wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccumulationStore {
    entities: BTreeMap<String, EntityRecord>,
}

impl AccumulationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records metadata on first sight. Later calls for the same entity
    /// return the stored metadata unchanged.
    pub fn register_entity(
        &mut self,
        code: &str,
        name: Option<&str>,
        sector: Option<&str>,
        tier: StatementScope,
    ) -> &EntityMeta {
        let record = self.entities.entry(code.to_string()).or_default();
        record.meta.get_or_insert_with(|| EntityMeta {
            name: name.map(str::to_string),
            sector: sector.map(str::to_string),
            tier,
        })
    }

    pub fn write_if_empty(
        &mut self,
        code: &str,
        year: i32,
        period: Period,
        metric: Metric,
        amount: Amount,
        provenance: &Provenance,
    ) -> WriteOutcome {
        let metrics = self
            .entities
            .entry(code.to_string())
            .or_default()
            .years
            .entry(year)
            .or_default()
            .entry(period)
            .or_default();

        if metrics.contains_key(&metric) {
            return WriteOutcome::Occupied;
        }
        metrics.insert(
            metric,
            Cell {
                amount,
                provenance: provenance.clone(),
            },
        );
        WriteOutcome::Written
    }

    pub fn cell(&self, code: &str, year: i32, period: Period, metric: Metric) -> Option<&Cell> {
        self.period_cells(code, year, period)?.get(&metric)
    }

    pub fn amount(&self, code: &str, year: i32, period: Period, metric: Metric) -> Option<Amount> {
        self.cell(code, year, period, metric).map(|cell| cell.amount)
    }

    pub fn provenance(
        &self,
        code: &str,
        year: i32,
        period: Period,
        metric: Metric,
    ) -> Option<&Provenance> {
        self.cell(code, year, period, metric)
            .map(|cell| &cell.provenance)
    }

    pub fn period_cells(&self, code: &str, year: i32, period: Period) -> Option<&PeriodCells> {
        self.entities.get(code)?.years.get(&year)?.get(&period)
    }

    /// True when the period bucket holds at least one metric.
    pub fn has_period(&self, code: &str, year: i32, period: Period) -> bool {
        self.period_cells(code, year, period)
            .is_some_and(|metrics| !metrics.is_empty())
    }

    pub fn meta(&self, code: &str) -> Option<&EntityMeta> {
        self.entities.get(code)?.meta.as_ref()
    }

    pub fn entity(&self, code: &str) -> Option<&EntityRecord> {
        self.entities.get(code)
    }

    pub fn entities(&self) -> impl Iterator<Item = (&String, &EntityRecord)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
