use serde::{Deserialize, Serialize};

/// One point of the sweep grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialParameters {
    pub docs: u64,
    pub dbs: u64,
}

impl TrialParameters {
    pub fn new(docs: u64, dbs: u64) -> Self {
        Self { docs, dbs }
    }
}

/// Durations of the two measured phases, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub insert: f64,
    pub sync: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub dbs: u64,
    pub docs: u64,
    pub repetition: u32,
    pub insert: f64,
    pub sync: f64,

    /// Single-database baseline holding `docs * dbs` documents, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single: Option<PhaseTiming>,
}

impl TrialResult {
    pub fn new(params: TrialParameters, repetition: u32, timing: PhaseTiming) -> Self {
        Self {
            dbs: params.dbs,
            docs: params.docs,
            repetition,
            insert: timing.insert,
            sync: timing.sync,
            single: None,
        }
    }

    pub fn params(&self) -> TrialParameters {
        TrialParameters::new(self.docs, self.dbs)
    }

    pub fn timing(&self) -> PhaseTiming {
        PhaseTiming {
            insert: self.insert,
            sync: self.sync,
        }
    }
}

/// Means and sums over every recorded repetition of one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub dbs: u64,
    pub docs: u64,
    pub runs: u32,
    pub insert: f64,
    pub sync: f64,
    #[serde(rename = "fullInsert")]
    pub full_insert: f64,
    #[serde(rename = "fullSync")]
    pub full_sync: f64,
}

/// A grid point repetition that did not produce a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTrial {
    pub dbs: u64,
    pub docs: u64,
    pub repetition: u32,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub results: Vec<TrialResult>,
    pub aggregates: Vec<AggregateResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailedTrial>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
    pub insert_mode: String,
    pub derivation: String,
    pub repetitions: u32,
    pub baseline: bool,
}
