//! Parameter sweep over (database count, document count) and aggregation of
//! repeated trials.

use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::time::Duration;

use clap::ValueEnum;

use crate::error::{BenchError, SweepError};
use crate::runner::BenchmarkRunner;
use crate::schema::{AggregateResult, FailedTrial, SweepOutcome, TrialParameters, TrialResult};

/// Geometric progression `start, start*factor, ...` up to and including `bound`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Axis {
    pub start: u64,
    pub bound: u64,
    pub factor: u64,
}

impl Axis {
    pub const fn new(start: u64, bound: u64, factor: u64) -> Self {
        Self {
            start,
            bound,
            factor,
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), BenchError> {
        if self.start < 1 {
            return Err(BenchError::Config(format!("{name} axis must start at 1 or more")));
        }
        if self.bound < self.start {
            return Err(BenchError::Config(format!(
                "{name} axis bound {} is below its start {}",
                self.bound, self.start
            )));
        }
        if self.factor < 2 {
            return Err(BenchError::Config(format!(
                "{name} axis factor must be at least 2, got {}",
                self.factor
            )));
        }
        Ok(())
    }

    pub fn values(&self) -> Vec<u64> {
        let mut out = Vec::new();
        let mut v = self.start;
        while v <= self.bound {
            out.push(v);
            // Stops on overflow and on factors that would not advance.
            match v.checked_mul(self.factor) {
                Some(next) if next > v => v = next,
                _ => break,
            }
        }
        out
    }
}

/// How the inner axis value becomes a per-database document count.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum DocsDerivation {
    /// The inner axis value is the document count of every database.
    Absolute,
    /// The inner axis value is a total split across databases, rounding down.
    #[default]
    PerDatabase,
}

impl DocsDerivation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocsDerivation::Absolute => "absolute",
            DocsDerivation::PerDatabase => "per-database",
        }
    }

    pub fn docs(&self, value: u64, dbs: u64) -> u64 {
        match self {
            DocsDerivation::Absolute => value,
            DocsDerivation::PerDatabase => value.checked_div(dbs).unwrap_or(0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failed trial.
    #[default]
    Abort,
    /// Record the failed trial and move on to the next one.
    Continue,
}

#[derive(Clone, Debug)]
pub struct SweepConfig {
    /// Outer axis.
    pub databases: Axis,
    /// Inner axis, interpreted through `derivation`.
    pub documents: Axis,
    pub derivation: DocsDerivation,
    pub repetitions: u32,
    pub failure_policy: FailurePolicy,
    pub trial_timeout: Option<Duration>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            databases: Axis::new(1, 8, 2),
            documents: Axis::new(100, 10_000, 10),
            derivation: DocsDerivation::PerDatabase,
            repetitions: 1,
            failure_policy: FailurePolicy::Abort,
            trial_timeout: None,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        self.databases.validate("database")?;
        self.documents.validate("document")?;
        if self.repetitions == 0 {
            return Err(BenchError::Config("repetitions must be at least 1".into()));
        }
        Ok(())
    }

    /// Grid points in execution order: databases outer, documents inner.
    ///
    /// Points that derive to an already listed pair are skipped, which can
    /// happen when per-database division rounds down to the same count.
    pub fn grid(&self) -> Vec<TrialParameters> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for dbs in self.databases.values() {
            for value in self.documents.values() {
                let params = TrialParameters::new(self.derivation.docs(value, dbs), dbs);
                if seen.insert(params) {
                    out.push(params);
                }
            }
        }
        out
    }
}

/// One aggregate per distinct grid point, in order of first appearance.
pub fn aggregate(results: &[TrialResult]) -> Vec<AggregateResult> {
    let mut index: HashMap<TrialParameters, usize> = HashMap::new();
    let mut out: Vec<AggregateResult> = Vec::new();

    for r in results {
        let slot = *index.entry(r.params()).or_insert_with(|| {
            out.push(AggregateResult {
                dbs: r.dbs,
                docs: r.docs,
                runs: 0,
                insert: 0.0,
                sync: 0.0,
                full_insert: 0.0,
                full_sync: 0.0,
            });
            out.len() - 1
        });
        let agg = &mut out[slot];
        agg.runs += 1;
        agg.full_insert += r.insert;
        agg.full_sync += r.sync;
    }

    for agg in &mut out {
        let runs = f64::from(agg.runs.max(1));
        agg.insert = agg.full_insert / runs;
        agg.sync = agg.full_sync / runs;
    }
    out
}

fn error_chain(err: &dyn StdError) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

pub struct SweepController {
    runner: BenchmarkRunner,
    config: SweepConfig,
}

impl SweepController {
    pub fn new(runner: BenchmarkRunner, config: SweepConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    async fn run_trial(
        &self,
        params: TrialParameters,
        repetition: u32,
    ) -> Result<TrialResult, BenchError> {
        self.runner
            .run_with_deadline(params, repetition, self.config.trial_timeout)
            .await
    }

    /// Runs every grid point `repetitions` times, one trial at a time.
    pub async fn run_sweep(&self) -> Result<SweepOutcome, SweepError> {
        self.config.validate().map_err(SweepError::Invalid)?;

        let progress = self.runner.progress();
        let grid = self.config.grid();
        let mut outcome = SweepOutcome::default();

        for (n, params) in grid.iter().enumerate() {
            progress.info(&format!(
                "Grid point {}/{}: {} dbs, {} docs",
                n + 1,
                grid.len(),
                params.dbs,
                params.docs
            ));

            for repetition in 0..self.config.repetitions {
                match self.run_trial(*params, repetition).await {
                    Ok(result) => outcome.results.push(result),
                    Err(err) => match self.config.failure_policy {
                        FailurePolicy::Abort => {
                            outcome.aggregates = aggregate(&outcome.results);
                            return Err(SweepError::Aborted {
                                docs: params.docs,
                                dbs: params.dbs,
                                repetition,
                                source: err,
                                outcome: Box::new(outcome),
                            });
                        }
                        FailurePolicy::Continue => {
                            let message = error_chain(&err);
                            progress.warn(&format!(
                                "Trial {} dbs / {} docs (repetition {repetition}) failed: {message}",
                                params.dbs, params.docs
                            ));
                            outcome.failures.push(FailedTrial {
                                dbs: params.dbs,
                                docs: params.docs,
                                repetition,
                                kind: err.kind().to_string(),
                                message,
                            });
                        }
                    },
                }
            }

            progress.info(&format!(
                "Finished grid point {} dbs, {} docs",
                params.dbs, params.docs
            ));
        }

        outcome.aggregates = aggregate(&outcome.results);
        Ok(outcome)
    }
}
