//! Durable JSON artifacts for a finished (or partially finished) sweep.
//!
//! Each artifact is written to a temporary file in the output directory and
//! renamed over the destination, so an interrupted export never leaves a
//! truncated file where a previous complete one used to be. The directory is
//! synced once all renames are done so the new entries survive a crash.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::ExportError;
use crate::schema::{RunMeta, SweepOutcome};

pub const RESULTS_FILE: &str = "results.json";
pub const AGGREGATES_FILE: &str = "aggregates.json";
pub const FAILURES_FILE: &str = "failures.json";
pub const RUN_FILE: &str = "run.json";

#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub results: PathBuf,
    pub aggregates: PathBuf,
    pub run: PathBuf,
    pub failures: Option<PathBuf>,
}

pub struct ResultExporter {
    dir: PathBuf,
}

impl ResultExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn export(&self, outcome: &SweepOutcome, meta: &RunMeta) -> Result<ExportPaths, ExportError> {
        fs::create_dir_all(&self.dir)?;

        let results = self.write_atomic(RESULTS_FILE, &outcome.results)?;
        let aggregates = self.write_atomic(AGGREGATES_FILE, &outcome.aggregates)?;

        let failures = if outcome.failures.is_empty() {
            // A failures file from an earlier export would no longer describe this run.
            match fs::remove_file(self.dir.join(FAILURES_FILE)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            None
        } else {
            Some(self.write_atomic(FAILURES_FILE, &outcome.failures)?)
        };

        let run = self.write_atomic(RUN_FILE, meta)?;
        sync_dir(&self.dir)?;

        Ok(ExportPaths {
            results,
            aggregates,
            run,
            failures,
        })
    }

    fn write_atomic<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf, ExportError> {
        let path = self.dir.join(name);
        let tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&path)?;
        Ok(path)
    }
}

/// Flushes directory entries (renames, removals) to disk.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FailedTrial, PhaseTiming, TrialParameters, TrialResult};
    use crate::sweep::aggregate;
    use serde_json::Value;
    use tempfile::tempdir;

    fn meta() -> RunMeta {
        RunMeta {
            schema_version: 1,
            bench_version: "test".into(),
            timestamp_utc: "unix:0".into(),
            git_sha: None,
            insert_mode: "sequential".into(),
            derivation: "absolute".into(),
            repetitions: 2,
            baseline: false,
        }
    }

    fn outcome() -> SweepOutcome {
        let results = vec![
            TrialResult::new(
                TrialParameters::new(16, 1),
                0,
                PhaseTiming {
                    insert: 4.0,
                    sync: 2.0,
                },
            ),
            TrialResult::new(
                TrialParameters::new(16, 1),
                1,
                PhaseTiming {
                    insert: 6.0,
                    sync: 4.0,
                },
            ),
        ];
        let aggregates = aggregate(&results);
        SweepOutcome {
            results,
            aggregates,
            failures: Vec::new(),
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn writes_results_and_aggregates() {
        let dir = tempdir().unwrap();
        let exporter = ResultExporter::new(dir.path().join("out"));
        let paths = exporter.export(&outcome(), &meta()).unwrap();

        let results = read_json(&paths.results);
        assert_eq!(results.as_array().unwrap().len(), 2);
        assert_eq!(results[1]["repetition"], 1);
        assert_eq!(results[0]["docs"], 16);

        let aggregates = read_json(&paths.aggregates);
        assert_eq!(aggregates[0]["insert"], 5.0);
        assert_eq!(aggregates[0]["fullInsert"], 10.0);
        assert_eq!(aggregates[0]["fullSync"], 6.0);

        assert_eq!(read_json(&paths.run)["repetitions"], 2);
        assert!(paths.failures.is_none());
    }

    #[test]
    fn export_leaves_no_temporary_files_behind() {
        let dir = tempdir().unwrap();
        let exporter = ResultExporter::new(dir.path());
        exporter.export(&outcome(), &meta()).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![AGGREGATES_FILE, RESULTS_FILE, RUN_FILE]);
    }

    #[test]
    fn re_export_replaces_previous_artifacts() {
        let dir = tempdir().unwrap();
        let exporter = ResultExporter::new(dir.path());

        let mut failed = outcome();
        failed.failures.push(FailedTrial {
            dbs: 2,
            docs: 16,
            repetition: 0,
            kind: "sync".into(),
            message: "replication of `db1` failed".into(),
        });
        let first = exporter.export(&failed, &meta()).unwrap();
        let failures_path = first.failures.unwrap();
        assert_eq!(read_json(&failures_path)[0]["kind"], "sync");

        let mut shorter = outcome();
        shorter.results.truncate(1);
        shorter.aggregates = aggregate(&shorter.results);
        let second = exporter.export(&shorter, &meta()).unwrap();

        assert_eq!(read_json(&second.results).as_array().unwrap().len(), 1);
        assert!(!failures_path.exists());
    }

    #[test]
    fn output_directory_can_be_synced() {
        let dir = tempdir().unwrap();
        sync_dir(dir.path()).unwrap();

        let exporter = ResultExporter::new(dir.path().join("nested").join("out"));
        let paths = exporter.export(&outcome(), &meta()).unwrap();
        sync_dir(exporter.dir()).unwrap();
        assert!(paths.run.exists());
    }

    #[cfg(unix)]
    #[test]
    fn syncing_a_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(sync_dir(&dir.path().join("missing")).is_err());
    }
}
