use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::config::defs::PipelineError;

/// Expected completion marker of one dispatched sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub sample: String,
    pub marker: PathBuf,
}

impl JobRecord {
    pub fn is_complete(&self) -> bool {
        self.marker.is_file()
    }

    /// Removes a marker left by an earlier run so it cannot count for this one.
    pub fn clear_stale_marker(&self) -> Result<(), PipelineError> {
        match fs::remove_file(&self.marker) {
            Ok(()) => {
                debug!("Removed stale marker {}", self.marker.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::IOError(format!(
                "Cannot remove {}: {}",
                self.marker.display(),
                e
            ))),
        }
    }
}


/// Append-only list of expected marker paths, one per line.
#[derive(Debug, Clone)]
pub struct CompletionIndex {
    path: PathBuf,
}

impl CompletionIndex {
    /// Creates the index file if absent. Existing content is never truncated.
    pub fn open(path: PathBuf) -> Result<Self, PipelineError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PipelineError::IOError(format!("Cannot open {}: {}", path.display(), e)))?;
        Ok(CompletionIndex { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &JobRecord) -> Result<(), PipelineError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| PipelineError::IOError(format!("Cannot open {}: {}", self.path.display(), e)))?;
        writeln!(file, "{}", record.marker.display())
            .map_err(|e| PipelineError::IOError(format!("Cannot append to {}: {}", self.path.display(), e)))
    }

    pub fn entries(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| PipelineError::IOError(format!("Cannot read {}: {}", self.path.display(), e)))?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(PathBuf::from)
            .collect())
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerReport {
    pub expected: usize,
    pub complete: usize,
    pub polls: u64,
}

/// Blocks until every record's marker exists.
///
/// # Arguments
///
/// * `records` - Jobs dispatched in this run.
/// * `interval` - Sleep between checks.
/// * `max_polls` - Number of checks before giving up; None waits forever.
///
/// # Returns
/// TrackerReport, or PollTimeout naming the samples still missing a marker.
pub async fn wait_for_completion(
    records: &[JobRecord],
    interval: Duration,
    max_polls: Option<u64>,
) -> Result<TrackerReport, PipelineError> {
    let expected = records.len();
    let mut polls: u64 = 0;

    loop {
        polls += 1;
        let incomplete: Vec<&JobRecord> = records.iter().filter(|r| !r.is_complete()).collect();
        let complete = expected - incomplete.len();

        if incomplete.is_empty() {
            info!("All {} job(s) complete after {} check(s)", expected, polls);
            return Ok(TrackerReport { expected, complete, polls });
        }

        if let Some(max) = max_polls {
            if polls >= max {
                warn!("Giving up after {} check(s): {}/{} job(s) complete", polls, complete, expected);
                return Err(PipelineError::PollTimeout {
                    incomplete: incomplete.iter().map(|r| r.sample.clone()).collect(),
                });
            }
        }

        info!("{}/{} job(s) complete; checking again in {}s", complete, expected, interval.as_secs());
        sleep(interval).await;
    }
}
