use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};

use crate::config::defs::{ExecutionMode, PipelineConfig, PipelineError, RUN_MANIFEST};
use crate::pipelines::backend::{Dispatch, ExecutionBackend};
use crate::pipelines::completion::{wait_for_completion, JobRecord};
use crate::pipelines::environment::prepare_environment;
use crate::pipelines::genome_index::{ensure_genome_index, IndexStatus};
use crate::utils::command::check_tools;
use crate::utils::samples::{discover_samples, Sample};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleStatus {
    /// Completion marker present.
    Completed,
    /// Dispatched, marker not (yet) present.
    Pending,
    Failed(String),
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleStatus::Completed => write!(f, "completed"),
            SampleStatus::Pending => write!(f, "pending"),
            SampleStatus::Failed(_) => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOutcome {
    pub sample: String,
    pub status: SampleStatus,
}

/// Samples attempted versus samples whose completion marker exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub index_status: IndexStatus,
    pub attempted: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub outcomes: Vec<SampleOutcome>,
}

impl RunSummary {
    fn collect(
        samples: &[Sample],
        records: &[JobRecord],
        failures: &HashMap<String, String>,
        index_status: IndexStatus,
    ) -> Self {
        let outcomes: Vec<SampleOutcome> = samples
            .iter()
            .map(|sample| {
                let status = match (failures.get(&sample.id), records.iter().find(|r| r.sample == sample.id)) {
                    (Some(reason), _) => SampleStatus::Failed(reason.clone()),
                    (None, Some(record)) if record.is_complete() => SampleStatus::Completed,
                    _ => SampleStatus::Pending,
                };
                SampleOutcome { sample: sample.id.clone(), status }
            })
            .collect();

        RunSummary {
            index_status,
            attempted: samples.len(),
            dispatched: records.len(),
            completed: outcomes.iter().filter(|o| o.status == SampleStatus::Completed).count(),
            outcomes,
        }
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o.status, SampleStatus::Failed(_))).count()
    }

    /// Writes `sample<TAB>status<TAB>detail`, one line per sample.
    pub fn write_manifest(&self, path: &Path) -> Result<(), PipelineError> {
        let io_err = |e: std::io::Error| PipelineError::IOError(format!("Cannot write {}: {}", path.display(), e));
        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        writeln!(writer, "sample\tstatus\tdetail").map_err(io_err)?;
        for outcome in &self.outcomes {
            let detail = match &outcome.status {
                SampleStatus::Failed(reason) => manifest_detail(reason),
                _ => String::new(),
            };
            writeln!(writer, "{}\t{}\t{}", outcome.sample, outcome.status, detail).map_err(io_err)?;
        }
        writer.flush().map_err(io_err)
    }
}

/// Folds a multi-line failure reason onto one TSV field.
fn manifest_detail(reason: &str) -> String {
    reason
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\t', " ")
}


/// Run function for the trim / index / align pipeline
///
/// # Arguments
///
/// * `config` - PipelineConfig built in main.
///
/// # Returns
/// Result<RunSummary, PipelineError>; per-sample failures are reported in the summary.
pub async fn run(config: Arc<PipelineConfig>) -> Result<RunSummary, PipelineError> {
    check_tools(&config).await?;

    let sample_set = discover_samples(&config.input_dir, config.layout)?;
    let environment = prepare_environment(&config)?;
    let index_status = ensure_genome_index(&config).await?;

    let backend = ExecutionBackend::from(config.mode);
    let mut records: Vec<JobRecord> = Vec::with_capacity(sample_set.samples.len());
    let mut failures: HashMap<String, String> = HashMap::new();

    for sample in &sample_set.samples {
        match backend
            .dispatch(&config, sample_set.suffix, sample, &environment.completion_index)
            .await
        {
            Ok(Dispatch { record, outcome }) => {
                records.push(record);
                if let Err(e) = outcome {
                    error!("{}", e);
                    failures.insert(sample.id.clone(), e.to_string());
                }
            }
            Err(e) if e.is_sample_local() => {
                error!("{}", e);
                failures.insert(sample.id.clone(), e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    let tracking = match config.mode {
        ExecutionMode::Cluster if !records.is_empty() => {
            info!("Waiting for {} cluster job(s)", records.len());
            wait_for_completion(&records, config.poll_interval, config.max_polls)
                .await
                .map(|report| info!("{} expected == {} complete", report.expected, report.complete))
        }
        _ => Ok(()),
    };

    let summary = RunSummary::collect(&sample_set.samples, &records, &failures, index_status);
    summary.write_manifest(&config.out_dir.join(RUN_MANIFEST))?;
    info!(
        "{}/{} samples completed ({} dispatched, {} failed)",
        summary.completed,
        summary.attempted,
        summary.dispatched,
        summary.failed()
    );
    if summary.failed() > 0 {
        warn!("See {} for per-sample status", config.out_dir.join(RUN_MANIFEST).display());
    }

    tracking?;
    drop(environment);
    Ok(summary)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_summary_collect_and_manifest() {
        let tmp = tempdir().unwrap();
        let samples: Vec<Sample> = ["a", "b", "c"]
            .iter()
            .map(|id| Sample { id: id.to_string(), reads: vec![PathBuf::from(format!("{}_1.fastq", id))] })
            .collect();
        let records = vec![
            JobRecord { sample: "a".to_string(), marker: tmp.path().join("a.done") },
            JobRecord { sample: "b".to_string(), marker: tmp.path().join("b.done") },
        ];
        std::fs::write(&records[0].marker, b"").unwrap();
        let failures = HashMap::from([(
            "c".to_string(),
            "Sample c failed during trimmomatic:\n\nException:\tboom\nat line 2\n".to_string(),
        )]);

        let summary = RunSummary::collect(&samples, &records, &failures, IndexStatus::Built);
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.outcomes[1].status, SampleStatus::Pending);

        let manifest = tmp.path().join("manifest.tsv");
        summary.write_manifest(&manifest).unwrap();
        let content = std::fs::read_to_string(&manifest).unwrap();
        assert_eq!(
            content,
            "sample\tstatus\tdetail\na\tcompleted\t\nb\tpending\t\nc\tfailed\tSample c failed during trimmomatic: Exception: boom at line 2\n"
        );
    }
}
