use std::fs;
use std::io::Write;

use log::{debug, error, info, warn};
use tempfile::{Builder, NamedTempFile};

use crate::config::defs::{ExecutionMode, PipelineConfig, PipelineError, RawFileSuffix};
use crate::pipelines::completion::{CompletionIndex, JobRecord};
use crate::utils::command::{submission_command, CommandLine, SampleCommands};
use crate::utils::file::ensure_dir;
use crate::utils::samples::Sample;

pub const JOB_NAME_PREFIX: &str = "rnaseq_";

/// Where per-sample work runs: foreground child processes or batch-queue jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionBackend {
    Local,
    Cluster,
}

impl From<ExecutionMode> for ExecutionBackend {
    fn from(mode: ExecutionMode) -> Self {
        match mode {
            ExecutionMode::Local => ExecutionBackend::Local,
            ExecutionMode::Cluster => ExecutionBackend::Cluster,
        }
    }
}

/// A sample that reached the completion index, with the result of its local run.
#[derive(Debug)]
pub struct Dispatch {
    pub record: JobRecord,
    pub outcome: Result<(), PipelineError>,
}

impl ExecutionBackend {
    /// Runs or submits the trim and align steps of one sample.
    ///
    /// # Arguments
    ///
    /// * `config` - Run configuration.
    /// * `suffix` - Raw file suffix detected for the run.
    /// * `sample` - Sample to process.
    /// * `index` - Completion index the sample's record is appended to.
    ///
    /// # Returns
    /// Dispatch once the record is in the index; a local step failure is carried in
    /// its outcome. Err means the sample never reached the index (JobSubmission is sample-local,
    /// UntrackedJob names an accepted job whose record could not be written).
    pub async fn dispatch(
        &self,
        config: &PipelineConfig,
        suffix: RawFileSuffix,
        sample: &Sample,
        index: &CompletionIndex,
    ) -> Result<Dispatch, PipelineError> {
        let commands = SampleCommands::new(config, suffix, sample);
        let record = JobRecord { sample: sample.id.clone(), marker: config.marker_path(&sample.id) };

        ensure_dir(&config.sample_alignment_dir(&sample.id))?;
        record.clear_stale_marker()?;

        match self {
            ExecutionBackend::Local => {
                index.append(&record)?;
                let outcome = run_local(&commands).await;
                if outcome.is_ok() {
                    info!("Sample {} finished", sample.id);
                }
                Ok(Dispatch { record, outcome })
            }
            ExecutionBackend::Cluster => {
                let job = submit(config, &commands).await?;
                index.append(&record).map_err(|e| {
                    error!("Job for sample {} is running but missing from the completion index", sample.id);
                    PipelineError::UntrackedJob { sample: sample.id.clone(), job: job.clone(), error: e.to_string() }
                })?;
                info!("Sample {} submitted: {}", sample.id, job);
                Ok(Dispatch { record, outcome: Ok(()) })
            }
        }
    }
}


async fn run_step(sample: &str, step: &CommandLine) -> Result<(), PipelineError> {
    let output = step.run().await.map_err(|e| PipelineError::SampleProcessing {
        sample: sample.to_string(),
        step: step.tool.to_string(),
        stderr: e.to_string(),
    })?;
    if !output.success() {
        error!("{} failed for sample {}", step.tool, sample);
        return Err(PipelineError::SampleProcessing {
            sample: sample.to_string(),
            step: step.tool.to_string(),
            stderr: output.failure_message(),
        });
    }
    Ok(())
}

/// Trim then align in the foreground; the first failing step stops the sample.
async fn run_local(commands: &SampleCommands) -> Result<(), PipelineError> {
    for step in commands.steps() {
        info!("Running {} for sample {}", step.tool, commands.sample);
        run_step(&commands.sample, step).await?;
    }
    Ok(())
}


/// Self-contained bash script running both steps, stopping at the first failure.
pub fn render_job_script(commands: &SampleCommands) -> String {
    let mut script = String::from("#!/bin/bash\nset -euo pipefail\n\n");
    for step in commands.steps() {
        script.push_str(&step.to_shell());
        script.push('\n');
    }
    script
}

fn write_job_script(config: &PipelineConfig, commands: &SampleCommands) -> Result<NamedTempFile, PipelineError> {
    let io_err = |e: std::io::Error| PipelineError::IOError(format!("Cannot write job script for {}: {}", commands.sample, e));

    let mut script = Builder::new()
        .prefix(&format!("{}_job_", commands.sample))
        .suffix(".sh")
        .tempfile_in(&config.out_dir)
        .map_err(io_err)?;
    script.write_all(render_job_script(commands).as_bytes()).map_err(io_err)?;
    script.flush().map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(script.path(), fs::Permissions::from_mode(0o755)).map_err(io_err)?;
    }
    Ok(script)
}

/// Submits one job; the script is deleted once the queue accepts it and kept otherwise.
/// Returns the scheduler's acknowledgement, which carries the job id.
async fn submit(config: &PipelineConfig, commands: &SampleCommands) -> Result<String, PipelineError> {
    let script = write_job_script(config, commands)?;
    let job_name = format!("{}{}", JOB_NAME_PREFIX, commands.sample);
    let submission = submission_command(config, &job_name, script.path());

    let failure = match submission.run().await {
        Ok(output) if output.success() => {
            let job = output.stdout.trim().to_string();
            debug!("qsub: {}", job);
            return Ok(job);
        }
        Ok(output) => output.failure_message(),
        Err(e) => e.to_string(),
    };

    match script.keep() {
        Ok((_, path)) => warn!("Kept job script {} for inspection", path.display()),
        Err(e) => warn!("Could not keep job script: {}", e),
    }
    error!("Submission failed for sample {}", commands.sample);
    Err(PipelineError::JobSubmission { sample: commands.sample.clone(), stderr: failure })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use crate::config::defs::{LibraryLayout, QualityEncoding, Tools, TrimSettings};

    #[test]
    fn test_render_job_script() {
        let config = PipelineConfig {
            input_dir: PathBuf::from("/in"),
            reference: PathBuf::from("/ref/genome.fa"),
            annotation: PathBuf::from("/ref/genes.gtf"),
            layout: LibraryLayout::Paired,
            out_dir: PathBuf::from("/my out"),
            mode: ExecutionMode::Cluster,
            trim: TrimSettings {
                version: "0.39".to_string(),
                trimmomatic_dir: PathBuf::from("/opt/trimmomatic"),
                adapters: None,
                quality: QualityEncoding::Phred64,
            },
            threads: 4,
            queue: Some("all.q".to_string()),
            poll_interval: Duration::from_secs(300),
            max_polls: None,
            tools: Tools::default(),
        };
        let sample = Sample {
            id: "S1".to_string(),
            reads: vec![PathBuf::from("/in/S1_1.fastq.gz"), PathBuf::from("/in/S1_2.fastq.gz")],
        };
        let commands = SampleCommands::new(&config, RawFileSuffix::CompressedFastq, &sample);
        let script = render_job_script(&commands);
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "#!/bin/bash");
        assert_eq!(lines[1], "set -euo pipefail");
        assert!(lines[3].starts_with("java -jar /opt/trimmomatic/trimmomatic-0.39.jar PE -threads 4 -phred64"));
        assert!(lines[3].contains("'/my out/trimmed_files/S1_1_trim_orph.gz'"));
        assert!(lines[4].starts_with("STAR --runThreadN 4 --genomeDir '/my out/genome'"));
        assert!(lines[4].contains("--readFilesCommand zcat"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_backend_from_mode() {
        assert_eq!(ExecutionBackend::from(ExecutionMode::Local), ExecutionBackend::Local);
        assert_eq!(ExecutionBackend::from(ExecutionMode::Cluster), ExecutionBackend::Cluster);
    }
}
