use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::defs::{PipelineConfig, PipelineError, STAR_FASTA_KEY, STAR_INDEX_FILES, STAR_PARAMETERS};
use crate::utils::command::genome_generate_command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Reused,
    Built,
}

/// Reference FASTA recorded in the index parameters file, if an index is present.
pub fn recorded_reference(genome_dir: &Path) -> Option<PathBuf> {
    if !STAR_INDEX_FILES.iter().all(|f| genome_dir.join(f).is_file()) {
        return None;
    }
    let params = fs::read_to_string(genome_dir.join(STAR_PARAMETERS)).ok()?;
    params.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some(key) if key == STAR_FASTA_KEY => fields.next().map(PathBuf::from),
            _ => None,
        }
    })
}

/// Removes the recorded parameters so the index directory reads as absent.
pub fn invalidate_index(genome_dir: &Path) -> Result<(), PipelineError> {
    let params = genome_dir.join(STAR_PARAMETERS);
    match fs::remove_file(&params) {
        Ok(()) => {
            debug!("Removed {}", params.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::IOError(format!("Cannot remove {}: {}", params.display(), e))),
    }
}

/// Builds the STAR index unless one recorded against the configured reference exists.
/// Assumes a single writer per genome directory.
///
/// # Arguments
///
/// * `config` - Run configuration.
///
/// # Returns
/// Result<IndexStatus, PipelineError>
pub async fn ensure_genome_index(config: &PipelineConfig) -> Result<IndexStatus, PipelineError> {
    let genome_dir = config.genome_dir();
    match recorded_reference(&genome_dir) {
        Some(recorded) if recorded == config.reference => {
            info!("Reusing genome index in {}", genome_dir.display());
            return Ok(IndexStatus::Reused);
        }
        Some(recorded) => info!(
            "Genome index was built from {}; rebuilding for {}",
            recorded.display(),
            config.reference.display()
        ),
        None => info!("No genome index in {}; building", genome_dir.display()),
    }

    // Without the parameters file an interrupted build can never pass as fresh.
    invalidate_index(&genome_dir)?;
    let output = genome_generate_command(config).run().await?;
    if !output.success() {
        invalidate_index(&genome_dir)?;
        return Err(PipelineError::IndexBuild { stderr: output.failure_message() });
    }
    debug!("STAR genomeGenerate output:\n{}", output.stdout);
    info!("Built genome index in {}", genome_dir.display());
    Ok(IndexStatus::Built)
}
