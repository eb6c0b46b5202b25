use std::fs;

use log::{debug, info};

use crate::config::defs::{PipelineConfig, PipelineError};
use crate::pipelines::completion::CompletionIndex;
use crate::utils::file::{ensure_dir, link_into, RunLock};

/// Everything the later stages need from a prepared output directory.
/// Holding it keeps the output directory locked.
#[derive(Debug)]
pub struct PreparedEnvironment {
    pub lock: RunLock,
    pub completion_index: CompletionIndex,
}

/// Creates the output tree, links the reference files and opens the completion index.
/// Safe to call again on an existing output directory.
///
/// # Arguments
///
/// * `config` - Run configuration.
///
/// # Returns
/// Result<PreparedEnvironment, PipelineError>
pub fn prepare_environment(config: &PipelineConfig) -> Result<PreparedEnvironment, PipelineError> {
    fs::create_dir_all(&config.out_dir).map_err(|e| PipelineError::DirectoryCreation {
        path: config.out_dir.clone(),
        source: e,
    })?;
    let lock = RunLock::acquire(&config.out_dir)?;

    for dir in [config.genome_dir(), config.trimmed_dir(), config.alignment_dir()] {
        ensure_dir(&dir)?;
    }

    // STAR reads the configured paths; the copies in the genome directory only
    // keep the inputs of an index next to it.
    let genome_dir = config.genome_dir();
    for source in [&config.reference, &config.annotation] {
        let link = link_into(source, &genome_dir)?;
        debug!("Linked {} to {}", source.display(), link.display());
    }

    let completion_index = CompletionIndex::open(config.completion_index())?;

    info!("Prepared output directory {}", config.out_dir.display());
    Ok(PreparedEnvironment { lock, completion_index })
}
