/// Functions and structs for building the external tool command lines

use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info};
use tokio::process::Command;

use crate::config::defs::{
    ExecutionMode, PipelineConfig, PipelineError, RawFileSuffix, StarSubcommand, JAVA_TAG, QSUB_TAG,
    STAR_TAG, TOOL_VERSIONS, TRIMMOMATIC_TAG,
};
use crate::utils::samples::Sample;
use crate::utils::streams::{read_child_output_to_vec, run_tool, ChildStream, ToolOutput};


/// A fully resolved external invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub tool: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub async fn run(&self) -> Result<ToolOutput, PipelineError> {
        run_tool(self.tool, &self.program, &self.args).await
    }

    /// Renders the command as one shell line with every word quoted.
    pub fn to_shell(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(shell_quote(&self.program.to_string_lossy()));
        words.extend(self.args.iter().map(|a| shell_quote(a)));
        words.join(" ")
    }
}

/// Single-quotes a word for POSIX shells unless it only holds safe characters.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}


/// Trimmed reads of one sample. Only `paired` files continue to alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedReads {
    pub paired: Vec<PathBuf>,
    pub orphans: Vec<PathBuf>,
}

pub mod trimmomatic {
    use std::path::Path;

    use crate::config::defs::{
        PipelineConfig, RawFileSuffix, AVG_QUALITY, ILLUMINACLIP_PALINDROME_THRESHOLD,
        ILLUMINACLIP_SEED_MISMATCHES, ILLUMINACLIP_SIMPLE_THRESHOLD, MIN_TRIMMED_LEN,
        SLIDING_WINDOW_QUALITY, SLIDING_WINDOW_SIZE,
    };
    use super::{path_arg, TrimmedReads};

    /// `<sample>_<mate>_trim[_orph][.gz]` inside the trimmed reads directory.
    pub fn trimmed_reads(trimmed_dir: &Path, sample_id: &str, mates: usize, suffix: RawFileSuffix) -> TrimmedReads {
        let ext = suffix.trimmed_suffix();
        let mut paired = Vec::with_capacity(mates);
        let mut orphans = Vec::new();
        for mate in 1..=mates {
            paired.push(trimmed_dir.join(format!("{}_{}_trim{}", sample_id, mate, ext)));
            if mates > 1 {
                orphans.push(trimmed_dir.join(format!("{}_{}_trim_orph{}", sample_id, mate, ext)));
            }
        }
        TrimmedReads { paired, orphans }
    }

    /// Trimmomatic arguments after `java`.
    /// SE takes one input and one output; PE takes two inputs and the four
    /// outputs in Trimmomatic order (1 paired, 1 orphan, 2 paired, 2 orphan).
    pub fn arg_generator(config: &PipelineConfig, reads: &[std::path::PathBuf], trimmed: &TrimmedReads) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-jar".to_string());
        args_vec.push(path_arg(&config.trim.jar()));

        let paired = reads.len() > 1;
        args_vec.push(if paired { "PE" } else { "SE" }.to_string());
        args_vec.push("-threads".to_string());
        args_vec.push(config.threads.to_string());
        args_vec.push(config.trim.quality.flag().to_string());

        args_vec.extend(reads.iter().map(|r| path_arg(r)));
        for (index, out) in trimmed.paired.iter().enumerate() {
            args_vec.push(path_arg(out));
            if let Some(orphan) = trimmed.orphans.get(index) {
                args_vec.push(path_arg(orphan));
            }
        }

        args_vec.push(format!(
            "ILLUMINACLIP:{}:{}:{}:{}",
            path_arg(&config.trim.adapters(config.layout)),
            ILLUMINACLIP_SEED_MISMATCHES,
            ILLUMINACLIP_PALINDROME_THRESHOLD,
            ILLUMINACLIP_SIMPLE_THRESHOLD
        ));
        args_vec.push(format!("SLIDINGWINDOW:{}:{}", SLIDING_WINDOW_SIZE, SLIDING_WINDOW_QUALITY));
        args_vec.push(format!("AVGQUAL:{}", AVG_QUALITY));
        args_vec.push(format!("MINLEN:{}", MIN_TRIMMED_LEN));
        args_vec
    }
}

pub mod star {
    use std::path::{Path, PathBuf};

    use crate::config::defs::{PipelineConfig, RawFileSuffix, StarSubcommand, STAR_DECOMPRESS_CMD, STAR_RNG_SEED};
    use super::path_arg;

    /// Output prefix STAR writes under; the trailing separator makes it a directory.
    pub fn output_prefix(dir: &Path) -> String {
        format!("{}/", dir.to_string_lossy().trim_end_matches('/'))
    }

    pub fn arg_generator(
        config: &PipelineConfig,
        subcommand: StarSubcommand,
        suffix: Option<RawFileSuffix>,
        sample_id: Option<&str>,
        reads: &[PathBuf],
    ) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--runThreadN".to_string());
        args_vec.push(config.threads.to_string());

        match subcommand {
            StarSubcommand::GenomeGenerate => {
                args_vec.push("--runMode".to_string());
                args_vec.push("genomeGenerate".to_string());
                args_vec.push("--genomeDir".to_string());
                args_vec.push(path_arg(&config.genome_dir()));
                args_vec.push("--genomeFastaFiles".to_string());
                args_vec.push(path_arg(&config.reference));
                args_vec.push("--sjdbGTFfile".to_string());
                args_vec.push(path_arg(&config.annotation));
                args_vec.push("--outFileNamePrefix".to_string());
                args_vec.push(output_prefix(&config.genome_dir()));
            }
            StarSubcommand::AlignReads => {
                args_vec.push("--genomeDir".to_string());
                args_vec.push(path_arg(&config.genome_dir()));
                args_vec.push("--readFilesIn".to_string());
                args_vec.extend(reads.iter().map(|r| path_arg(r)));
                if suffix.map(|s| s.is_compressed()).unwrap_or(false) {
                    args_vec.push("--readFilesCommand".to_string());
                    args_vec.push(STAR_DECOMPRESS_CMD.to_string());
                }
                args_vec.push("--runRNGseed".to_string());
                args_vec.push(STAR_RNG_SEED.to_string());
                args_vec.push("--outFileNamePrefix".to_string());
                args_vec.push(output_prefix(&config.sample_alignment_dir(sample_id.unwrap_or_default())));
                args_vec.push("--outSAMtype".to_string());
                args_vec.push("BAM".to_string());
                args_vec.push("Unsorted".to_string());
                args_vec.push("SortedByCoordinate".to_string());
                args_vec.push("--quantMode".to_string());
                args_vec.push("TranscriptomeSAM".to_string());
                args_vec.push("GeneCounts".to_string());
                args_vec.push("--twopassMode".to_string());
                args_vec.push("Basic".to_string());
            }
        }
        args_vec
    }

    /// Parses `STAR --version` output (`2.7.10a` or `STAR_2.5.1b`) to major.minor.
    pub fn parse_version(line: &str) -> Option<f32> {
        let version = line.trim().trim_start_matches("STAR_");
        let mut parts = version.split('.');
        let major = parts.next()?;
        let minor: String = parts.next()?.chars().take_while(|c| c.is_ascii_digit()).collect();
        format!("{}.{}", major, minor).parse().ok()
    }
}

pub mod qsub {
    use std::path::Path;

    use crate::config::defs::PipelineConfig;
    use super::path_arg;

    pub fn arg_generator(config: &PipelineConfig, job_name: &str, script: &Path) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        if let Some(queue) = &config.queue {
            args_vec.push("-q".to_string());
            args_vec.push(queue.clone());
        }
        args_vec.push("-N".to_string());
        args_vec.push(job_name.to_string());
        args_vec.push(path_arg(script));
        args_vec
    }
}


/// The trim and align steps of one sample, built from the layout and suffix axes.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCommands {
    pub sample: String,
    pub trimmed: TrimmedReads,
    pub trim: CommandLine,
    pub align: CommandLine,
}

impl SampleCommands {
    pub fn new(config: &PipelineConfig, suffix: RawFileSuffix, sample: &Sample) -> Self {
        let trimmed = trimmomatic::trimmed_reads(&config.trimmed_dir(), &sample.id, sample.reads.len(), suffix);
        let trim = CommandLine {
            tool: TRIMMOMATIC_TAG,
            program: config.tools.java.clone(),
            args: trimmomatic::arg_generator(config, &sample.reads, &trimmed),
        };
        let align = CommandLine {
            tool: STAR_TAG,
            program: config.tools.star.clone(),
            args: star::arg_generator(config, StarSubcommand::AlignReads, Some(suffix), Some(&sample.id), &trimmed.paired),
        };
        SampleCommands { sample: sample.id.clone(), trimmed, trim, align }
    }

    pub fn steps(&self) -> [&CommandLine; 2] {
        [&self.trim, &self.align]
    }
}

pub fn genome_generate_command(config: &PipelineConfig) -> CommandLine {
    CommandLine {
        tool: STAR_TAG,
        program: config.tools.star.clone(),
        args: star::arg_generator(config, StarSubcommand::GenomeGenerate, None, None, &[]),
    }
}

pub fn submission_command(config: &PipelineConfig, job_name: &str, script: &Path) -> CommandLine {
    CommandLine {
        tool: QSUB_TAG,
        program: config.tools.qsub.clone(),
        args: qsub::arg_generator(config, job_name, script),
    }
}


fn resolve(tool: &str, program: &Path) -> Result<PathBuf, PipelineError> {
    which::which(program).map_err(|_| PipelineError::ToolNotFound { tool: tool.to_string() })
}

/// Checks the installed STAR against the minimum in TOOL_VERSIONS.
pub async fn check_version(program: &Path) -> Result<f32, PipelineError> {
    let tool_err = |error: String| PipelineError::ToolExecution { tool: STAR_TAG.to_string(), error };

    let mut child = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| tool_err(format!("Failed to spawn: {}. Is STAR installed?", e)))?;

    let lines = read_child_output_to_vec(&mut child, ChildStream::Stdout)
        .await
        .map_err(|e| tool_err(e.to_string()))?;
    let first_line = lines
        .first()
        .ok_or_else(|| tool_err("No output from STAR --version".to_string()))?;
    let found = star::parse_version(first_line)
        .ok_or_else(|| tool_err(format!("Invalid STAR --version output: {}", first_line)))?;

    let required = TOOL_VERSIONS.get(STAR_TAG).copied().unwrap_or_default();
    if found + f32::EPSILON < required {
        return Err(PipelineError::ToolVersion { tool: STAR_TAG.to_string(), found: first_line.clone(), required });
    }
    Ok(found)
}

/// Ensures the tools the chosen execution mode spawns on this host exist.
/// STAR is always needed because the genome index is built locally.
pub async fn check_tools(config: &PipelineConfig) -> Result<(), PipelineError> {
    let star = resolve(STAR_TAG, &config.tools.star)?;
    let version = check_version(&star).await?;
    debug!("Using STAR {} at {}", version, star.display());

    match config.mode {
        ExecutionMode::Local => {
            let java = resolve(JAVA_TAG, &config.tools.java)?;
            debug!("Using java at {}", java.display());
            let jar = config.trim.jar();
            if !jar.is_file() {
                return Err(PipelineError::InvalidConfig(format!("Cannot find {}", jar.display())));
            }
        }
        ExecutionMode::Cluster => {
            let qsub = resolve(QSUB_TAG, &config.tools.qsub)?;
            debug!("Using qsub at {}", qsub.display());
        }
    }
    info!("External tools found");
    Ok(())
}
