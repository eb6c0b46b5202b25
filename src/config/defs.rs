use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::collections::HashMap;

use lazy_static::lazy_static;
use thiserror::Error;

use crate::cli::{Arguments, Library, Quality};
use crate::utils::file::file_path_manipulator;

// External software
pub const JAVA_TAG: &str = "java";
pub const TRIMMOMATIC_TAG: &str = "trimmomatic";
pub const STAR_TAG: &str = "STAR";
pub const QSUB_TAG: &str = "qsub";


lazy_static! {
    pub static ref TOOL_VERSIONS: HashMap<&'static str, f32> = {
        let mut m = HashMap::new();
        m.insert(STAR_TAG, 2.7);

        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StarSubcommand {
    GenomeGenerate,
    AlignReads,
}

// Static Filenames
pub const GENOME_DIR: &str = "genome";
pub const TRIMMED_DIR: &str = "trimmed_files";
pub const ALIGNMENT_DIR: &str = "STAR_aln";
pub const COMPLETION_INDEX: &str = "index";
pub const COMPLETION_MARKER: &str = "Log.final.out";
pub const RUN_MANIFEST: &str = "run_manifest.tsv";
pub const LOCK_FILE: &str = ".rnaseq-pipelines.lock";
pub const STAR_PARAMETERS: &str = "genomeParameters.txt";
pub const STAR_INDEX_FILES: &[&str] = &["Genome", "SA", "SAindex", STAR_PARAMETERS];
pub const STAR_FASTA_KEY: &str = "genomeFastaFiles";

// Static Parameters
pub const ILLUMINACLIP_SEED_MISMATCHES: u8 = 2;
pub const ILLUMINACLIP_PALINDROME_THRESHOLD: u8 = 30;
pub const ILLUMINACLIP_SIMPLE_THRESHOLD: u8 = 10;
pub const SLIDING_WINDOW_SIZE: u8 = 4;
pub const SLIDING_WINDOW_QUALITY: u8 = 15;
pub const AVG_QUALITY: u8 = 20;
pub const MIN_TRIMMED_LEN: u8 = 36;

pub const STAR_RNG_SEED: u32 = 777;
pub const STAR_DECOMPRESS_CMD: &str = "zcat";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_POLLS: u64 = 864;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryLayout {
    Single,
    Paired,
}

impl LibraryLayout {
    /// Number of raw read files each sample owns.
    pub fn mates(&self) -> usize {
        match self {
            LibraryLayout::Single => 1,
            LibraryLayout::Paired => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Local,
    Cluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityEncoding {
    Phred33,
    Phred64,
}

impl QualityEncoding {
    pub fn flag(&self) -> &'static str {
        match self {
            QualityEncoding::Phred33 => "-phred33",
            QualityEncoding::Phred64 => "-phred64",
        }
    }
}

/// Raw read file encoding, detected once per input directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFileSuffix {
    PlainFastq,
    CompressedFastq,
}

impl RawFileSuffix {
    /// Filename extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            RawFileSuffix::PlainFastq => "fastq",
            RawFileSuffix::CompressedFastq => "fastq.gz",
        }
    }

    /// Suffix appended to trimmed read files so the trimmer keeps the compression.
    pub fn trimmed_suffix(&self) -> &'static str {
        match self {
            RawFileSuffix::PlainFastq => "",
            RawFileSuffix::CompressedFastq => ".gz",
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, RawFileSuffix::CompressedFastq)
    }
}

impl fmt::Display for RawFileSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No raw read files (*.fastq or *.fastq.gz) found in {0}")]
    NoInputFiles(PathBuf),

    #[error("Sample {sample} is missing its mate file {path}")]
    MissingMate { sample: String, path: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation { path: PathBuf, source: std::io::Error },

    #[error("Failed to link {path} into the genome directory: {source}")]
    ReferenceLink { path: PathBuf, source: std::io::Error },

    #[error("Genome index build failed:\n{stderr}")]
    IndexBuild { stderr: String },

    #[error("Sample {sample} failed during {step}:\n{stderr}")]
    SampleProcessing { sample: String, step: String, stderr: String },

    #[error("Job submission for sample {sample} failed:\n{stderr}")]
    JobSubmission { sample: String, stderr: String },

    #[error("Job {job} for sample {sample} was submitted but could not be recorded: {error}")]
    UntrackedJob { sample: String, job: String, error: String },

    #[error("Timed out waiting for cluster jobs; incomplete samples: {}", .incomplete.join(", "))]
    PollTimeout { incomplete: Vec<String> },

    #[error("Required tool {tool} was not found")]
    ToolNotFound { tool: String },

    #[error("{tool} version {found} is older than the required {required}")]
    ToolVersion { tool: String, found: String, required: f32 },

    #[error("Tool {tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Output directory is locked by another run (remove {0} if that run is gone)")]
    RunLocked(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    IOError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Per-sample failures do not abort the run.
    pub fn is_sample_local(&self) -> bool {
        matches!(
            self,
            PipelineError::SampleProcessing { .. } | PipelineError::JobSubmission { .. }
        )
    }
}


/// Programs used for each external tool. Plain names are resolved on PATH.
#[derive(Debug, Clone)]
pub struct Tools {
    pub java: PathBuf,
    pub star: PathBuf,
    pub qsub: PathBuf,
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            java: PathBuf::from(JAVA_TAG),
            star: PathBuf::from(STAR_TAG),
            qsub: PathBuf::from(QSUB_TAG),
        }
    }
}

/// Trimmomatic invocation settings.
#[derive(Debug, Clone)]
pub struct TrimSettings {
    pub version: String,
    pub trimmomatic_dir: PathBuf,
    pub adapters: Option<PathBuf>,
    pub quality: QualityEncoding,
}

impl TrimSettings {
    pub fn jar(&self) -> PathBuf {
        self.trimmomatic_dir.join(format!("{}-{}.jar", TRIMMOMATIC_TAG, self.version))
    }

    /// Adapter file, defaulting to the TruSeq3 file Trimmomatic ships for the layout.
    pub fn adapters(&self, layout: LibraryLayout) -> PathBuf {
        match &self.adapters {
            Some(path) => path.clone(),
            None => {
                let name = match layout {
                    LibraryLayout::Single => "TruSeq3-SE.fa",
                    LibraryLayout::Paired => "TruSeq3-PE.fa",
                };
                self.trimmomatic_dir.join("adapters").join(name)
            }
        }
    }
}


/// Immutable run parameters, built once at startup and shared by every stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub reference: PathBuf,
    pub annotation: PathBuf,
    pub layout: LibraryLayout,
    pub out_dir: PathBuf,
    pub mode: ExecutionMode,
    pub trim: TrimSettings,
    pub threads: usize,
    pub queue: Option<String>,
    pub poll_interval: Duration,
    pub max_polls: Option<u64>,
    pub tools: Tools,
}

impl PipelineConfig {
    /// Validates parsed arguments and resolves every path against `cwd`.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments.
    /// * `cwd` - Directory relative paths are resolved against.
    /// * `threads` - Thread count already capped to the host.
    ///
    /// # Returns
    /// Result<PipelineConfig, PipelineError>
    pub fn from_args(args: &Arguments, cwd: &Path, threads: usize) -> Result<Self, PipelineError> {
        let input_dir = file_path_manipulator(&args.input, cwd);
        if !input_dir.is_dir() {
            return Err(PipelineError::InvalidConfig(format!(
                "Input directory {} does not exist",
                input_dir.display()
            )));
        }

        let reference = file_path_manipulator(&args.genome, cwd);
        let annotation = file_path_manipulator(&args.annotation, cwd);
        for path in [&reference, &annotation] {
            if !path.is_file() {
                return Err(PipelineError::InvalidConfig(format!(
                    "Cannot find {}",
                    path.display()
                )));
            }
        }

        if args.poll_interval_secs == 0 {
            return Err(PipelineError::InvalidConfig("--poll-interval-secs must be positive".to_string()));
        }

        let layout = match args.library {
            Library::Single => LibraryLayout::Single,
            Library::Paired => LibraryLayout::Paired,
        };
        let quality = match args.quality_encoding {
            Quality::Phred33 => QualityEncoding::Phred33,
            Quality::Phred64 => QualityEncoding::Phred64,
        };
        let mode = if args.cluster { ExecutionMode::Cluster } else { ExecutionMode::Local };

        Ok(PipelineConfig {
            input_dir,
            reference,
            annotation,
            layout,
            out_dir: file_path_manipulator(&args.out_dir, cwd),
            mode,
            trim: TrimSettings {
                version: args.trimmomatic_version.clone(),
                trimmomatic_dir: file_path_manipulator(&args.trimmomatic_dir, cwd),
                adapters: args.adapters.as_ref().map(|a| file_path_manipulator(a, cwd)),
                quality,
            },
            threads: threads.max(1),
            queue: args.queue.clone(),
            poll_interval: Duration::from_secs(args.poll_interval_secs),
            max_polls: if args.max_polls == 0 { None } else { Some(args.max_polls) },
            tools: Tools {
                java: args.java.clone(),
                star: args.star.clone(),
                qsub: args.qsub.clone(),
            },
        })
    }

    pub fn genome_dir(&self) -> PathBuf {
        self.out_dir.join(GENOME_DIR)
    }

    pub fn trimmed_dir(&self) -> PathBuf {
        self.out_dir.join(TRIMMED_DIR)
    }

    pub fn alignment_dir(&self) -> PathBuf {
        self.out_dir.join(ALIGNMENT_DIR)
    }

    pub fn completion_index(&self) -> PathBuf {
        self.alignment_dir().join(COMPLETION_INDEX)
    }

    /// `<out>/STAR_aln/<sample>/`, the alignment output prefix of one sample.
    pub fn sample_alignment_dir(&self, sample: &str) -> PathBuf {
        self.alignment_dir().join(sample)
    }

    pub fn marker_path(&self, sample: &str) -> PathBuf {
        self.sample_alignment_dir(sample).join(COMPLETION_MARKER)
    }
}
