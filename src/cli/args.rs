use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::defs::{DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL_SECS, JAVA_TAG, QSUB_TAG, STAR_TAG};

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum Library {
    #[default]
    Single,
    Paired,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum Quality {
    #[default]
    Phred33,
    Phred64,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rnaseq-pipelines", version, about = "Trim, index and align RNA-seq samples locally or on a batch queue")]
pub struct Arguments {

    #[arg(short = 'i', long = "input", help = "Directory holding <sample>_1.fastq[.gz] (and _2) raw read files")]
    pub input: PathBuf,

    #[arg(short = 'g', long = "genome", help = "Reference genome FASTA")]
    pub genome: PathBuf,

    #[arg(short = 'a', long = "annotation", help = "Reference annotation GTF")]
    pub annotation: PathBuf,

    #[arg(short = 'l', long = "library", default_value = "single", value_enum)]
    pub library: Library,

    #[arg(short = 'o', long = "out", help = "Output directory for all generated files")]
    pub out_dir: PathBuf,

    #[arg(short = 'c', long = "cluster", action, help = "Submit one job per sample to the batch queue instead of running locally")]
    pub cluster: bool,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long = "trimmomatic-version", default_value = "0.39")]
    pub trimmomatic_version: String,

    #[arg(long = "trimmomatic-dir", default_value = ".", help = "Directory holding trimmomatic-<version>.jar and its adapters/ folder")]
    pub trimmomatic_dir: PathBuf,

    #[arg(long, help = "Adapter FASTA for ILLUMINACLIP; defaults to the bundled TruSeq3 file for the library layout")]
    pub adapters: Option<PathBuf>,

    #[arg(long = "quality-encoding", default_value = "phred33", value_enum)]
    pub quality_encoding: Quality,

    #[arg(short = 't', long, default_value_t = 64)]
    pub threads: usize,

    #[arg(short = 'q', long, help = "Batch queue to submit jobs to")]
    pub queue: Option<String>,

    #[arg(long = "poll-interval-secs", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    #[arg(long = "max-polls", default_value_t = DEFAULT_MAX_POLLS, help = "Give up waiting on cluster jobs after this many checks; 0 waits forever")]
    pub max_polls: u64,

    #[arg(long, default_value = JAVA_TAG)]
    pub java: PathBuf,

    #[arg(long, default_value = STAR_TAG)]
    pub star: PathBuf,

    #[arg(long, default_value = QSUB_TAG)]
    pub qsub: PathBuf,
}
