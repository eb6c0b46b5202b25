// Shared fixtures: a temporary workspace with fake STAR, java and qsub executables.
#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use rnaseq_pipelines::config::defs::{
    ExecutionMode, LibraryLayout, PipelineConfig, QualityEncoding, Tools, TrimSettings,
};

const FAKE_STAR: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
if [ "$1" = "--version" ]; then
  echo "2.7.10a"
  exit 0
fi
echo "$@" >> "$dir/star_calls.log"
mode=alignReads
genome_dir=
fasta=
prefix=
while [ $# -gt 0 ]; do
  case "$1" in
    --runMode) mode="$2"; shift 2 ;;
    --genomeDir) genome_dir="$2"; shift 2 ;;
    --genomeFastaFiles) fasta="$2"; shift 2 ;;
    --outFileNamePrefix) prefix="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ "$mode" = genomeGenerate ]; then
  if [ -e "$dir/fail_index" ]; then
    echo "EXITING because of FATAL ERROR: could not open genome file" >&2
    exit 102
  fi
  printf 'versionGenome\t2.7.4a\ngenomeFastaFiles\t%s\n' "$fasta" > "$genome_dir/genomeParameters.txt"
  if [ -e "$dir/kill_index" ]; then
    echo "EXITING: std::bad_alloc while sorting suffix array" >&2
    exit 137
  fi
  : > "$genome_dir/Genome"
  : > "$genome_dir/SA"
  : > "$genome_dir/SAindex"
else
  printf 'Uniquely mapped reads %% |\t90.00%%\n' > "${prefix}Log.final.out"
fi
"#;

const FAKE_JAVA: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo "$@" >> "$dir/java_calls.log"
for arg in "$@"; do
  case "$arg" in
    *bad_*) echo "Exception in thread main: simulated trimming failure" >&2; exit 1 ;;
  esac
done
for arg in "$@"; do
  case "$arg" in
    *_trim|*_trim.gz|*_trim_orph|*_trim_orph.gz) : > "$arg" ;;
  esac
done
"#;

const FAKE_QSUB: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo "$@" >> "$dir/qsub_calls.log"
if [ -e "$dir/fail_qsub" ]; then
  echo "Unable to run job: permission denied" >&2
  exit 1
fi
for script; do :; done
n=$(wc -l < "$dir/qsub_calls.log" | tr -d ' ')
cp "$script" "$dir/job_$n.sh"
if [ ! -e "$dir/hold_jobs" ]; then
  (sleep 0.2; bash "$dir/job_$n.sh") > /dev/null 2>&1 &
fi
echo "Your job $n (\"job\") has been submitted"
"#;

pub struct Fixture {
    pub root: TempDir,
    pub input: PathBuf,
    pub out: PathBuf,
    pub bin: PathBuf,
    pub reference: PathBuf,
    pub annotation: PathBuf,
    pub trimmomatic_dir: PathBuf,
}

fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("raw");
        let bin = root.path().join("bin");
        let refs = root.path().join("refs");
        let trimmomatic_dir = root.path().join("trimmomatic");
        for dir in [&input, &bin, &refs, &trimmomatic_dir] {
            fs::create_dir_all(dir).unwrap();
        }

        let reference = refs.join("genome.fa");
        fs::write(&reference, b">chr1\nACGTACGTACGT\n").unwrap();
        let annotation = refs.join("genes.gtf");
        fs::write(&annotation, b"chr1\ttest\texon\t1\t12\t.\t+\t.\tgene_id \"g1\";\n").unwrap();
        fs::write(trimmomatic_dir.join("trimmomatic-0.39.jar"), b"").unwrap();

        write_executable(&bin.join("STAR"), FAKE_STAR);
        write_executable(&bin.join("java"), FAKE_JAVA);
        write_executable(&bin.join("qsub"), FAKE_QSUB);

        let out = root.path().join("out");
        Fixture { root, input, out, bin, reference, annotation, trimmomatic_dir }
    }

    /// Writes a two-record FASTQ, gzip-compressed when the name ends in `.gz`.
    pub fn add_reads(&self, name: &str) -> PathBuf {
        let path = self.input.join(name);
        let record = b"@r1\nACGTACGT\n+\nIIIIIIII\n@r2\nTTGGCCAA\n+\nIIIIIIII\n";
        if name.ends_with(".gz") {
            let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
            encoder.write_all(record).unwrap();
            encoder.finish().unwrap();
        } else {
            fs::write(&path, record).unwrap();
        }
        path
    }

    pub fn config(&self, layout: LibraryLayout, mode: ExecutionMode) -> PipelineConfig {
        PipelineConfig {
            input_dir: self.input.clone(),
            reference: self.reference.clone(),
            annotation: self.annotation.clone(),
            layout,
            out_dir: self.out.clone(),
            mode,
            trim: TrimSettings {
                version: "0.39".to_string(),
                trimmomatic_dir: self.trimmomatic_dir.clone(),
                adapters: None,
                quality: QualityEncoding::Phred33,
            },
            threads: 2,
            queue: None,
            poll_interval: Duration::from_millis(50),
            max_polls: Some(200),
            tools: Tools {
                java: self.bin.join("java"),
                star: self.bin.join("STAR"),
                qsub: self.bin.join("qsub"),
            },
        }
    }

    /// Creates a flag file the fake tools look for (fail_index, kill_index, fail_qsub, hold_jobs).
    pub fn set_flag(&self, flag: &str) {
        fs::write(self.bin.join(flag), b"").unwrap();
    }

    pub fn clear_flag(&self, flag: &str) {
        fs::remove_file(self.bin.join(flag)).unwrap();
    }

    pub fn calls(&self, tool: &str) -> Vec<String> {
        match fs::read_to_string(self.bin.join(format!("{}_calls.log", tool))) {
            Ok(content) => content.lines().map(String::from).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn index_builds(&self) -> usize {
        self.calls("star").iter().filter(|c| c.contains("genomeGenerate")).count()
    }

    pub fn alignments(&self) -> usize {
        self.calls("star").iter().filter(|c| c.contains("--readFilesIn")).count()
    }

    pub fn marker(&self, sample: &str) -> PathBuf {
        self.out.join("STAR_aln").join(sample).join("Log.final.out")
    }

    pub fn completion_index_lines(&self) -> Vec<String> {
        fs::read_to_string(self.out.join("STAR_aln").join("index"))
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }
}
