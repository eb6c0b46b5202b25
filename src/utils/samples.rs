/// Sample discovery from raw read file names.
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::defs::{LibraryLayout, PipelineError, RawFileSuffix};
use crate::utils::file::is_gzipped;

/// One biological sample and its raw read file(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub id: String,
    pub reads: Vec<PathBuf>,
}

impl Sample {
    pub fn is_paired(&self) -> bool {
        self.reads.len() == 2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    pub suffix: RawFileSuffix,
    pub samples: Vec<Sample>,
}

/// Detects the raw file suffix of a single file name.
/// `.fastq.gz` is tested first so compressed names are never taken as plain.
pub fn detect_suffix(file_name: &str) -> Option<RawFileSuffix> {
    if file_name.ends_with(&format!(".{}", RawFileSuffix::CompressedFastq.extension())) {
        Some(RawFileSuffix::CompressedFastq)
    } else if file_name.ends_with(&format!(".{}", RawFileSuffix::PlainFastq.extension())) {
        Some(RawFileSuffix::PlainFastq)
    } else {
        None
    }
}

/// Strips the first-of-pair token and suffix, e.g. `s1_1.fastq.gz` -> `s1`.
pub fn sample_id(file_name: &str, suffix: RawFileSuffix) -> Option<&str> {
    file_name
        .strip_suffix(&format!("_1.{}", suffix.extension()))
        .filter(|id| !id.is_empty())
}

pub fn mate_file_name(id: &str, mate: usize, suffix: RawFileSuffix) -> String {
    format!("{}_{}.{}", id, mate, suffix.extension())
}


/// Lists the input directory and enumerates samples from `*_1.<suffix>` files.
///
/// # Arguments
///
/// * `input_dir` - Directory holding raw read files.
/// * `layout` - Single or paired library layout; paired samples must have a `_2` mate.
///
/// # Returns
/// SampleSet with the detected suffix and samples sorted by identifier.
pub fn discover_samples(input_dir: &Path, layout: LibraryLayout) -> Result<SampleSet, PipelineError> {
    let mut names: Vec<String> = fs::read_dir(input_dir)
        .map_err(|e| PipelineError::IOError(format!("Cannot read {}: {}", input_dir.display(), e)))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    let suffix = names
        .iter()
        .find_map(|name| detect_suffix(name))
        .ok_or_else(|| PipelineError::NoInputFiles(input_dir.to_path_buf()))?;
    debug!("Detected raw file suffix .{}", suffix);

    let ids: BTreeSet<&str> = names.iter().filter_map(|name| sample_id(name, suffix)).collect();
    if ids.is_empty() {
        return Err(PipelineError::NoInputFiles(input_dir.to_path_buf()));
    }

    let mut samples = Vec::with_capacity(ids.len());
    for id in ids {
        let mut reads = Vec::with_capacity(layout.mates());
        for mate in 1..=layout.mates() {
            let path = input_dir.join(mate_file_name(id, mate, suffix));
            if !path.is_file() {
                return Err(PipelineError::MissingMate { sample: id.to_string(), path });
            }
            reads.push(path);
        }

        if suffix.is_compressed() {
            match is_gzipped(&reads[0]) {
                Ok(true) => {}
                Ok(false) => warn!("{} has a gzip suffix but no gzip header", reads[0].display()),
                Err(e) => warn!("Cannot inspect {}: {}", reads[0].display(), e),
            }
        }
        samples.push(Sample { id: id.to_string(), reads });
    }

    info!("Found {} sample(s) with .{} reads in {}", samples.len(), suffix, input_dir.display());
    Ok(SampleSet { suffix, samples })
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"@r\nACGT\n+\nIIII\n").unwrap();
    }

    #[test]
    fn test_detect_suffix() {
        assert_eq!(detect_suffix("a_1.fastq.gz"), Some(RawFileSuffix::CompressedFastq));
        assert_eq!(detect_suffix("a_1.fastq"), Some(RawFileSuffix::PlainFastq));
        assert_eq!(detect_suffix("a_1.fq"), None);
        assert_eq!(detect_suffix("notes.txt"), None);
    }

    #[test]
    fn test_sample_id() {
        assert_eq!(sample_id("s1_1.fastq", RawFileSuffix::PlainFastq), Some("s1"));
        assert_eq!(sample_id("s_a_1_1.fastq.gz", RawFileSuffix::CompressedFastq), Some("s_a_1"));
        assert_eq!(sample_id("s1_2.fastq", RawFileSuffix::PlainFastq), None);
        assert_eq!(sample_id("s1_1.fastq.gz", RawFileSuffix::PlainFastq), None);
        assert_eq!(sample_id("_1.fastq", RawFileSuffix::PlainFastq), None);
    }

    #[test]
    fn test_discover_plain_paired() {
        let tmp = tempdir().unwrap();
        for name in ["b_1.fastq", "b_2.fastq", "a_1.fastq", "a_2.fastq", "README"] {
            touch(tmp.path(), name);
        }
        let set = discover_samples(tmp.path(), LibraryLayout::Paired).unwrap();
        assert_eq!(set.suffix, RawFileSuffix::PlainFastq);
        let ids: Vec<&str> = set.samples.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(set.samples.iter().all(|s| s.is_paired()));
        assert_eq!(set.samples[0].reads[1], tmp.path().join("a_2.fastq"));
    }

    #[test]
    fn test_discover_single_uses_first_mate_only() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "x_1.fastq");
        let set = discover_samples(tmp.path(), LibraryLayout::Single).unwrap();
        assert_eq!(set.samples, vec![Sample { id: "x".to_string(), reads: vec![tmp.path().join("x_1.fastq")] }]);
    }

    #[test]
    fn test_discover_mixed_takes_first_sorted_file() {
        let tmp = tempdir().unwrap();
        for name in ["b_1.fastq", "a_1.fastq.gz", "c_1.fastq"] {
            touch(tmp.path(), name);
        }
        let first = discover_samples(tmp.path(), LibraryLayout::Single).unwrap();
        let second = discover_samples(tmp.path(), LibraryLayout::Single).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.suffix, RawFileSuffix::CompressedFastq);
        assert_eq!(first.samples.len(), 1);
        assert_eq!(first.samples[0].id, "a");
    }

    #[test]
    fn test_discover_empty_directory() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "notes.txt");
        assert!(matches!(
            discover_samples(tmp.path(), LibraryLayout::Single),
            Err(PipelineError::NoInputFiles(_))
        ));
    }

    #[test]
    fn test_discover_missing_mate() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "a_1.fastq");
        match discover_samples(tmp.path(), LibraryLayout::Paired) {
            Err(PipelineError::MissingMate { sample, path }) => {
                assert_eq!(sample, "a");
                assert_eq!(path, tmp.path().join("a_2.fastq"));
            }
            other => panic!("Expected MissingMate, got {:?}", other),
        }
    }
}
