pub mod backend;
pub mod completion;
pub mod environment;
pub mod genome_index;
pub mod rnaseq;
