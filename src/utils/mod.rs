pub mod command;
pub mod file;
pub mod samples;
pub mod streams;
pub mod system;
