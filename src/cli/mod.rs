pub mod args;

use clap::Parser;

pub use args::{Arguments, Library, Quality};

pub fn parse() -> Arguments {
    Arguments::parse()
}
