//! Command-line interface implementation for docpipe.
//! Provides argument parsing using clap.

use clap::Parser;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Command-line arguments structure for docpipe.
#[derive(Parser, Debug)]
#[command(author, version, about = "docpipe: configuration-driven documentation build pipeline", long_about = None)]
pub struct Args {
    /// Base directory that relative paths resolve against
    #[arg(short, long, default_value = ".")]
    pub base: PathBuf,

    /// Build manifest file; enables preset source, template, and output
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Semi-structured data source path for a direct parse build.
    /// Required unless --config is given.
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Template path for a direct parse build
    #[arg(short, long)]
    pub template: Option<PathBuf>,

    /// Output file path for generated content
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Additional include search directories, tried in order
    #[arg(long = "include-dir", value_name = "DIR")]
    pub include_dirs: Vec<PathBuf>,

    /// key=value variable override, merged into the `vars` scope.
    /// May be repeated.
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// key=value document attribute for render steps. May be repeated.
    #[arg(short = 'a', long = "attr", value_name = "KEY=VALUE")]
    pub attributes: Vec<String>,

    /// Print rendered output to stdout instead of writing a file
    #[arg(long)]
    pub stdout: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable safe mode: skip the execute-step confirmation gate
    #[arg(long = "unsafe")]
    pub unsafe_mode: bool,
}

/// Parses command line arguments and returns the Args structure.
pub fn get_args() -> Args {
    Args::parse()
}

/// Splits repeated `key=value` arguments into a map. A pair without `=`
/// becomes a key with an empty value.
pub fn parse_pairs(pairs: &[String]) -> Map<String, Value> {
    let mut map = Map::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) => {
                map.insert(key.to_string(), Value::String(value.to_string()));
            }
            None => {
                map.insert(pair.to_string(), Value::String(String::new()));
            }
        }
    }
    map
}
