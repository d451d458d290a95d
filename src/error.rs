//! Error handling for the docpipe application.
//! Defines custom error types and results used throughout the application.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for docpipe operations.
///
/// This enum represents all possible errors that can occur while loading
/// data, resolving includes, parsing build plans, and executing steps.
/// It implements the standard Error trait through thiserror's derive macro.
#[derive(Error, Debug)]
pub enum Error {
    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    /// The manifest root is not shaped like a build plan
    #[error("Configuration error: {0}.")]
    ConfigStruct(String),

    /// A step is missing a field its declared kind requires
    #[error("Every {kind}-type step in the configuration file needs a '{field}' declaration (step {index}).")]
    StepStruct {
        index: usize,
        kind: String,
        field: String,
    },

    /// A data file could not be read
    #[error("The data file ({}) could not be read.", .file.display())]
    DataFileRead { file: PathBuf },

    /// A required input file failed validation
    #[error("The {role} file ({}) was not found.", .file.display())]
    InvalidInput { role: String, file: PathBuf },

    /// A data file carries no declared format and an unrecognized extension
    #[error("Data file extension must be one of: .yml, .json, .xml, or .csv, or else declared in the config file ({}).", .file.display())]
    FileExtensionUnknown { file: PathBuf },

    /// The declared data format is outside the permitted set
    #[error("Declared data type must be one of: yaml, json, xml, csv, or regex (got '{format}').")]
    DataTypeUnrecognized { format: String },

    /// A regex-format data source was declared without a pattern
    #[error("A regex pattern is required for free-form data file {}.", .file.display())]
    MissingRegexPattern { file: PathBuf },

    /// An include tag's parameter list does not match the grammar
    #[error("Invalid syntax for include tag parameters: {fragment}")]
    InvalidIncludeSyntax { fragment: String },

    /// An include filename contains forbidden characters or sequences
    #[error("Include file contains invalid characters or sequences: {file}")]
    InvalidIncludeFilename { file: String },

    /// No include search root contains the requested file
    #[error("Could not locate the included file '{file}' in any of {search_path:?}. Ensure it exists and is not a symlink pointing outside those directories.")]
    IncludeNotFound {
        file: String,
        search_path: Vec<PathBuf>,
    },

    /// Represents errors that occur during template processing
    #[error("Template error: {0}.")]
    MinijinjaError(#[from] minijinja::Error),

    /// A rendering failure inside an included partial, annotated with the
    /// partial's path. Never re-wrapped: nested includes keep the innermost
    /// failure site.
    #[error("Error rendering included partial {}: {source}", .path.display())]
    IncludeRender {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// An explicit backend value the render dispatch does not know
    #[error("Unrecognized render backend '{backend}'.")]
    UnrecognizedBackend { backend: String },

    /// A shell command exited non-zero under a fatal error policy
    #[error("Command `{command}` failed with {status}.")]
    CommandFailed { command: String, status: String },

    /// The user declined the execute-step confirmation gate
    #[error("Shell command execution declined; aborting the build.")]
    ExecutionDeclined,

    /// A migrate step's source does not exist under the default policy
    #[error("Migrate source {} does not exist.", .path.display())]
    MigrateSourceMissing { path: PathBuf },

    /// Represents YAML parsing failures
    #[error("YAML error: {0}.")]
    YamlError(#[from] serde_yaml::Error),

    /// Represents JSON parsing failures
    #[error("JSON error: {0}.")]
    JsonError(#[from] serde_json::Error),

    /// Represents CSV parsing failures
    #[error("CSV error: {0}.")]
    CsvError(#[from] csv::Error),

    /// Represents XML parsing failures
    #[error("XML error: {0}.")]
    XmlError(#[from] quick_xml::Error),

    /// Malformed text, attribute, or structure inside an XML data file
    #[error("XML content error: {0}.")]
    XmlContent(String),

    /// Represents regex compilation failures
    #[error("Regex error: {0}.")]
    RegexError(#[from] regex::Error),

    /// Represents user interaction failures
    #[error("Prompt error: {0}.")]
    PromptError(String),
}

/// Convenience type alias for Results with docpipe's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that logs the error and exits the program.
///
/// # Arguments
/// * `err` - The Error to handle
///
/// # Behavior
/// Logs the error message and exits with status code 1
pub fn default_error_handler(err: Error) -> ! {
    log::error!("{}", err);
    std::process::exit(1);
}
