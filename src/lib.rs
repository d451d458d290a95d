//! docpipe is a configuration-driven documentation build pipeline.
//! A declarative manifest lists ordered steps (parse, migrate, render,
//! execute, deploy); each step ingests semi-structured data, composes it
//! into a scoped namespace, and feeds it to a text-templating engine or a
//! file/process operation.

/// Command-line interface module for the docpipe application
pub mod cli;

/// Shell command execution and captured-output handling
pub mod command;

/// Document-conversion and site-generation collaborator boundaries
pub mod convert;

/// Semi-structured data file ingestion (YAML, JSON, XML, CSV, regex)
pub mod datasource;

/// Error types and handling for the docpipe application
pub mod error;

/// Build plan walking and per-step dispatch
pub mod executor;

/// Partial-template resolution, validation, and caching
pub mod include;

/// Logger bootstrap
pub mod logger;

/// Asset copying for migrate steps
pub mod migrate;

/// Manifest parsing and structural validation
/// Produces the typed build plan the executor walks
pub mod plan;

/// User input and interaction handling
pub mod prompt;

/// Template parsing and rendering functionality
pub mod renderer;

/// Layered variable scoping for render contexts
pub mod scope;
