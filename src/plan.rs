//! Manifest parsing and structural validation.
//! Turns a YAML manifest into the typed build plan the executor walks. All
//! structural validation happens here, before any step performs I/O.

use crate::datasource::DataSource;
use crate::error::{Error, Result};
use crate::renderer::{contains_template_syntax, MiniJinjaRenderer, TemplateEngine};
use crate::scope::ScopedContext;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// The closed set of step kinds. Dispatch matches exhaustively, so a new
/// kind is a compile-time obligation rather than a runtime warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Parse,
    Migrate,
    Render,
    Execute,
    Deploy,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Parse => "parse",
            StepKind::Migrate => "migrate",
            StepKind::Render => "render",
            StepKind::Execute => "execute",
            StepKind::Deploy => "deploy",
        }
    }
}

/// One unit of output inside a parse or render step.
///
/// Presence of `template` selects templated rendering; its absence signals
/// a direct format-conversion path.
#[derive(Debug, Clone)]
pub struct BuildTarget {
    pub template: Option<PathBuf>,
    /// Output path, or the literal token `stdout` for console output.
    pub output: String,
    pub variables: Map<String, Value>,
    pub attributes: Map<String, Value>,
    pub backend: Option<String>,
    pub doctype: Option<String>,
    pub style: Option<String>,
    /// Site-generator config files; a non-empty list routes the render
    /// target through the site generator instead of the converter.
    pub configs: Vec<PathBuf>,
    /// Extra command-line arguments passed through to the site generator.
    pub arguments: Vec<String>,
}

impl BuildTarget {
    fn from_value(value: &Value, index: usize, kind: StepKind) -> Result<Self> {
        let record = value.as_object().ok_or_else(|| {
            Error::ConfigStruct(format!("build entries of step {index} must be mappings"))
        })?;
        let output = record
            .get("output")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::StepStruct {
                index,
                kind: kind.as_str().to_string(),
                field: "builds.output".to_string(),
            })?
            .to_string();
        Ok(Self {
            template: record.get("template").and_then(Value::as_str).map(PathBuf::from),
            output,
            variables: map_field(record, "variables"),
            attributes: map_field(record, "attributes"),
            backend: record.get("backend").and_then(Value::as_str).map(str::to_string),
            doctype: record.get("doctype").and_then(Value::as_str).map(str::to_string),
            style: record.get("style").and_then(Value::as_str).map(str::to_string),
            configs: string_list(record, "configs").into_iter().map(PathBuf::from).collect(),
            arguments: string_list(record, "arguments"),
        })
    }

    pub fn writes_to_stdout(&self) -> bool {
        self.output.eq_ignore_ascii_case("stdout")
    }
}

fn map_field(record: &Map<String, Value>, key: &str) -> Map<String, Value> {
    record.get(key).and_then(Value::as_object).cloned().unwrap_or_default()
}

/// Accepts a scalar string or a list of strings; anything else is empty.
fn string_list(record: &Map<String, Value>, key: &str) -> Vec<String> {
    match record.get(key) {
        Some(Value::String(one)) => vec![one.clone()],
        Some(Value::Array(items)) => {
            items.iter().filter_map(Value::as_str).map(str::to_string).collect()
        }
        _ => Vec::new(),
    }
}

/// Kind-specific payload of a step.
#[derive(Debug, Clone)]
pub enum StepDetail {
    Parse { data: Vec<DataSource>, builds: Vec<BuildTarget> },
    Migrate { source: PathBuf, target: PathBuf },
    Render { index: PathBuf, attribute_files: Vec<PathBuf>, builds: Vec<BuildTarget> },
    Execute { command: String },
    Deploy,
}

/// One manifest entry: a kind plus kind-specific required fields, with the
/// common optional attributes every kind shares.
#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub stage: Option<String>,
    pub reason: Option<String>,
    pub options: Map<String, Value>,
    pub detail: StepDetail,
}

impl Step {
    fn from_value(value: &Value, index: usize) -> Result<Self> {
        let record = value.as_object().ok_or_else(|| {
            Error::ConfigStruct(format!("step {index} is not a mapping"))
        })?;
        let action = record.get("action").and_then(Value::as_str).ok_or_else(|| {
            Error::ConfigStruct(format!(
                "every listing in the configuration file needs an action type declaration (step {index})"
            ))
        })?;
        let kind = match action {
            "parse" => StepKind::Parse,
            "migrate" => StepKind::Migrate,
            "render" => StepKind::Render,
            "execute" => StepKind::Execute,
            "deploy" => StepKind::Deploy,
            other => {
                return Err(Error::ConfigStruct(format!(
                    "the action '{other}' is not valid (step {index})"
                )))
            }
        };

        let require = |field: &str| -> Result<&Value> {
            record.get(field).ok_or_else(|| Error::StepStruct {
                index,
                kind: kind.as_str().to_string(),
                field: field.to_string(),
            })
        };

        let detail = match kind {
            StepKind::Parse => {
                let data = match record.get("data") {
                    Some(value) => DataSource::from_manifest_value(value)?,
                    None => Vec::new(),
                };
                let builds = builds_field(require("builds")?, index, kind)?;
                StepDetail::Parse { data, builds }
            }
            StepKind::Migrate => StepDetail::Migrate {
                source: path_field(require("source")?, index, kind, "source")?,
                target: path_field(require("target")?, index, kind, "target")?,
            },
            StepKind::Render => {
                let attribute_files = match record.get("data") {
                    Some(Value::String(file)) => vec![PathBuf::from(file)],
                    Some(Value::Array(files)) => files
                        .iter()
                        .filter_map(Value::as_str)
                        .map(PathBuf::from)
                        .collect(),
                    _ => Vec::new(),
                };
                StepDetail::Render {
                    index: path_field(require("source")?, index, kind, "source")?,
                    attribute_files,
                    builds: builds_field(require("builds")?, index, kind)?,
                }
            }
            StepKind::Execute => StepDetail::Execute {
                command: require("command")?
                    .as_str()
                    .ok_or_else(|| Error::StepStruct {
                        index,
                        kind: kind.as_str().to_string(),
                        field: "command".to_string(),
                    })?
                    .to_string(),
            },
            StepKind::Deploy => StepDetail::Deploy,
        };

        Ok(Self {
            kind,
            stage: record.get("stage").and_then(Value::as_str).map(str::to_string),
            reason: record.get("reason").and_then(Value::as_str).map(str::to_string),
            options: map_field(record, "options"),
            detail,
        })
    }

    /// Looks up a dotted option path (`error.response`) in the step options.
    pub fn option(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.options.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

fn path_field(value: &Value, index: usize, kind: StepKind, field: &str) -> Result<PathBuf> {
    value.as_str().map(PathBuf::from).ok_or_else(|| Error::StepStruct {
        index,
        kind: kind.as_str().to_string(),
        field: field.to_string(),
    })
}

fn builds_field(value: &Value, index: usize, kind: StepKind) -> Result<Vec<BuildTarget>> {
    let entries = value.as_array().ok_or_else(|| Error::StepStruct {
        index,
        kind: kind.as_str().to_string(),
        field: "builds".to_string(),
    })?;
    entries.iter().map(|entry| BuildTarget::from_value(entry, index, kind)).collect()
}

/// The typed pipeline model: an ordered list of validated steps.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub steps: Vec<Step>,
}

impl BuildPlan {
    /// Parses manifest text into a validated plan.
    ///
    /// Validation is all-or-nothing: a manifest with one malformed step
    /// fails here, before any side effects occur for earlier steps.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        let raw: Value = serde_json::to_value(raw)?;
        let entries = upgrade_legacy(raw)?;
        let steps = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| Step::from_value(entry, index + 1))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { steps })
    }

    /// All shell commands declared by execute steps, in plan order. The
    /// safety gate displays these up front, once for the whole plan.
    pub fn execute_commands(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| match &step.detail {
                StepDetail::Execute { command } => Some(command.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Accepts the legacy single-object `compile:` manifest form and rewrites
/// it into the current sequence form; every legacy entry is a parse step.
fn upgrade_legacy(raw: Value) -> Result<Vec<Value>> {
    match raw {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut root) => match root.remove("compile") {
            Some(Value::Array(entries)) => {
                warn!(
                    "You are using a deprecated configuration file structure. \
                     Update your config files; support for this structure will be dropped."
                );
                Ok(entries
                    .into_iter()
                    .map(|entry| match entry {
                        Value::Object(mut record) => {
                            record
                                .entry("action".to_string())
                                .or_insert_with(|| Value::String("parse".to_string()));
                            Value::Object(record)
                        }
                        other => other,
                    })
                    .collect())
            }
            _ => Err(Error::ConfigStruct(
                "the configuration file is not properly structured".to_string(),
            )),
        },
        _ => Err(Error::ConfigStruct(
            "the configuration file is not properly structured".to_string(),
        )),
    }
}

/// Loads a manifest from disk, pre-rendering it as a template when it
/// contains template syntax or when CLI variables were supplied, then
/// parsing the rendered text as the plan.
///
/// The caller is expected to have added the manifest's own directory to the
/// engine's include search path beforehand.
pub fn load_manifest(
    path: &Path,
    engine: &MiniJinjaRenderer,
    cli_vars: &Map<String, Value>,
) -> Result<BuildPlan> {
    let text = std::fs::read_to_string(path).map_err(|_| Error::InvalidInput {
        role: "config".to_string(),
        file: path.to_path_buf(),
    })?;
    let text = if contains_template_syntax(&text) || !cli_vars.is_empty() {
        debug!("Pre-rendering manifest {} as a template", path.display());
        let mut context = ScopedContext::new();
        context.merge(&Value::Object(cli_vars.clone()), "vars");
        engine.render(&text, &context)?
    } else {
        text
    };
    BuildPlan::parse(&text)
}
