//! Document-conversion and site-generation collaborator boundaries.
//! The pipeline's responsibility ends at assembling attributes and the
//! invocation command; the converters' internal rendering is external.

use crate::command::CommandGate;
use crate::error::{Error, Result};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Render backends the dispatch recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Html5,
    Pdf,
}

impl Backend {
    /// Resolves an explicitly declared backend name. An unrecognized name
    /// is fatal.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "html5" | "html" => Ok(Self::Html5),
            "pdf" => Ok(Self::Pdf),
            other => Err(Error::UnrecognizedBackend { backend: other.to_string() }),
        }
    }

    /// Derives the backend for a build target: an explicit declaration
    /// wins; otherwise a `.pdf` output extension selects pdf and anything
    /// else the default markup backend.
    pub fn derive(explicit: Option<&str>, output: &Path) -> Result<Self> {
        match explicit {
            Some(name) => Self::from_name(name),
            None => match output.extension().and_then(|e| e.to_str()) {
                Some("pdf") => Ok(Self::Pdf),
                _ => Ok(Self::Html5),
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html5 => "html5",
            Self::Pdf => "pdf",
        }
    }
}

/// Gathers document attributes from fixed YAML attribute files.
///
/// A missing file is fatal; a file that parses but is not a mapping is
/// warned about and skipped, matching the pipeline's soft policy for
/// attribute payloads.
pub fn ingest_attributes(files: &[PathBuf], base_dir: &Path) -> Result<Map<String, Value>> {
    let mut attributes = Map::new();
    for file in files {
        let path = if file.is_absolute() { file.clone() } else { base_dir.join(file) };
        let text = std::fs::read_to_string(&path).map_err(|_| Error::InvalidInput {
            role: "attributes".to_string(),
            file: path.clone(),
        })?;
        let parsed: serde_yaml::Value = serde_yaml::from_str(&text)?;
        match serde_json::to_value(parsed)? {
            Value::Object(map) => attributes.extend(map),
            _ => warn!("Attributes file {} is not a mapping; ignored", path.display()),
        }
    }
    Ok(attributes)
}

/// One conversion handoff: index document, assembled attributes, backend,
/// doctype, and output path.
pub struct ConversionJob<'a> {
    pub index: &'a Path,
    pub attributes: &'a Map<String, Value>,
    pub backend: Backend,
    pub doctype: &'a str,
    pub output: &'a Path,
}

/// Trait boundary for the external document-conversion collaborator.
pub trait DocumentConverter {
    fn convert(&self, job: &ConversionJob) -> Result<()>;
}

/// Converter that shells out to the asciidoctor CLI family.
pub struct AsciidoctorConverter {
    gate: CommandGate,
}

impl AsciidoctorConverter {
    pub fn new() -> Self {
        Self { gate: CommandGate::new() }
    }

    fn assemble_command(job: &ConversionJob) -> String {
        let program = match job.backend {
            Backend::Pdf => "asciidoctor-pdf",
            Backend::Html5 => "asciidoctor",
        };
        let mut command = format!(
            "{} -o {} -b {} -d {} -S unsafe",
            program,
            job.output.display(),
            job.backend.as_str(),
            job.doctype,
        );
        for (key, value) in job.attributes {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            command.push_str(&format!(" -a {}='{}'", key, rendered));
        }
        command.push_str(&format!(" {}", job.index.display()));
        command
    }
}

impl Default for AsciidoctorConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentConverter for AsciidoctorConverter {
    fn convert(&self, job: &ConversionJob) -> Result<()> {
        let command = Self::assemble_command(job);
        debug!("Running {}", command);
        self.gate.run_fatal(&command)?;
        info!("Rendered file {}.", job.output.display());
        Ok(())
    }
}

/// Name of the generator config file the executor writes next to the
/// manifest, carrying the assembled attributes for a site build.
pub const ATTRIBUTES_CONFIG_FILE: &str = "_docpipe_attributes.yml";

/// Trait boundary for the static-site-generation collaborator.
pub trait SiteBuilder {
    fn build(&self, config_files: &[PathBuf], extra_args: &[String]) -> Result<()>;
}

/// Handoff to the static-site-generation collaborator. This core writes a
/// config file carrying the assembled attributes and assembles the build
/// invocation; the generator's semantics are its own.
pub struct SiteGenerator {
    gate: CommandGate,
}

impl SiteGenerator {
    pub fn new() -> Self {
        Self { gate: CommandGate::new() }
    }

    /// Writes the assembled attributes as a generator config file.
    pub fn write_attributes_config(path: &Path, attributes: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(&Value::Object(attributes.clone()))?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Assembles the generator invocation from its config file paths plus
    /// extra CLI arguments.
    pub fn build_command(config_files: &[PathBuf], extra_args: &[String]) -> String {
        let configs = config_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut command = format!("jekyll build --config {}", configs);
        for arg in extra_args {
            command.push(' ');
            command.push_str(arg);
        }
        command
    }

    pub fn generate(&self, config_files: &[PathBuf], extra_args: &[String]) -> Result<()> {
        let command = Self::build_command(config_files, extra_args);
        debug!("Running {}", command);
        self.gate.run_fatal(&command)?;
        Ok(())
    }
}

impl Default for SiteGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteBuilder for SiteGenerator {
    fn build(&self, config_files: &[PathBuf], extra_args: &[String]) -> Result<()> {
        self.generate(config_files, extra_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backend_derivation_prefers_explicit_and_falls_back_to_extension() {
        assert_eq!(Backend::derive(None, Path::new("out.pdf")).unwrap(), Backend::Pdf);
        assert_eq!(Backend::derive(None, Path::new("out.html")).unwrap(), Backend::Html5);
        assert_eq!(Backend::derive(Some("pdf"), Path::new("out.html")).unwrap(), Backend::Pdf);
        assert!(matches!(
            Backend::derive(Some("docbook"), Path::new("out.xml")),
            Err(Error::UnrecognizedBackend { .. })
        ));
    }

    #[test]
    fn conversion_command_carries_attributes() {
        let attributes =
            json!({"stylesheet": "main.css"}).as_object().cloned().unwrap_or_default();
        let job = ConversionJob {
            index: Path::new("index.adoc"),
            attributes: &attributes,
            backend: Backend::Html5,
            doctype: "article",
            output: Path::new("out/index.html"),
        };
        let command = AsciidoctorConverter::assemble_command(&job);
        assert!(command.starts_with("asciidoctor -o out/index.html -b html5 -d article"));
        assert!(command.contains("-a stylesheet='main.css'"));
        assert!(command.ends_with("index.adoc"));
    }

    #[test]
    fn site_generator_command_joins_configs() {
        let command = SiteGenerator::build_command(
            &[PathBuf::from("_config.yml"), PathBuf::from("_attrs.yml")],
            &["--trace".to_string()],
        );
        assert_eq!(command, "jekyll build --config _config.yml,_attrs.yml --trace");
    }
}
