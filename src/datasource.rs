//! Semi-structured data file ingestion.
//! A DataSource describes one ingestible file (path, declared or inferred
//! format, optional line pattern) and loads it into a structured value.

use crate::error::{Error, Result};
use log::debug;
use regex::Regex;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// The five recognized data formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Yaml,
    Json,
    Xml,
    Csv,
    Regex,
}

impl DataFormat {
    /// Resolves an explicitly declared format name. `yml` is accepted as an
    /// alias of `yaml`, a common manifest typo in the wild.
    pub fn from_declared(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            "csv" => Ok(Self::Csv),
            "regex" => Ok(Self::Regex),
            other => Err(Error::DataTypeUnrecognized { format: other.to_string() }),
        }
    }

    /// Infers a format from a file extension.
    pub fn from_extension(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "yml" | "yaml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            "csv" => Ok(Self::Csv),
            _ => Err(Error::FileExtensionUnknown { file: path.to_path_buf() }),
        }
    }
}

/// One data file reference from a manifest `data` declaration.
#[derive(Debug, Clone)]
pub struct DataSource {
    path: PathBuf,
    format: Option<DataFormat>,
    pattern: Option<String>,
}

impl DataSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), format: None, pattern: None }
    }

    /// Builds the source list from a manifest `data` value, which may be a
    /// filename string, a `{file, type, pattern}` map, or a list of either.
    pub fn from_manifest_value(value: &Value) -> Result<Vec<DataSource>> {
        match value {
            Value::String(file) => Ok(vec![DataSource::new(file)]),
            Value::Object(record) => Ok(vec![Self::from_record(record)?]),
            Value::Array(entries) => entries
                .iter()
                .map(|entry| match entry {
                    Value::String(file) => Ok(DataSource::new(file)),
                    Value::Object(record) => Self::from_record(record),
                    _ => Err(Error::ConfigStruct(
                        "a data source must be a filename or a file/type/pattern record"
                            .to_string(),
                    )),
                })
                .collect(),
            _ => Err(Error::ConfigStruct(
                "a data source must be a filename or a file/type/pattern record".to_string(),
            )),
        }
    }

    fn from_record(record: &Map<String, Value>) -> Result<DataSource> {
        let file = record
            .get("file")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::ConfigStruct("a data source record needs a 'file' declaration".to_string())
            })?;
        let mut source = DataSource::new(file);
        if let Some(declared) = record.get("type").and_then(Value::as_str) {
            source.format = Some(DataFormat::from_declared(declared)?);
        }
        if let Some(pattern) = record.get("pattern").and_then(Value::as_str) {
            source.pattern = Some(pattern.to_string());
        }
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scope key for this source when several are loaded together:
    /// the basename without extension.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("data")
            .to_string()
    }

    /// The effective format: declared wins, extension inference otherwise.
    pub fn resolve_format(&self) -> Result<DataFormat> {
        match self.format {
            Some(format) => Ok(format),
            None => DataFormat::from_extension(&self.path),
        }
    }

    /// Loads the file into a structured value per the resolved format.
    ///
    /// # Errors
    /// * `DataFileRead` if the file is unreadable
    /// * `FileExtensionUnknown` / `DataTypeUnrecognized` on format resolution
    /// * `MissingRegexPattern` for regex sources without a pattern
    pub fn load(&self, base_dir: &Path) -> Result<Value> {
        let format = self.resolve_format()?;
        let path =
            if self.path.is_absolute() { self.path.clone() } else { base_dir.join(&self.path) };
        debug!("Ingesting data file {} as {:?}", path.display(), format);
        let text = fs::read_to_string(&path)
            .map_err(|_| Error::DataFileRead { file: path.clone() })?;
        match format {
            DataFormat::Yaml => {
                let parsed: serde_yaml::Value = serde_yaml::from_str(&text)?;
                Ok(serde_json::to_value(parsed)?)
            }
            DataFormat::Json => Ok(serde_json::from_str(&text)?),
            DataFormat::Xml => xml_to_value(&text),
            DataFormat::Csv => csv_to_value(&text),
            DataFormat::Regex => {
                let pattern = self
                    .pattern
                    .as_deref()
                    .ok_or_else(|| Error::MissingRegexPattern { file: path.clone() })?;
                regex_to_value(&text, pattern)
            }
        }
    }
}

/// Parses CSV text into an ordered list of header-keyed row maps.
fn csv_to_value(text: &str) -> Result<Value> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Value::String(field.to_string()));
        }
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}

/// Matches every line of a free-form file against a pattern; named capture
/// groups become record keys. Non-matching lines are silently skipped.
fn regex_to_value(text: &str, pattern: &str) -> Result<Value> {
    let re = Regex::new(pattern)?;
    debug!("Using regular expression {} to parse data file", pattern);
    let group_names: Vec<&str> = re.capture_names().flatten().collect();
    let mut records = Vec::new();
    for line in text.lines() {
        if let Some(captures) = re.captures(line) {
            let mut record = Map::new();
            for name in &group_names {
                if let Some(matched) = captures.name(name) {
                    record.insert(name.to_string(), Value::String(matched.as_str().to_string()));
                }
            }
            records.push(Value::Object(record));
        }
    }
    Ok(Value::Array(records))
}

/// Parses XML into a nested value tree and unwraps the synthetic document
/// root, so `<root><a>1</a></root>` loads as `{"a": "1"}`.
fn xml_to_value(text: &str) -> Result<Value> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(text);
    reader.config_mut().trim_text(true);

    // Stack of (element name, accumulated children map, accumulated text).
    let mut stack: Vec<(String, Map<String, Value>, String)> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                let mut children = Map::new();
                for attr in start.attributes() {
                    let attr = attr.map_err(|e| Error::XmlContent(e.to_string()))?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = attr
                        .unescape_value()
                        .map_err(|e| Error::XmlContent(e.to_string()))?
                        .into_owned();
                    children.insert(key, Value::String(value));
                }
                stack.push((name, children, String::new()));
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                match stack.last_mut() {
                    Some((_, parent, _)) => insert_xml_child(parent, &name, Value::Null),
                    None => root = Some(Value::Null),
                }
            }
            Event::Text(t) => {
                if let Some((_, _, text)) = stack.last_mut() {
                    text.push_str(&t.unescape().map_err(|e| Error::XmlContent(e.to_string()))?);
                }
            }
            Event::CData(c) => {
                if let Some((_, _, text)) = stack.last_mut() {
                    text.push_str(&String::from_utf8_lossy(c.as_ref()));
                }
            }
            Event::End(_) => {
                let Some((name, children, text)) = stack.pop() else {
                    return Err(Error::XmlContent("unbalanced closing tag".to_string()));
                };
                let value = if children.is_empty() {
                    Value::String(text.trim().to_string())
                } else {
                    Value::Object(children)
                };
                match stack.last_mut() {
                    Some((_, parent, _)) => insert_xml_child(parent, &name, value),
                    None => root = Some(value),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| {
        Error::ConfigStruct("the XML data file contains no document element".to_string())
    })
}

/// Inserts a child element, turning repeated siblings into a list.
fn insert_xml_child(parent: &mut Map<String, Value>, name: &str, value: Value) {
    match parent.get_mut(name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.insert(name.to_string(), value);
        }
    }
}
