//! Partial-template resolution for `include`/`inc` tags.
//! Validates and locates partials referenced from template bodies, and turns
//! tag markup into a deferred call so partials are only resolved when the
//! surrounding template's control flow actually reaches the tag.

use crate::error::{Error, Result};
use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Name of the render-time function include tags are rewritten to.
pub(crate) const INCLUDE_FN: &str = "__include";

/// Matches one `key = "double" | 'single' | bareword` parameter, anchored at
/// the front of the remaining markup. Quoted values may backslash-escape
/// their own quote character; barewords are context expressions.
fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?x)^\s*
            ([\w-]+)\s*=\s*
            (?:
                "([^"\\]*(?:\\.[^"\\]*)*)"
                |'([^'\\]*(?:\\.[^'\\]*)*)'
                |([a-z][\w'"\[\].-]*)
            )"#,
        )
        .expect("static pattern")
    })
}

/// Matches a filename expressed as a template variable, splitting it from
/// the trailing parameter markup.
fn variable_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?sx)^(?P<variable>[^\s{]*(?:\{\{\s*[\w\-.]+\s*(?:\|[^}]*)?\}\}[^\s{}]*)+)\s*(?P<params>.*)$",
        )
        .expect("static pattern")
    })
}

fn valid_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w/.-]+$").expect("static pattern"))
}

/// Any run of two or more `.` or `/` characters blocks `../`, `//`, and
/// obfuscated traversal spellings.
fn invalid_sequence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[./]{2,}").expect("static pattern"))
}

/// Matches one embedded `{{ expression }}` chunk inside a variable filename.
fn embedded_expression_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{-?\s*(.*?)\s*-?\}\}").expect("static pattern"))
}

/// Reads partial files. A seam so tests can count or fake reads.
pub trait PartialReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<String>;
}

/// Filesystem-backed reader used outside of tests.
pub struct FsPartialReader;

impl PartialReader for FsPartialReader {
    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(Error::IoError)
    }
}

/// Locates, validates, and caches partial templates for include tags.
///
/// The cache maps resolved absolute path to template source and lives for
/// one pipeline run; templates are assumed immutable for the duration of a
/// build, so entries are never invalidated.
pub struct IncludeResolver {
    search_path: Vec<PathBuf>,
    safe_mode: bool,
    reader: Box<dyn PartialReader>,
    cache: Mutex<HashMap<PathBuf, String>>,
}

impl IncludeResolver {
    pub fn new(search_path: Vec<PathBuf>, safe_mode: bool) -> Self {
        Self::with_reader(search_path, safe_mode, Box::new(FsPartialReader))
    }

    pub fn with_reader(
        search_path: Vec<PathBuf>,
        safe_mode: bool,
        reader: Box<dyn PartialReader>,
    ) -> Self {
        Self { search_path, safe_mode, reader, cache: Mutex::new(HashMap::new()) }
    }

    /// Walks the search path in declared order; the first existing join
    /// wins. In safe mode a candidate whose real path escapes its search
    /// root is treated as not found rather than exposing the target.
    pub(crate) fn locate(&self, filename: &str) -> Result<PathBuf> {
        for dir in &self.search_path {
            let candidate = dir.join(filename);
            if !candidate.exists() {
                continue;
            }
            if self.safe_mode && !realpath_prefixed_with(&candidate, dir) {
                debug!(
                    "Include candidate {} escapes search root {}; rejecting",
                    candidate.display(),
                    dir.display()
                );
                continue;
            }
            return Ok(candidate);
        }
        Err(Error::IncludeNotFound {
            file: filename.to_string(),
            search_path: self.search_path.clone(),
        })
    }

    /// Returns the partial's source, reading the underlying file at most
    /// once per resolved path within a run.
    pub(crate) fn cached_source(&self, path: &Path) -> Result<String> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(source) = cache.get(path) {
            return Ok(source.clone());
        }
        let source = self.reader.read(path)?;
        cache.insert(path.to_path_buf(), source.clone());
        Ok(source)
    }
}

/// One parsed include parameter value: a quoted literal, or a context
/// expression to evaluate where the tag renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParamValue {
    Literal(String),
    Expression(String),
}

/// Greedily matches the parameter grammar; any residue fails closed so a
/// malformed list is never partially applied.
pub(crate) fn parse_params(markup: &str) -> Result<Vec<(String, ParamValue)>> {
    let mut params = Vec::new();
    let mut rest = markup.trim();
    while !rest.is_empty() {
        let Some(caps) = param_re().captures(rest) else {
            return Err(Error::InvalidIncludeSyntax { fragment: rest.to_string() });
        };
        let key = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let value = if let Some(dq) = caps.get(2) {
            ParamValue::Literal(dq.as_str().replace("\\\"", "\""))
        } else if let Some(sq) = caps.get(3) {
            ParamValue::Literal(sq.as_str().replace("\\'", "'"))
        } else if let Some(bare) = caps.get(4) {
            ParamValue::Expression(bare.as_str().to_string())
        } else {
            ParamValue::Literal(String::new())
        };
        params.push((key, value));
        let end = caps.get(0).map(|m| m.end()).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    Ok(params)
}

/// Turns one include tag's markup into the equivalent deferred call.
///
/// Parameter syntax is checked here, while the template is parsed; filename
/// resolution and partial rendering are deferred until the tag actually
/// evaluates, so tags inside untaken branches never touch the filesystem.
pub(crate) fn call_expression(markup: &str) -> Result<String> {
    let (file_part, param_part) = split_markup(markup);
    let filename = filename_expression(&file_part);
    let params = parse_params(&param_part)?;
    if params.is_empty() {
        return Ok(format!("{INCLUDE_FN}({filename})"));
    }
    let entries = params
        .iter()
        .map(|(key, value)| {
            let value = match value {
                ParamValue::Literal(text) => quote_literal(text),
                ParamValue::Expression(expr) => format!("({expr})"),
            };
            format!("{}: {}", quote_literal(key), value)
        })
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("{INCLUDE_FN}({filename}, {{{entries}}})"))
}

/// Splits include markup into the filename part and the parameter markup.
fn split_markup(markup: &str) -> (String, String) {
    let markup = markup.trim();
    if let Some(caps) = variable_filename_re().captures(markup) {
        let variable = caps.name("variable").map(|m| m.as_str()).unwrap_or_default();
        let params = caps.name("params").map(|m| m.as_str()).unwrap_or_default();
        if !variable.is_empty() {
            return (variable.trim().to_string(), params.trim().to_string());
        }
    }
    match markup.split_once(char::is_whitespace) {
        Some((file, params)) => (file.to_string(), params.trim().to_string()),
        None => (markup.to_string(), String::new()),
    }
}

/// Converts the filename part of include markup into an expression that
/// yields the filename at render time. Literal names become string
/// literals; embedded `{{ }}` chunks concatenate with the surrounding text.
fn filename_expression(file_part: &str) -> String {
    if !crate::renderer::contains_template_syntax(file_part) {
        return quote_literal(file_part);
    }
    let mut pieces = Vec::new();
    let mut last = 0;
    for caps in embedded_expression_re().captures_iter(file_part) {
        let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            pieces.push(quote_literal(&file_part[last..whole.start()]));
        }
        pieces.push(format!("({})", expr.as_str()));
        last = whole.end();
    }
    if last < file_part.len() {
        pieces.push(quote_literal(&file_part[last..]));
    }
    pieces.join(" ~ ")
}

fn quote_literal(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

/// The resolved filename must consist only of word characters, separators,
/// dots, and hyphens, with no consecutive `.`/`/` runs.
pub(crate) fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty()
        || invalid_sequence_re().is_match(filename)
        || !valid_filename_re().is_match(filename)
    {
        return Err(Error::InvalidIncludeFilename { file: filename.to_string() });
    }
    Ok(())
}

/// Safe-mode boundary check. Canonicalization failures degrade to "reject"
/// rather than propagating the underlying OS error.
fn realpath_prefixed_with(path: &Path, dir: &Path) -> bool {
    match (path.canonicalize(), dir.canonicalize()) {
        (Ok(real_path), Ok(real_dir)) => real_path.starts_with(&real_dir),
        _ => false,
    }
}
