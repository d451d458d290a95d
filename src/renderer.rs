//! Template parsing and rendering for docpipe.
//! Wraps a MiniJinja environment with the pipeline's custom filters and
//! rewrites `include`/`inc` tags into deferred partial calls evaluated
//! during rendering.

use crate::error::{Error, Result};
use crate::include::{self, IncludeResolver};
use crate::scope::{ScopedContext, INCLUDE_SCOPE};
use minijinja::{Environment, ErrorKind, State};
use regex::Regex;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

fn include_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{%(-?)\s*(?:include|inc)\s+(.*?)\s*(-?)%\}").expect("static pattern")
    })
}

/// Returns whether a text carries template syntax at all. The pipeline uses
/// this to decide whether a manifest needs pre-rendering before parsing.
pub fn contains_template_syntax(text: &str) -> bool {
    text.contains("{{") || text.contains("{%")
}

/// Trait for template rendering engines.
pub trait TemplateEngine {
    /// Renders a template string with the given scoped context.
    fn render(&self, template: &str, context: &ScopedContext) -> Result<String>;
}

/// State shared between the renderer and the deferred include calls
/// registered on the environment. The context stack tracks the innermost
/// active render so a partial sees its caller's variables; the pending slot
/// carries typed errors across the MiniJinja boundary.
struct RenderState {
    resolver: IncludeResolver,
    context_stack: Mutex<Vec<ScopedContext>>,
    pending: Mutex<Option<Error>>,
}

impl RenderState {
    fn stack(&self) -> MutexGuard<'_, Vec<ScopedContext>> {
        self.context_stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_context(&self) -> ScopedContext {
        self.stack().last().cloned().unwrap_or_default()
    }

    fn set_pending(&self, err: Error) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    fn take_pending(&self) -> Option<Error> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// MiniJinja-based template rendering engine with include support.
pub struct MiniJinjaRenderer {
    env: Environment<'static>,
    shared: Arc<RenderState>,
}

impl MiniJinjaRenderer {
    /// Creates an engine around an include resolver, registering the
    /// pipeline's custom filters and the deferred include call.
    pub fn new(resolver: IncludeResolver) -> Self {
        let shared = Arc::new(RenderState {
            resolver,
            context_stack: Mutex::new(Vec::new()),
            pending: Mutex::new(None),
        });
        let mut env = Environment::new();
        env.add_filter("slugify", slugify);
        env.add_filter("cli_args", cli_args);
        let handle = Arc::clone(&shared);
        env.add_function(
            include::INCLUDE_FN,
            move |state: &State, filename: String, params: Option<minijinja::Value>| {
                render_partial(&handle, state, &filename, params).map_err(|err| {
                    let message = err.to_string();
                    handle.set_pending(err);
                    minijinja::Error::new(ErrorKind::InvalidOperation, message)
                })
            },
        );
        Self { env, shared }
    }
}

/// Resolves and renders one include call against the innermost active
/// render context, with the call's parameters under the `include` namespace.
fn render_partial(
    shared: &Arc<RenderState>,
    state: &State,
    filename: &str,
    params: Option<minijinja::Value>,
) -> Result<String> {
    include::validate_filename(filename)?;
    let path = shared.resolver.locate(filename)?;
    let source = shared.resolver.cached_source(&path)?;

    // Child layer over the caller's context; popped when rendering ends.
    let mut child = shared.current_context();
    if let Some(params) = params {
        let payload = serde_json::to_value(&params)?;
        if payload.is_object() {
            child.merge(&payload, INCLUDE_SCOPE);
        }
    }

    let rewritten = rewrite_include_tags(&source)?;
    shared.stack().push(child.clone());
    let result = state.env().render_str(&rewritten, child.snapshot());
    shared.stack().pop();
    result.map_err(|render_err| match shared.take_pending() {
        // Nested includes report the innermost failure site.
        Some(annotated @ Error::IncludeRender { .. }) => annotated,
        Some(other) => Error::IncludeRender { path, source: Box::new(other) },
        None => Error::IncludeRender {
            path,
            source: Box::new(Error::MinijinjaError(render_err)),
        },
    })
}

/// Rewrites every `{% include %}` / `{% inc %}` tag into a deferred call
/// sitting where the tag sat, preserving whitespace-control markers. The
/// call returns the rendered partial as a final string value, so partial
/// output is never re-parsed as template source.
fn rewrite_include_tags(template: &str) -> Result<String> {
    if !template.contains("{%") {
        return Ok(template.to_string());
    }
    let mut out = String::new();
    let mut last = 0;
    for caps in include_tag_re().captures_iter(template) {
        let (Some(whole), Some(markup)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let lead = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let trail = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        out.push_str(&template[last..whole.start()]);
        let call = include::call_expression(markup.as_str())?;
        out.push_str(&format!("{{{{{lead} {call} {trail}}}}}"));
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

impl TemplateEngine for MiniJinjaRenderer {
    /// Renders a template string, evaluating include tags only where the
    /// template's control flow reaches them.
    fn render(&self, template: &str, context: &ScopedContext) -> Result<String> {
        let rewritten = rewrite_include_tags(template)?;
        self.shared.take_pending();
        self.shared.stack().push(context.clone());
        let result = self.env.render_str(&rewritten, context.snapshot());
        self.shared.stack().pop();
        result.map_err(|err| match self.shared.take_pending() {
            Some(typed) => typed,
            None => Error::MinijinjaError(err),
        })
    }
}

/// Produces a lowercase, punctuation-collapsed, hyphen-trimmed slug.
fn slugify(value: String) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_hyphen = false;
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Formats a key-value map as a CLI argument string.
///
/// `format` selects a per-pair template: the presets `flags` (`--key value`),
/// `short` (`-k value`), `assign` (`key=value`), and `value` (value only),
/// or any custom template with `{key}`/`{value}` placeholders. Pairs are
/// joined with `delimiter` (default a single space).
fn cli_args(
    value: minijinja::Value,
    format: Option<String>,
    delimiter: Option<String>,
) -> std::result::Result<String, minijinja::Error> {
    let pair_template = match format.as_deref() {
        None | Some("flags") => "--{key} {value}",
        Some("short") => "-{key} {value}",
        Some("assign") => "{key}={value}",
        Some("value") => "{value}",
        Some(custom) => custom,
    };
    let delimiter = delimiter.unwrap_or_else(|| " ".to_string());

    let mut pairs = Vec::new();
    for key in value.try_iter()? {
        let item = value.get_item(&key)?;
        pairs.push(
            pair_template
                .replace("{key}", &key.to_string())
                .replace("{value}", &item.to_string()),
        );
    }
    Ok(pairs.join(&delimiter))
}
