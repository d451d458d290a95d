//! Layered variable scoping for render contexts.
//! A ScopedContext merges root, `vars`, `data`, and per-source named scopes
//! into the single namespace handed to the template engine.

use log::warn;
use serde_json::{Map, Value};

/// The distinguished scope whose values are visible without a prefix.
pub const ROOT_SCOPE: &str = "";

/// Scope holding CLI/manifest-supplied key-value overrides.
pub const VARS_SCOPE: &str = "vars";

/// Scope holding the raw payload when exactly one data source is active.
pub const DATA_SCOPE: &str = "data";

/// Scope holding include-tag parameters inside a partial.
pub const INCLUDE_SCOPE: &str = "include";

/// Scope names a root-level flat merge must never clobber.
const RESERVED_SCOPES: &[&str] = &[VARS_SCOPE, DATA_SCOPE, INCLUDE_SCOPE];

/// Recursively merges `src` into `dst`, right-biased on key conflicts.
/// Recursion only descends through nested maps; any other value kind
/// (lists included) is replaced wholesale.
pub fn deep_merge(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (key, src_val) in src_map {
                match dst_map.get_mut(key) {
                    Some(dst_val) => deep_merge(dst_val, src_val),
                    None => {
                        dst_map.insert(key.clone(), src_val.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

/// The merged namespace handed to the template engine.
///
/// Scopes are top-level keys of a single map; the root scope's entries sit
/// directly at the top level, so a fully-qualified dotted lookup such as
/// `vars.siteTitle` always resolves against the last merged state.
#[derive(Debug, Clone, Default)]
pub struct ScopedContext {
    scopes: Map<String, Value>,
}

impl ScopedContext {
    pub fn new() -> Self {
        Self { scopes: Map::new() }
    }

    /// Merges `value` into the context under `scope`.
    ///
    /// The root scope is a flat merge: each top-level key of a map value
    /// replaces any existing root key of the same name. A named scope merges
    /// recursively, right-biased, with one asymmetry: when both the existing
    /// scope value and the incoming value are lists, the incoming records
    /// are appended. A second `data`-scope load must extend the first, not
    /// silently replace it.
    pub fn merge(&mut self, value: &Value, scope: &str) {
        if scope == ROOT_SCOPE {
            if let Value::Object(map) = value {
                for (key, val) in map {
                    if RESERVED_SCOPES.contains(&key.as_str()) {
                        warn!(
                            "Top-level data key '{key}' collides with a reserved scope; \
                             it stays reachable under '{DATA_SCOPE}' only"
                        );
                        continue;
                    }
                    self.scopes.insert(key.clone(), val.clone());
                }
            }
            return;
        }

        match self.scopes.get_mut(scope) {
            Some(Value::Array(existing)) if value.is_array() => {
                if let Value::Array(incoming) = value {
                    existing.extend(incoming.iter().cloned());
                }
            }
            Some(existing) => deep_merge(existing, value),
            None => {
                self.scopes.insert(scope.to_string(), value.clone());
            }
        }
    }

    /// Removes a scope. Removing an absent scope is a no-op.
    pub fn remove(&mut self, scope: &str) {
        self.scopes.remove(scope);
    }

    /// Returns the combined namespace as a read-only render value.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.scopes.clone())
    }

    /// Resolves a dotted path (`vars.siteTitle`) against the current state.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.scopes.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
