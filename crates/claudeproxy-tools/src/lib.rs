//! Tool registry for the proxy
//!
//! Owns the curated set of tool definitions offered to the backends in place
//! of whatever the client declared, plus the normalisation applied to
//! tool-call arguments coming back. Schemas follow an "ultra-simple" policy
//! (top-level `object`, primitive property types only, honest `required`, no
//! `additionalProperties`, no unions, no defaults) so that strict backend
//! validators accept them.

mod catalog;
mod normalize;

use std::collections::HashMap;

use serde_json::Value;

pub use normalize::InvalidArgs;

/// Host operating-system family used to template shell-tool descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Unix,
    Darwin,
}

impl OsFamily {
    /// Detect the family of the host this process runs on
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Unix
        }
    }

    /// Parse an override value (`windows`, `unix`, `darwin`)
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "windows" => Some(Self::Windows),
            "unix" => Some(Self::Unix),
            "darwin" => Some(Self::Darwin),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Unix => "unix",
            Self::Darwin => "darwin",
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the registry: the descriptor the backend sees plus the
/// normalisation rules applied to arguments it sends back
#[derive(Debug, Clone)]
pub struct ToolEntry {
    /// Public tool name; the client sees the same name after reverse mapping
    pub name: &'static str,
    /// OS-templated description
    pub description: String,
    /// Ultra-simple JSON Schema for the parameters
    pub parameters: Value,
    /// Properties that are truly mandatory
    pub required: &'static [&'static str],
    /// Argument renames applied to backend output (`incoming -> canonical`)
    pub renames: &'static [(&'static str, &'static str)],
    /// Name of an array property whose elements must be todo-shaped objects
    pub todo_list_property: Option<&'static str>,
}

/// Immutable registry of the tools exposed to a backend
///
/// Construction is deterministic for a given OS family and the entry order is
/// stable; tests depend on both.
pub struct ToolRegistry {
    os: OsFamily,
    entries: Vec<ToolEntry>,
    by_name: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Build the registry for a host OS family
    pub fn for_os(os: OsFamily) -> Self {
        let entries = catalog::entries(os);
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name, i))
            .collect();
        Self { os, entries, by_name }
    }

    /// OS family this registry was templated for
    pub const fn os(&self) -> OsFamily {
        self.os
    }

    /// All entries, in stable catalog order
    pub fn entries(&self) -> &[ToolEntry] {
        &self.entries
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its public name
    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Map a backend-returned tool name to the name the client should see
    ///
    /// Strips the `functions/` prefix some backends prepend; unknown names
    /// pass through unchanged so backend-added tools round-trip.
    pub fn reverse_tool_name<'a>(&self, backend_name: &'a str) -> &'a str {
        let stripped = backend_name.strip_prefix("functions/").unwrap_or(backend_name);
        match self.by_name.get(stripped) {
            Some(&i) => self.entries[i].name,
            None => stripped,
        }
    }

    /// Normalise a tool call coming back from the backend
    ///
    /// Returns the canonical tool name and the rewritten arguments. Unknown
    /// tools pass through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgs`] when a required property is still missing
    /// after renaming and coercion.
    pub fn canonical_args(&self, tool_name: &str, raw_args: Value) -> Result<(String, Value), InvalidArgs> {
        let canonical = self.reverse_tool_name(tool_name);
        let Some(entry) = self.get(canonical) else {
            return Ok((canonical.to_owned(), raw_args));
        };
        let args = normalize::normalize_args(entry, raw_args)?;
        Ok((entry.name.to_owned(), args))
    }
}
