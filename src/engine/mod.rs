//! Contracts for the atomic-CSS engine
//!
//! The language server does not generate CSS or rank suggestions itself. It
//! drives an engine through these traits:
//! - [`UtilityEngine`] generates CSS for utility names
//! - [`AutocompleteFactory`] wraps an engine into an [`AutocompleteSession`]
//! - [`AutocompleteSession`] suggests utilities for a cursor position
//!
//! [`catalog`] and [`matcher`] provide a JSON-configured implementation used by
//! the binary.

pub mod catalog;
pub mod matcher;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use catalog::UtilityCatalog;
pub use matcher::CatalogAutocompleteFactory;

/// Options for [`UtilityEngine::generate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Emit the engine's global base styles
    pub preflights: bool,
    /// Emit utilities the configuration always includes
    pub safelist: bool,
}

impl GenerateOptions {
    /// Only the requested utilities' own rules.
    pub const UTILITIES_ONLY: Self = Self {
        preflights: false,
        safelist: false,
    };
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            preflights: true,
            safelist: true,
        }
    }
}

/// Output of a generation call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateResult {
    pub css: String,
    /// Requested utilities the engine recognized, in request order
    pub matched: Vec<String>,
}

/// Generates CSS for utility names.
#[async_trait]
pub trait UtilityEngine: Send + Sync {
    async fn generate(
        &self,
        utilities: &[&str],
        options: GenerateOptions,
    ) -> anyhow::Result<GenerateResult>;

    /// Every utility name the engine can complete to.
    fn utility_names(&self) -> Vec<String>;
}

/// How an autocomplete session matches the typed fragment against utility names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Prefix,
    Fuzzy,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Prefix => write!(f, "prefix"),
            MatchMode::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Ok(MatchMode::Prefix),
            "fuzzy" => Ok(MatchMode::Fuzzy),
            other => Err(format!("unknown match mode '{other}'")),
        }
    }
}

/// Options passed to [`AutocompleteFactory::create`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutocompleteOptions {
    pub match_mode: MatchMode,
}

/// A ranked suggestion: the value to insert and the label to display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub value: String,
    pub label: String,
}

impl Suggestion {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// The utility text around the cursor that suggestions replace.
///
/// `start` and `end` are byte offsets into the document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFragment {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Half-open byte span `[start, end)` and the text that should replace it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Suggestions for one cursor position, in relevance order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestResult {
    pub suggestions: Vec<Suggestion>,
    pub fragment: InputFragment,
}

impl SuggestResult {
    pub fn empty(offset: usize) -> Self {
        Self {
            suggestions: Vec::new(),
            fragment: InputFragment {
                text: String::new(),
                start: offset,
                end: offset,
            },
        }
    }

    /// The edit that inserts `value` in place of the input fragment.
    pub fn resolve_replacement(&self, value: &str) -> Replacement {
        Replacement {
            start: self.fragment.start,
            end: self.fragment.end,
            text: value.to_string(),
        }
    }
}

/// An engine-backed suggestion source with a fixed match mode
#[async_trait]
pub trait AutocompleteSession: Send + Sync {
    /// Suggests utilities for the fragment around byte `offset` of `text`.
    async fn suggest_in_file(&self, text: &str, offset: usize) -> anyhow::Result<SuggestResult>;
}

/// Builds autocomplete sessions for an engine.
pub trait AutocompleteFactory: Send + Sync {
    fn create(
        &self,
        engine: Arc<dyn UtilityEngine>,
        options: AutocompleteOptions,
    ) -> Arc<dyn AutocompleteSession>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_mode_parsing() {
        assert_eq!("prefix".parse::<MatchMode>(), Ok(MatchMode::Prefix));
        assert_eq!(" Fuzzy ".parse::<MatchMode>(), Ok(MatchMode::Fuzzy));
        assert!("regex".parse::<MatchMode>().is_err());
        assert_eq!(MatchMode::Fuzzy.to_string(), "fuzzy");
    }

    #[test]
    fn test_resolve_replacement_spans_fragment() {
        let result = SuggestResult {
            suggestions: vec![Suggestion::new("p-1", "p-1")],
            fragment: InputFragment {
                text: "p-".to_string(),
                start: 12,
                end: 14,
            },
        };
        assert_eq!(
            result.resolve_replacement("p-1"),
            Replacement {
                start: 12,
                end: 14,
                text: "p-1".to_string()
            }
        );
    }
}
