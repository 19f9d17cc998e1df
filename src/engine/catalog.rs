//! JSON-configured utility catalog
//!
//! A project describes its utilities in a `utility-css.json` file:
//!
//! ```json
//! {
//!   "utilities": {
//!     "p-1": "padding: 0.25rem;",
//!     "text-red-500": "--un-text-opacity: 1; color: rgba(248, 113, 113, var(--un-text-opacity));"
//!   },
//!   "preflights": "*, ::before, ::after { box-sizing: border-box; }",
//!   "safelist": ["p-1"],
//!   "variants": { "hover": ":hover" },
//!   "include": ["\\.(html|vue)$"],
//!   "exclude": ["[\\\\/]node_modules[\\\\/]"]
//! }
//! ```
//!
//! [`UtilityCatalog`] turns the utility part of that file into a
//! [`UtilityEngine`]. `include`/`exclude` are read by the context loader.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use super::{GenerateOptions, GenerateResult, UtilityEngine};

/// Pseudo-class variants available when a catalog does not declare its own.
const DEFAULT_VARIANTS: &[(&str, &str)] = &[
    ("hover", ":hover"),
    ("focus", ":focus"),
    ("focus-within", ":focus-within"),
    ("active", ":active"),
    ("visited", ":visited"),
    ("disabled", ":disabled"),
    ("first", ":first-child"),
    ("last", ":last-child"),
    ("odd", ":nth-child(odd)"),
    ("even", ":nth-child(even)"),
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// On-disk project configuration
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogConfig {
    pub utilities: BTreeMap<String, String>,
    pub preflights: Option<String>,
    pub safelist: Vec<String>,
    pub variants: Option<BTreeMap<String, String>>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

impl CatalogConfig {
    pub fn from_json(path: &Path, json: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(json).map_err(|source| CatalogError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(path, &json)
    }
}

/// Utility definitions keyed by name
#[derive(Debug, Clone)]
pub struct UtilityCatalog {
    utilities: BTreeMap<String, String>,
    preflights: String,
    safelist: Vec<String>,
    variants: BTreeMap<String, String>,
}

impl Default for UtilityCatalog {
    fn default() -> Self {
        Self::from_config(&CatalogConfig::default())
    }
}

impl UtilityCatalog {
    pub fn from_config(config: &CatalogConfig) -> Self {
        let variants = config.variants.clone().unwrap_or_else(|| {
            DEFAULT_VARIANTS
                .iter()
                .map(|(name, pseudo)| (name.to_string(), pseudo.to_string()))
                .collect()
        });
        Self {
            utilities: config.utilities.clone(),
            preflights: config.preflights.clone().unwrap_or_default(),
            safelist: config.safelist.clone(),
            variants,
        }
    }

    pub fn len(&self) -> usize {
        self.utilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utilities.is_empty()
    }

    /// Builds the rule for `name`, which may carry `variant:` prefixes.
    /// Returns `None` for unknown utilities or variants.
    pub fn rule_for(&self, name: &str) -> Option<String> {
        let mut parts: Vec<&str> = name.split(':').collect();
        let base = parts.pop()?;
        let declarations = self.utilities.get(base)?;

        let mut pseudo = String::new();
        for variant in parts {
            pseudo.push_str(self.variants.get(variant)?);
        }

        let declarations = declarations.trim();
        let terminated = declarations.is_empty() || declarations.ends_with(';');
        let terminator = if terminated { "" } else { ";" };
        Some(format!(
            ".{}{}{{{}{}}}",
            escape_selector(name),
            pseudo,
            declarations,
            terminator
        ))
    }
}

#[async_trait]
impl UtilityEngine for UtilityCatalog {
    async fn generate(
        &self,
        utilities: &[&str],
        options: GenerateOptions,
    ) -> anyhow::Result<GenerateResult> {
        let mut requested: Vec<&str> = utilities.to_vec();
        if options.safelist {
            requested.extend(self.safelist.iter().map(String::as_str));
        }

        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        let mut rules = Vec::new();
        for name in requested {
            if !seen.insert(name) {
                continue;
            }
            if let Some(rule) = self.rule_for(name) {
                matched.push(name.to_string());
                rules.push(rule);
            }
        }

        let mut css = String::new();
        let preflights = self.preflights.trim();
        if options.preflights && !preflights.is_empty() {
            css.push_str("/* layer: preflights */\n");
            css.push_str(preflights);
            css.push('\n');
        }
        if !rules.is_empty() {
            css.push_str("/* layer: default */\n");
            css.push_str(&rules.join("\n"));
        }

        Ok(GenerateResult {
            css: css.trim_end().to_string(),
            matched,
        })
    }

    fn utility_names(&self) -> Vec<String> {
        self.utilities.keys().cloned().collect()
    }
}

/// Escapes a class name for use in a selector: `hover:w-1/2` → `hover\:w-1\/2`.
pub fn escape_selector(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 4);
    for (index, ch) in name.chars().enumerate() {
        if index == 0 && ch.is_ascii_digit() {
            escaped.push_str(&format!("\\{:x} ", ch as u32));
        } else if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii() {
            escaped.push(ch);
        } else {
            escaped.push('\\');
            escaped.push(ch);
        }
    }
    escaped
}
