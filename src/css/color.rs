//! Color extraction from generated CSS
//!
//! Finds the first color literal in a block of CSS and inlines any custom
//! property references it contains, using the declarations found in the same
//! block. This is a pattern heuristic rather than a CSS parser: a string counts
//! as a color when it matches [`COLOR_LITERAL`], nothing more.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Hex (`#rgb`, `#rrggbb`, `0x` forms) or functional (`rgb[a]`, `hsl[a]`) colors.
///
/// The functional branch is greedy up to the last `)` on the line so that
/// nested `var(...)` arguments stay inside the literal.
static COLOR_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:#|0x)(?:[0-9a-f]{3}){1,2}\b|(?:rgb|hsl)a?\(.*\)")
        .expect("color literal pattern is valid")
});

/// `--name: value;` declarations. The value stops at the first `!` or `;`.
static VARIABLE_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(--[\w-]+)\s*:\s*([^!;]*?)\s*[!;]").expect("declaration pattern is valid")
});

/// `var(--name)` or `var(--name, fallback)`.
static VARIABLE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"var\(\s*(--[\w-]+)\s*(?:,\s*([^)]*?))?\s*\)").expect("reference pattern is valid")
});

/// Custom property values declared in one CSS block.
///
/// Built per call and thrown away afterwards.
#[derive(Debug, Default)]
pub struct VariableTable {
    values: HashMap<String, String>,
}

impl VariableTable {
    /// Scans the whole block for custom property declarations. Later
    /// declarations of the same name win.
    pub fn scan(css: &str) -> Self {
        let values = VARIABLE_DECLARATION
            .captures_iter(css)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect();
        Self { values }
    }

    /// Returns the declared value, treating an empty value as undeclared.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Extracts the first color literal in `css` with its `var(...)` references
/// resolved, or `None` when the block contains no color.
pub fn resolve_color(css: &str) -> Option<String> {
    let literal = COLOR_LITERAL.find(css)?.as_str();
    if !literal.contains("var(") {
        return Some(literal.to_string());
    }

    let variables = VariableTable::scan(css);
    Some(substitute_references(literal, &variables))
}

/// Replaces each `var(...)` in `literal`, left to right, with its declared
/// value, then its fallback. References with neither are dropped together with
/// the separator that tied them to the argument list.
fn substitute_references(literal: &str, variables: &VariableTable) -> String {
    let mut resolved = String::with_capacity(literal.len());
    let mut cursor = 0;

    for caps in VARIABLE_REFERENCE.captures_iter(literal) {
        let Some(whole) = caps.get(0) else { continue };
        resolved.push_str(&literal[cursor..whole.start()]);
        cursor = whole.end();

        let name = &caps[1];
        let fallback = caps
            .get(2)
            .map(|m| m.as_str().trim())
            .filter(|fallback| !fallback.is_empty());

        if let Some(value) = variables.get(name) {
            resolved.push_str(value);
        } else if let Some(fallback) = fallback {
            resolved.push_str(fallback);
        } else {
            let kept = resolved.trim_end().len();
            resolved.truncate(kept);
            if resolved.ends_with(is_separator) {
                resolved.pop();
                let kept = resolved.trim_end().len();
                resolved.truncate(kept);
            } else if resolved.ends_with('(') {
                // First argument: drop the separator that follows instead.
                let rest = literal[cursor..].trim_start();
                let rest = rest.strip_prefix(is_separator).unwrap_or(rest);
                cursor = literal.len() - rest.trim_start().len();
            }
        }
    }

    resolved.push_str(&literal[cursor..]);
    resolved
}

/// Argument separators of color functions, legacy (`,`) and alpha (`/`).
fn is_separator(ch: char) -> bool {
    ch == ',' || ch == '/'
}
