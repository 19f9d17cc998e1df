//! Which files a context applies to

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::catalog::CatalogError;

/// Files containing this marker are accepted whatever their path.
pub const INCLUDE_MARKER: &str = "@utility-css-include";

pub const DEFAULT_INCLUDE: &str = r"\.(vue|svelte|[jt]sx|mdx?|astro|elm|php|phtml|html)($|\?)";
pub const DEFAULT_EXCLUDE: &str = r"[\\/](node_modules|\.git)[\\/]";

static DEFAULT_FILTER: Lazy<FileFilter> = Lazy::new(|| FileFilter {
    include: vec![Regex::new(DEFAULT_INCLUDE).expect("default include pattern is valid")],
    exclude: vec![Regex::new(DEFAULT_EXCLUDE).expect("default exclude pattern is valid")],
});

/// Include/exclude patterns over file paths
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl Default for FileFilter {
    fn default() -> Self {
        DEFAULT_FILTER.clone()
    }
}

impl FileFilter {
    /// Compiles the given patterns. A missing list falls back to the default
    /// patterns for that side.
    pub fn new(
        include: Option<&[String]>,
        exclude: Option<&[String]>,
    ) -> Result<Self, CatalogError> {
        let defaults = &*DEFAULT_FILTER;
        Ok(Self {
            include: match include {
                Some(patterns) => compile(patterns)?,
                None => defaults.include.clone(),
            },
            exclude: match exclude {
                Some(patterns) => compile(patterns)?,
                None => defaults.exclude.clone(),
            },
        })
    }

    pub fn accepts(&self, text: &str, path: &Path) -> bool {
        if text.contains(INCLUDE_MARKER) {
            return true;
        }
        let path = path.to_string_lossy();
        !self.exclude.iter().any(|pattern| pattern.is_match(&path))
            && self.include.iter().any(|pattern| pattern.is_match(&path))
    }

    /// True when `path` hits an exclude pattern.
    pub fn excludes(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.exclude.iter().any(|pattern| pattern.is_match(&path))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, CatalogError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| CatalogError::Pattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let filter = FileFilter::default();
        assert!(filter.accepts("", Path::new("/w/src/App.vue")));
        assert!(filter.accepts("", Path::new("/w/src/page.tsx")));
        assert!(filter.accepts("", Path::new("/w/docs/index.md")));
        assert!(filter.accepts("", Path::new("/w/src/App.vue?vue&type=template")));
        assert!(!filter.accepts("", Path::new("/w/src/main.rs")));
        assert!(!filter.accepts("", Path::new("/w/node_modules/pkg/index.html")));
    }

    #[test]
    fn test_marker_overrides_patterns() {
        let filter = FileFilter::default();
        let text = "// @utility-css-include\nconst a = 'p-1';";
        assert!(filter.accepts(text, Path::new("/w/src/main.rs")));
        assert!(filter.accepts(text, Path::new("/w/node_modules/x.js")));
    }

    #[test]
    fn test_custom_patterns() {
        let include = vec![r"\.rs$".to_string()];
        let filter = FileFilter::new(Some(&include), None).unwrap();
        assert!(filter.accepts("", Path::new("/w/src/view.rs")));
        assert!(!filter.accepts("", Path::new("/w/src/App.vue")));
        assert!(filter.excludes(Path::new("/w/.git/config")));
    }

    #[test]
    fn test_invalid_pattern() {
        let exclude = vec!["(".to_string()];
        let err = FileFilter::new(None, Some(&exclude)).unwrap_err();
        assert!(matches!(err, CatalogError::Pattern { .. }));
    }
}
