//! Language identifiers the server attaches to

use std::collections::BTreeSet;
use std::path::Path;

/// Documents with these language ids get completions out of the box.
pub const DEFAULT_LANGUAGE_IDS: &[&str] = &[
    "erb",
    "haml",
    "hbs",
    "html",
    "css",
    "postcss",
    "javascript",
    "javascriptreact",
    "markdown",
    "ejs",
    "php",
    "svelte",
    "typescript",
    "typescriptreact",
    "vue-html",
    "vue",
    "sass",
    "scss",
    "less",
    "stylus",
    "astro",
    "rust",
];

/// Further ids editors are known to report, accepted in `languageIds`.
const KNOWN_LANGUAGE_IDS: &[&str] = &[
    "blade",
    "clojure",
    "django-html",
    "edge",
    "elixir",
    "elm",
    "glimmer-js",
    "glimmer-ts",
    "go",
    "gohtml",
    "handlebars",
    "heex",
    "htmldjango",
    "jade",
    "jinja",
    "liquid",
    "mdx",
    "nunjucks",
    "ocaml",
    "pug",
    "razor",
    "rescript",
    "sugarss",
    "surface",
    "templ",
    "twig",
    "vue-postcss",
];

const STYLESHEET_EXTENSIONS: &[&str] =
    &["css", "postcss", "pcss", "sass", "scss", "less", "stylus", "styl"];

pub fn is_known_language(id: &str) -> bool {
    DEFAULT_LANGUAGE_IDS.contains(&id) || KNOWN_LANGUAGE_IDS.contains(&id)
}

/// Splits configured ids into those accepted and those not recognized,
/// preserving order and dropping duplicates.
pub fn validate_language_ids(ids: &[String]) -> (Vec<String>, Vec<String>) {
    let mut seen = BTreeSet::new();
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for id in ids {
        let id = id.trim();
        if id.is_empty() || !seen.insert(id) {
            continue;
        }
        if is_known_language(id) {
            valid.push(id.to_string());
        } else {
            invalid.push(id.to_string());
        }
    }
    (valid, invalid)
}

/// Default ids plus the valid extra ids.
pub fn effective_language_ids(extra: &[String]) -> BTreeSet<String> {
    let (valid, _) = validate_language_ids(extra);
    DEFAULT_LANGUAGE_IDS
        .iter()
        .map(|id| id.to_string())
        .chain(valid)
        .collect()
}

pub fn is_stylesheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| STYLESHEET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
