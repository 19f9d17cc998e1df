//! Autocomplete sessions over an engine's utility names
//!
//! - Prefix mode: names starting with the typed fragment, shortest first
//! - Fuzzy mode: prefix matches, then names within a small Levenshtein
//!   distance of the fragment (liblevenshtein `DynamicDawg` + `Transducer`)
//!
//! A `variant:` prefix in the fragment (`hover:p-`) is kept verbatim and the
//! remainder is matched against the utility names.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use liblevenshtein::prelude::{Algorithm, DynamicDawg, Transducer};
use tracing::trace;

use super::{
    AutocompleteFactory, AutocompleteOptions, AutocompleteSession, InputFragment, MatchMode,
    SuggestResult, Suggestion, UtilityEngine,
};

/// Fuzzy matching is skipped for fragments shorter than this.
const FUZZY_MIN_QUERY_LEN: usize = 3;

/// Builds [`CatalogSession`]s from [`UtilityEngine::utility_names`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogAutocompleteFactory;

impl AutocompleteFactory for CatalogAutocompleteFactory {
    fn create(
        &self,
        engine: Arc<dyn UtilityEngine>,
        options: AutocompleteOptions,
    ) -> Arc<dyn AutocompleteSession> {
        Arc::new(CatalogSession::new(engine.utility_names(), options.match_mode))
    }
}

/// Suggestion source over a fixed list of utility names
pub struct CatalogSession {
    /// Sorted shortest first, then alphabetically
    names: Vec<String>,
    dictionary: DynamicDawg<()>,
    match_mode: MatchMode,
}

impl CatalogSession {
    pub fn new(mut names: Vec<String>, match_mode: MatchMode) -> Self {
        names.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        names.dedup();

        let mut dictionary: DynamicDawg<()> = DynamicDawg::new();
        if match_mode == MatchMode::Fuzzy {
            for name in &names {
                dictionary.insert(name.as_str());
            }
        }

        Self {
            names,
            dictionary,
            match_mode,
        }
    }

    /// Utility names matching `query`, best first.
    pub fn matches(&self, query: &str) -> Vec<String> {
        if query.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<String> = self
            .names
            .iter()
            .filter(|name| name.starts_with(query))
            .cloned()
            .collect();

        if self.match_mode == MatchMode::Fuzzy && query.chars().count() >= FUZZY_MIN_QUERY_LEN {
            let max_distance = (query.chars().count() / 4).clamp(1, 2);
            let seen: HashSet<String> = results.iter().cloned().collect();

            let transducer = Transducer::new(self.dictionary.clone(), Algorithm::Standard);
            let mut fuzzy: Vec<(usize, String)> = transducer
                .query_with_distance(query, max_distance)
                .filter(|candidate| !seen.contains(&candidate.term))
                .map(|candidate| (candidate.distance, candidate.term))
                .collect();
            fuzzy.sort_by(|(da, a), (db, b)| {
                da.cmp(db)
                    .then_with(|| a.len().cmp(&b.len()))
                    .then_with(|| a.cmp(b))
            });
            results.extend(fuzzy.into_iter().map(|(_, term)| term));
        }

        results
    }
}

#[async_trait]
impl AutocompleteSession for CatalogSession {
    async fn suggest_in_file(&self, text: &str, offset: usize) -> anyhow::Result<SuggestResult> {
        let fragment = fragment_at(text, offset);
        if fragment.text.is_empty() {
            return Ok(SuggestResult {
                suggestions: Vec::new(),
                fragment,
            });
        }

        let (variants, query) = match fragment.text.rfind(':') {
            Some(index) => fragment.text.split_at(index + 1),
            None => ("", fragment.text.as_str()),
        };

        let suggestions: Vec<Suggestion> = self
            .matches(query)
            .into_iter()
            .map(|name| {
                let value = format!("{variants}{name}");
                Suggestion::new(value.clone(), value)
            })
            .collect();

        trace!(
            "{} {} suggestion(s) for '{}'",
            self.match_mode,
            suggestions.len(),
            fragment.text
        );

        Ok(SuggestResult {
            suggestions,
            fragment,
        })
    }
}

fn is_utility_char(ch: char) -> bool {
    !ch.is_whitespace()
        && !matches!(
            ch,
            '"' | '\'' | '`' | '<' | '>' | '{' | '}' | '(' | ')' | '=' | ';' | ','
        )
}

/// The run of utility characters around byte `offset`.
///
/// `text` of the result is the part before the cursor; `end` extends over the
/// rest of the token so a replacement overwrites it entirely.
pub fn fragment_at(text: &str, offset: usize) -> InputFragment {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }

    let start = text[..offset]
        .char_indices()
        .rev()
        .take_while(|(_, ch)| is_utility_char(*ch))
        .last()
        .map_or(offset, |(index, _)| index);
    let end = offset
        + text[offset..]
            .chars()
            .take_while(|ch| is_utility_char(*ch))
            .map(char::len_utf8)
            .sum::<usize>();

    InputFragment {
        text: text[start..offset].to_string(),
        start,
        end,
    }
}
