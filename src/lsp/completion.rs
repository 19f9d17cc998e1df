//! Suggestion pipeline
//!
//! For one document and cursor offset:
//! 1. reject paths outside the working root
//! 2. resolve the context (exact first, closest as a fallback)
//! 3. reject files the context does not apply to, unless they are stylesheets
//! 4. ask the context's session for suggestions and keep the first `max_items`
//! 5. turn each into a [`UtilityCandidate`] with its replacement span and,
//!    outside simple mode, its color
//!
//! Failures after step 1 are logged and reported as no completions. Markdown
//! previews are built one candidate at a time by [`CompletionPipeline::describe`].

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, error, trace};

use super::config::Settings;
use super::languages::is_stylesheet;
use super::session_cache::SessionCache;
use crate::context::{Context, ContextResolver};
use crate::css::{CssFormatter, build_preview, generate_css, resolve_color, to_markdown};
use crate::engine::Replacement;

/// Color labels ending in a shade number, e.g. `text-red-500`.
static SHADE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\d+$").expect("shade pattern is valid"));

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("replacement [{start}, {end}) is outside the document ({len} bytes)")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("replacement start {start} is after its end {end}")]
    Inverted { start: usize, end: usize },

    #[error("replacement [{start}, {end}) does not fall on character boundaries")]
    NotCharBoundary { start: usize, end: usize },

    #[error("failed to resolve context: {0:#}")]
    Context(anyhow::Error),

    #[error("engine failed: {0:#}")]
    Engine(anyhow::Error),
}

/// A completion request for one cursor position
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub path: &'a Path,
    pub text: &'a str,
    /// Byte offset of the cursor in `text`
    pub offset: usize,
    pub working_root: Option<&'a Path>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub max_items: usize,
    pub rem_to_px_ratio: f64,
    pub simple_mode: bool,
}

impl From<&Settings> for CompletionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_items: settings.max_items,
            rem_to_px_ratio: settings.effective_ratio(),
            simple_mode: settings.simple_mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Utility,
    Color,
}

/// A suggestion with everything derived from it for the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilityCandidate {
    pub value: String,
    pub label: String,
    pub replacement: Replacement,
    pub kind: CandidateKind,
    pub color: Option<String>,
    /// Orders shade colors ahead of other colors; `None` for non-colors.
    pub sort_text: Option<String>,
}

pub struct CompletionPipeline {
    resolver: Arc<dyn ContextResolver>,
    sessions: Arc<SessionCache>,
    formatter: Arc<dyn CssFormatter>,
}

impl CompletionPipeline {
    pub fn new(
        resolver: Arc<dyn ContextResolver>,
        sessions: Arc<SessionCache>,
        formatter: Arc<dyn CssFormatter>,
    ) -> Self {
        Self {
            resolver,
            sessions,
            formatter,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// Ordered candidates for the request, `Some(vec![])` when the engine has
    /// nothing to offer and `None` when the request is out of scope or failed.
    pub async fn complete(
        &self,
        request: &CompletionRequest<'_>,
        options: CompletionOptions,
    ) -> Option<Vec<UtilityCandidate>> {
        if !within_root(request) {
            debug!("{} is outside the working root", request.path.display());
            return None;
        }

        match self.try_complete(request, options).await {
            Ok(candidates) => candidates,
            Err(err) => {
                error!("Completion failed for {}: {:#}", request.path.display(), err);
                None
            }
        }
    }

    async fn try_complete(
        &self,
        request: &CompletionRequest<'_>,
        options: CompletionOptions,
    ) -> Result<Option<Vec<UtilityCandidate>>, CompletionError> {
        let context = self.locate_context(request).await?;
        if !context.accepts(request.text, request.path) && !is_stylesheet(request.path) {
            trace!("{} does not apply to {}", context.id, request.path.display());
            return Ok(None);
        }

        let session = self.sessions.get(&context);
        let result = session
            .suggest_in_file(request.text, request.offset)
            .await
            .map_err(CompletionError::Engine)?;
        if result.suggestions.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let mut candidates = Vec::with_capacity(result.suggestions.len().min(options.max_items));
        for suggestion in result.suggestions.iter().take(options.max_items) {
            let replacement = result.resolve_replacement(&suggestion.value);
            validate_replacement(&replacement, request.text)?;

            let mut candidate = UtilityCandidate {
                value: suggestion.value.clone(),
                label: suggestion.label.clone(),
                replacement,
                kind: CandidateKind::Utility,
                color: None,
                sort_text: None,
            };

            if !options.simple_mode {
                let generated = generate_css(context.engine.as_ref(), &suggestion.value)
                    .await
                    .map_err(CompletionError::Engine)?;
                if let Some(color) = resolve_color(&generated.css) {
                    candidate.kind = CandidateKind::Color;
                    candidate.sort_text = Some(color_sort_text(&suggestion.label).to_string());
                    candidate.color = Some(color);
                }
            }

            candidates.push(candidate);
        }

        debug!(
            "{} candidate(s) for {} at {}",
            candidates.len(),
            request.path.display(),
            request.offset
        );
        Ok(Some(candidates))
    }

    /// Markdown preview for one candidate value. `None` in simple mode, when
    /// the engine generates nothing for the value, or on failure.
    pub async fn describe(
        &self,
        request: &CompletionRequest<'_>,
        value: &str,
        options: CompletionOptions,
    ) -> Option<String> {
        if options.simple_mode || !within_root(request) {
            return None;
        }

        let result = async {
            let context = self.locate_context(request).await?;
            let preview = build_preview(
                context.engine.as_ref(),
                self.formatter.as_ref(),
                value,
                options.rem_to_px_ratio,
            )
            .await?;
            anyhow::Ok(preview)
        }
        .await;

        match result {
            Ok(preview) if preview.result.css.is_empty() => None,
            Ok(preview) => Some(to_markdown(&preview.prettified)),
            Err(err) => {
                error!("Preview failed for '{}' in {}: {:#}", value, request.path.display(), err);
                None
            }
        }
    }

    async fn locate_context(
        &self,
        request: &CompletionRequest<'_>,
    ) -> Result<Arc<Context>, CompletionError> {
        let exact = self
            .resolver
            .resolve(request.text, request.path)
            .await
            .map_err(CompletionError::Context)?;
        match exact {
            Some(context) => Ok(context),
            None => self
                .resolver
                .resolve_closest(request.text, request.path)
                .await
                .map_err(CompletionError::Context),
        }
    }
}

fn within_root(request: &CompletionRequest<'_>) -> bool {
    request
        .working_root
        .is_none_or(|root| request.path.starts_with(root))
}

fn color_sort_text(label: &str) -> &'static str {
    if SHADE_SUFFIX.is_match(label) { "1" } else { "2" }
}

fn validate_replacement(replacement: &Replacement, text: &str) -> Result<(), CompletionError> {
    let (start, end) = (replacement.start, replacement.end);
    if start > end {
        return Err(CompletionError::Inverted { start, end });
    }
    if end > text.len() {
        return Err(CompletionError::OutOfBounds {
            start,
            end,
            len: text.len(),
        });
    }
    if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
        return Err(CompletionError::NotCharBoundary { start, end });
    }
    Ok(())
}
