//! CSS previews for completion candidates

use tracing::trace;

use super::formatter::CssFormatter;
use super::units::annotate_rem;
use crate::engine::{GenerateOptions, GenerateResult, UtilityEngine};

/// Generated CSS for one utility, raw and prettified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssPreview {
    pub result: GenerateResult,
    pub prettified: String,
}

/// Generates the utility's own rules, without preflights or safelist entries.
pub async fn generate_css(
    engine: &dyn UtilityEngine,
    utility: &str,
) -> anyhow::Result<GenerateResult> {
    engine.generate(&[utility], GenerateOptions::UTILITIES_ONLY).await
}

/// Generates CSS for `utility`, annotates rem lengths at `rem_to_px_ratio`
/// and pretty-prints the result. Formatter errors are returned as is.
pub async fn build_preview(
    engine: &dyn UtilityEngine,
    formatter: &dyn CssFormatter,
    utility: &str,
    rem_to_px_ratio: f64,
) -> anyhow::Result<CssPreview> {
    let result = generate_css(engine, utility).await?;
    let annotated = annotate_rem(&result.css, rem_to_px_ratio);
    let prettified = formatter.format(&annotated).await?;
    trace!("Preview for {} via {}: {} bytes", utility, formatter.name(), prettified.len());

    Ok(CssPreview { result, prettified })
}

/// Wraps CSS in a fenced markdown code block.
pub fn to_markdown(css: &str) -> String {
    format!("```css\n{}\n```", css.trim_end())
}
