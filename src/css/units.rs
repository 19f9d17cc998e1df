//! rem → px annotation for CSS previews

use once_cell::sync::Lazy;
use regex::Regex;

/// A signed decimal length in `rem` terminated by a semicolon.
static REM_LENGTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-]?[\d.]+)rem;").expect("rem pattern is valid"));

/// Ratios below this value disable annotation.
pub const MIN_RATIO: f64 = 1.0;

/// Appends `/* Npx */` after every `<n>rem;` in `css`, with `N = n * ratio`.
///
/// Returns the input unchanged when `ratio` is below [`MIN_RATIO`]. Matches are
/// taken left to right without overlap, and text outside the inserted
/// comments is preserved byte for byte.
pub fn annotate_rem(css: &str, ratio: f64) -> String {
    if !(ratio >= MIN_RATIO) {
        return css.to_string();
    }

    let mut output = String::with_capacity(css.len() + css.len() / 4);
    let mut cursor = 0;

    for caps in REM_LENGTH.captures_iter(css) {
        let Some(whole) = caps.get(0) else { continue };
        output.push_str(&css[cursor..whole.end()]);
        cursor = whole.end();

        if let Some(rem) = parse_leading_float(&caps[1]) {
            output.push_str(&format!(" /* {}px */", format_px(rem * ratio)));
        }
    }

    output.push_str(&css[cursor..]);
    output
}

/// Parses the longest numeric prefix, so `1.5.2` reads as `1.5`.
fn parse_leading_float(text: &str) -> Option<f64> {
    (1..=text.len())
        .rev()
        .filter(|&end| text.is_char_boundary(end))
        .find_map(|end| text[..end].parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

fn format_px(px: f64) -> String {
    // Avoid printing "-0".
    if px == 0.0 {
        return "0".to_string();
    }
    px.to_string()
}
