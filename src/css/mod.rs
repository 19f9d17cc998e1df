//! Post-processing of generated CSS: color extraction, rem annotation,
//! pretty-printing and the preview built from them.

pub mod color;
pub mod formatter;
pub mod preview;
pub mod units;

pub use color::resolve_color;
pub use formatter::{BuiltinFormatter, CommandFormatter, CssFormatter, FormatError};
pub use preview::{CssPreview, build_preview, generate_css, to_markdown};
pub use units::annotate_rem;
