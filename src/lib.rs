pub mod context;
pub mod css;
pub mod engine;
pub mod logging;
pub mod lsp;
