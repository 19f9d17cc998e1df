//! Backend state management
//!
//! Defines [`UtilityCssBackend`], which owns the open documents, the workspace
//! context loader, the completion pipeline and the current settings.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tower_lsp::Client;
use tower_lsp::lsp_types::Url;

use crate::context::WorkspaceContextLoader;
use crate::css::{BuiltinFormatter, CommandFormatter, CssFormatter};
use crate::lsp::completion::CompletionPipeline;
use crate::lsp::config::Settings;
use crate::lsp::models::LspDocument;

/// Payload attached to completion items so `completionItem/resolve` can
/// rebuild the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionData {
    pub uri: Url,
    pub value: String,
}

/// Process-level options, fixed for the server's lifetime
#[derive(Clone)]
pub struct ServerOptions {
    pub formatter: Arc<dyn CssFormatter>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            formatter: Arc::new(BuiltinFormatter),
        }
    }
}

impl ServerOptions {
    /// Uses the external formatter `command` when given, otherwise the
    /// built-in one.
    pub fn with_formatter_command(command: Option<&str>) -> Self {
        match command.and_then(CommandFormatter::parse) {
            Some(formatter) => Self {
                formatter: Arc::new(formatter),
            },
            None => Self::default(),
        }
    }
}

/// The utility CSS language server backend.
#[derive(Clone)]
pub struct UtilityCssBackend {
    pub(super) client: Client,
    pub(super) documents_by_uri: Arc<DashMap<Url, Arc<LspDocument>>>,
    pub(super) serial_document_id: Arc<AtomicU32>,
    pub(super) loader: Arc<WorkspaceContextLoader>,
    pub(super) pipeline: Arc<CompletionPipeline>,
    pub(super) settings: Arc<RwLock<Settings>>,
    /// Language ids completions are offered for
    pub(super) language_ids: Arc<RwLock<BTreeSet<String>>>,
    pub(super) watcher_started: Arc<AtomicBool>,
    pub(super) shutdown_tx: Arc<tokio::sync::broadcast::Sender<()>>,
    pub(super) formatter_name: String,
}

impl std::fmt::Debug for UtilityCssBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtilityCssBackend")
            .field("formatter", &self.formatter_name)
            .field("documents", &self.documents_by_uri.len())
            .field("contexts", &self.loader.len())
            .finish()
    }
}
