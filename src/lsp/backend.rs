use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tower_lsp::Client;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionTextEdit, Documentation, MessageType, Range,
    TextEdit, Url,
};
use tracing::{debug, info, warn};

use ropey::Rope;

use crate::context::{ContextResolver, WorkspaceContextLoader};
use crate::engine::CatalogAutocompleteFactory;
use crate::lsp::completion::{CandidateKind, CompletionPipeline, UtilityCandidate};
use crate::lsp::config::{Effect, Settings, effects_of};
use crate::lsp::document::byte_to_position;
use crate::lsp::languages::{effective_language_ids, validate_language_ids};
use crate::lsp::session_cache::SessionCache;

mod handlers;
mod state;

pub use state::{CompletionData, ServerOptions, UtilityCssBackend};

impl UtilityCssBackend {
    /// Creates the backend and starts listening for context events.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(client: Client, options: ServerOptions) -> Self {
        let settings = Settings::default();
        let loader = Arc::new(WorkspaceContextLoader::new());
        let sessions = Arc::new(SessionCache::new(
            Arc::new(CatalogAutocompleteFactory),
            settings.match_type,
        ));
        let formatter_name = options.formatter.name().to_string();
        let pipeline = Arc::new(CompletionPipeline::new(
            loader.clone(),
            sessions,
            options.formatter,
        ));
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
        info!("Using {} CSS formatter", formatter_name);

        let backend = Self {
            client,
            documents_by_uri: Arc::new(DashMap::new()),
            serial_document_id: Arc::new(AtomicU32::new(0)),
            loader,
            pipeline,
            language_ids: Arc::new(RwLock::new(effective_language_ids(&settings.language_ids))),
            settings: Arc::new(RwLock::new(settings)),
            watcher_started: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Arc::new(shutdown_tx),
            formatter_name,
        };
        backend.spawn_context_listener();
        backend
    }

    pub(super) fn next_document_id(&self) -> u32 {
        self.serial_document_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Evicts the session of every reloaded or unloaded context. If the
    /// listener falls behind, all sessions are dropped.
    fn spawn_context_listener(&self) {
        let mut events = BroadcastStream::new(self.loader.subscribe());
        let mut shutdown = self.shutdown_tx.subscribe();
        let sessions = self.pipeline.sessions().clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.next() => match event {
                        Some(Ok(event)) => {
                            debug!("Context event: {:?}", event);
                            sessions.evict(event.id());
                        }
                        Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                            warn!("Missed {} context event(s); clearing all sessions", skipped);
                            sessions.clear();
                        }
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            debug!("Context listener stopped");
        });
    }

    /// Sets the working root (once) and warms the context cache.
    pub(super) async fn establish_root(&self, root: PathBuf) {
        if self.loader.root().is_some() {
            return;
        }
        self.loader.set_root(root);
        self.loader.preload().await;
    }

    pub(super) fn start_watcher(&self) {
        if self.loader.root().is_none() || self.watcher_started.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.loader.watch() {
            warn!("Failed to watch workspace for configuration changes: {:#}", e);
            self.watcher_started.store(false, Ordering::SeqCst);
        }
    }

    /// Merges `value` into the settings and applies the effects of the keys
    /// that changed. Invalid settings are logged and ignored.
    pub(super) fn apply_settings(&self, value: &Value) -> BTreeSet<Effect> {
        let (previous, current) = {
            let mut settings = self.settings.write();
            let merged = match settings.merged(value) {
                Ok(merged) => merged,
                Err(e) => {
                    warn!("Ignoring invalid settings: {}", e);
                    return BTreeSet::new();
                }
            };
            let previous = std::mem::replace(&mut *settings, merged.clone());
            (previous, merged)
        };

        let changed = previous.diff(&current);
        if changed.is_empty() {
            return BTreeSet::new();
        }
        info!(
            "Settings changed: {}",
            changed.iter().map(|key| key.name()).collect::<Vec<_>>().join(", ")
        );

        let effects = effects_of(&changed);
        for effect in &effects {
            match effect {
                Effect::ClearSessions => {
                    let sessions = self.pipeline.sessions();
                    sessions.set_match_mode(current.match_type);
                    sessions.clear();
                }
                Effect::ValidateLanguages => {
                    *self.language_ids.write() = effective_language_ids(&current.language_ids);
                }
            }
        }
        effects
    }

    /// Reports configured language ids that are not recognized, once per call.
    pub(super) async fn warn_unknown_languages(&self) {
        let configured = self.settings.read().language_ids.clone();
        let (_, invalid) = validate_language_ids(&configured);
        if invalid.is_empty() {
            return;
        }
        let message = format!("Unknown language ids in languageIds: {}", invalid.join(", "));
        warn!("{}", message);
        self.client.show_message(MessageType::WARNING, message).await;
    }

    pub(super) fn is_language_enabled(&self, language_id: &str) -> bool {
        self.language_ids.read().contains(language_id)
    }
}

/// Builds the LSP item for a candidate. `None` if its span cannot be mapped
/// back to a position in `text`.
fn to_completion_item(
    uri: &Url,
    text: &Rope,
    candidate: UtilityCandidate,
) -> Option<CompletionItem> {
    let range = Range {
        start: byte_to_position(candidate.replacement.start, text)?,
        end: byte_to_position(candidate.replacement.end, text)?,
    };
    let data = serde_json::to_value(CompletionData {
        uri: uri.clone(),
        value: candidate.value,
    })
    .ok();
    let (kind, documentation) = match candidate.kind {
        CandidateKind::Color => (
            CompletionItemKind::COLOR,
            candidate.color.map(Documentation::String),
        ),
        CandidateKind::Utility => (CompletionItemKind::ENUM_MEMBER, None),
    };

    Some(CompletionItem {
        label: candidate.label,
        kind: Some(kind),
        documentation,
        sort_text: candidate.sort_text,
        text_edit: Some(CompletionTextEdit::Edit(TextEdit {
            range,
            new_text: candidate.replacement.text,
        })),
        data,
        ..Default::default()
    })
}
