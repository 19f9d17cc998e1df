//! LSP protocol handler implementations
//!
//! - Lifecycle: initialize, initialized, shutdown
//! - Documents: did_open, did_change, did_close
//! - Completion: completion, completion_resolve
//! - Workspace: did_change_configuration, did_change_watched_files

use std::path::PathBuf;
use std::sync::Arc;

use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionList, CompletionOptions, CompletionParams, CompletionResponse,
    DidChangeConfigurationParams, DidChangeTextDocumentParams, DidChangeWatchedFilesParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, Documentation, InitializeParams,
    InitializeResult, InitializedParams, MarkupContent, MarkupKind, ServerCapabilities,
    ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind,
};
use tower_lsp::{LanguageServer, jsonrpc};
use tracing::{debug, info, warn};

use super::state::{CompletionData, UtilityCssBackend};
use super::to_completion_item;
use crate::lsp::completion::{CompletionOptions as PipelineOptions, CompletionRequest};
use crate::lsp::config::Effect;
use crate::lsp::document::position_to_byte;
use crate::lsp::models::LspDocument;

const TRIGGER_CHARACTERS: &[&str] = &["-", ":", " ", "\"", "'"];

#[allow(deprecated)]
fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    params
        .root_uri
        .as_ref()
        .and_then(|uri| uri.to_file_path().ok())
        .or_else(|| {
            params
                .workspace_folders
                .as_ref()
                .and_then(|folders| folders.first())
                .and_then(|folder| folder.uri.to_file_path().ok())
        })
}

#[tower_lsp::async_trait]
impl LanguageServer for UtilityCssBackend {
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        info!("Received initialize");

        if let Some(options) = &params.initialization_options {
            self.apply_settings(options);
        }
        match workspace_root(&params) {
            Some(root) => self.establish_root(root).await,
            None => debug!("No workspace root; waiting for the first document"),
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(
                        TRIGGER_CHARACTERS.iter().map(|c| c.to_string()).collect(),
                    ),
                    resolve_provider: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("Initialized");
        self.warn_unknown_languages().await;
        self.start_watcher();
    }

    async fn shutdown(&self) -> jsonrpc::Result<()> {
        info!("Received shutdown request");
        let _ = self.shutdown_tx.send(());
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        debug!("Opening document: URI={}, version={}", item.uri, item.version);

        if self.loader.root().is_none() {
            let parent = item
                .uri
                .to_file_path()
                .ok()
                .and_then(|path| path.parent().map(PathBuf::from));
            if let Some(parent) = parent {
                self.establish_root(parent).await;
                self.start_watcher();
            }
        }

        let document = Arc::new(LspDocument::new(
            self.next_document_id(),
            item.uri.clone(),
            item.language_id,
            &item.text,
            item.version,
        ));
        self.documents_by_uri.insert(item.uri, document);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let Some(document) = self.documents_by_uri.get(&uri).map(|r| r.value().clone()) else {
            warn!("Failed to find document with URI={}", uri);
            return;
        };
        if let Err(e) = document.apply(params.content_changes, params.text_document.version).await {
            warn!("Failed to apply changes to {}: {}", uri, e);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some((_, document)) = self.documents_by_uri.remove(&uri) {
            debug!("Closed document: {}, id: {}", uri, document.id);
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let effects = self.apply_settings(&params.settings);
        if effects.contains(&Effect::ValidateLanguages) {
            self.warn_unknown_languages().await;
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for change in params.changes {
            if let Ok(path) = change.uri.to_file_path() {
                self.loader.handle_path_change(&path).await;
            }
        }
    }

    async fn completion(&self, params: CompletionParams) -> LspResult<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        debug!("Completion request at {}:{:?}", uri, position);

        let Some(document) = self.documents_by_uri.get(&uri).map(|r| r.value().clone()) else {
            debug!("Document not found: {}", uri);
            return Ok(None);
        };
        let language_id = document.language_id().await;
        if !self.is_language_enabled(&language_id) {
            debug!("Completions disabled for language '{}'", language_id);
            return Ok(None);
        }
        let Ok(path) = uri.to_file_path() else {
            return Ok(None);
        };

        let rope = document.snapshot().await;
        let Some(offset) = position_to_byte(&position, &rope) else {
            return Ok(None);
        };
        let text = rope.to_string();
        let root = self.loader.root();
        let options = PipelineOptions::from(&*self.settings.read());
        let request = CompletionRequest {
            path: &path,
            text: &text,
            offset,
            working_root: root.as_deref(),
        };

        let Some(candidates) = self.pipeline.complete(&request, options).await else {
            return Ok(None);
        };
        let items = candidates
            .into_iter()
            .filter_map(|candidate| to_completion_item(&uri, &rope, candidate))
            .collect();

        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: true,
            items,
        })))
    }

    async fn completion_resolve(&self, mut item: CompletionItem) -> LspResult<CompletionItem> {
        let options = PipelineOptions::from(&*self.settings.read());
        if options.simple_mode {
            return Ok(item);
        }
        let Some(data) = item
            .data
            .clone()
            .and_then(|data| serde_json::from_value::<CompletionData>(data).ok())
        else {
            return Ok(item);
        };
        let Ok(path) = data.uri.to_file_path() else {
            return Ok(item);
        };

        let document = self.documents_by_uri.get(&data.uri).map(|r| r.value().clone());
        let text = match document {
            Some(document) => document.text().await,
            None => String::new(),
        };
        let root = self.loader.root();
        let request = CompletionRequest {
            path: &path,
            text: &text,
            offset: 0,
            working_root: root.as_deref(),
        };

        if let Some(markdown) = self.pipeline.describe(&request, &data.value, options).await {
            item.documentation = Some(Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: markdown,
            }));
        }
        Ok(item)
    }
}
