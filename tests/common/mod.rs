// In-process LSP test harness
//
// Drives `UtilityCssBackend` through the tower-lsp `Service` directly: JSON-RPC
// requests go in through `tower::Service::call`, server-to-client messages come
// out of the `ClientSocket` stream. No transport or framing is involved.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::{Service, ServiceExt};
use tower_lsp::LspService;
use tower_lsp::jsonrpc::{Request, Response};
use tower_lsp::lsp_types::*;

use utility_css_language_server::lsp::backend::{ServerOptions, UtilityCssBackend};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub const CATALOG: &str = r#"{
  "utilities": {
    "p-1": "padding: 0.25rem;",
    "p-2": "padding: 0.5rem;",
    "px-2": "padding-left: 0.5rem; padding-right: 0.5rem;",
    "text-red-500": "--un-text-opacity: 1; color: rgba(248, 113, 113, var(--un-text-opacity));",
    "text-white": "--un-text-opacity: 1; color: rgba(255, 255, 255, var(--un-text-opacity));"
  },
  "preflights": "*{box-sizing:border-box;}"
}"#;

#[allow(dead_code)]
pub struct LspTestHarness {
    service: LspService<UtilityCssBackend>,
    messages: mpsc::UnboundedReceiver<Request>,
    next_id: AtomicI64,
    pub workspace: TempDir,
}

#[allow(dead_code)]
impl LspTestHarness {
    /// Workspace with `files` written under a temporary root, initialized
    /// with `options` as `initializationOptions`.
    pub async fn new(files: &[(&str, &str)], options: Value) -> Self {
        let workspace = tempfile::tempdir().expect("create workspace");
        for (name, content) in files {
            let path = workspace.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("create parent directory");
            }
            std::fs::write(&path, content).expect("write workspace file");
        }
        let root_uri = Url::from_file_path(workspace.path()).unwrap();

        let (service, client_socket) =
            LspService::new(|client| UtilityCssBackend::new(client, ServerOptions::default()));

        // Drain server-to-client messages so the client never blocks.
        let (tx, messages) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = client_socket;
            while let Some(msg) = stream.next().await {
                let _ = tx.send(msg);
            }
        });

        let mut harness = LspTestHarness {
            service,
            messages,
            next_id: AtomicI64::new(1),
            workspace,
        };

        let init = Request::build("initialize")
            .params(json!({
                "capabilities": {},
                "rootUri": root_uri.as_str(),
                "initializationOptions": options,
            }))
            .id(harness.next_id())
            .finish();
        let response = harness.send_request(init).await.expect("initialize response");
        assert!(response.is_ok(), "initialize failed: {:?}", response);

        let initialized = Request::build("initialized").params(json!({})).finish();
        harness.send_notification(initialized).await;

        harness
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send_request(&mut self, req: Request) -> Option<Response> {
        self.service
            .ready()
            .await
            .expect("service not ready")
            .call(req)
            .await
            .expect("service call failed")
    }

    async fn send_notification(&mut self, notif: Request) {
        let _ = self.service.ready().await.unwrap().call(notif).await;
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &mut self,
        method: &'static str,
        params: Value,
    ) -> T {
        let req = Request::build(method).params(params).id(self.next_id()).finish();
        let response = self.send_request(req).await.expect("response");
        let (_, result) = response.into_parts();
        serde_json::from_value(result.expect("request failed")).expect("deserialize result")
    }

    pub fn uri(&self, name: &str) -> Url {
        Url::from_file_path(self.workspace.path().join(name)).unwrap()
    }

    pub async fn open(&mut self, name: &str, language_id: &str, text: &str) -> Url {
        self.open_path(&self.workspace.path().join(name), language_id, text).await
    }

    pub async fn open_path(&mut self, path: &Path, language_id: &str, text: &str) -> Url {
        let uri = Url::from_file_path(path).unwrap();
        let notif = Request::build("textDocument/didOpen")
            .params(json!({
                "textDocument": {
                    "uri": uri.as_str(),
                    "languageId": language_id,
                    "version": 1,
                    "text": text,
                }
            }))
            .finish();
        self.send_notification(notif).await;
        uri
    }

    pub async fn notify(&mut self, method: &'static str, params: Value) {
        let notif = Request::build(method).params(params).finish();
        self.send_notification(notif).await;
    }

    pub async fn change_configuration(&mut self, settings: Value) {
        let notif = Request::build("workspace/didChangeConfiguration")
            .params(json!({ "settings": settings }))
            .finish();
        self.send_notification(notif).await;
    }

    pub async fn completion(
        &mut self,
        uri: &Url,
        line: u32,
        character: u32,
    ) -> Option<CompletionResponse> {
        self.request(
            "textDocument/completion",
            json!({
                "textDocument": { "uri": uri.as_str() },
                "position": { "line": line, "character": character },
            }),
        )
        .await
    }

    /// Completion items, panicking if the server returned none.
    pub async fn completion_items(
        &mut self,
        uri: &Url,
        line: u32,
        character: u32,
    ) -> CompletionList {
        match self.completion(uri, line, character).await {
            Some(CompletionResponse::List(list)) => list,
            other => panic!("expected a completion list, got {:?}", other),
        }
    }

    pub async fn resolve(&mut self, item: &CompletionItem) -> CompletionItem {
        self.request("completionItem/resolve", serde_json::to_value(item).unwrap())
            .await
    }

    /// Waits for the next server-to-client message with the given method.
    pub async fn wait_for_message(&mut self, method: &str) -> Option<Request> {
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.messages.recv()).await.ok()??;
            if msg.method() == method {
                return Some(msg);
            }
        }
    }
}

pub fn markdown(item: &CompletionItem) -> Option<&str> {
    match &item.documentation {
        Some(Documentation::MarkupContent(content)) => Some(content.value.as_str()),
        _ => None,
    }
}
