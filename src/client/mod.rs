use crate::api::{self, Gateway};
use crate::error::{ClientError, Result};
use crate::event::{AppEvent, EventSink};
use crate::remote::{DocumentStore, IdentityProvider};
use crate::session::store::SessionStore;
use crate::ui::editor::{self, EditorState};
use crate::ui::login::{self, LoginSubmit};
use crate::ui::upload;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct CaseBriefClient {
    events: EventSink,
    identity: Arc<dyn IdentityProvider>,
    documents: Arc<dyn DocumentStore>,
    gateway: Arc<dyn Gateway>,
    store: Arc<SessionStore>,
    export_dir: PathBuf,
    runtime_handle: Handle,
    forwarder_started: Arc<AtomicBool>,
}

impl CaseBriefClient {
    pub fn new(
        events: EventSink,
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
        gateway: Arc<dyn Gateway>,
        export_dir: PathBuf,
    ) -> Result<Self> {
        let runtime_handle = Handle::try_current()
            .map_err(|err| ClientError::Store(format!("tokio runtime unavailable: {err}")))?;
        let store = SessionStore::new(identity.clone(), documents.clone())?;

        Ok(Self {
            events,
            identity,
            documents,
            gateway,
            store: Arc::new(store),
            export_dir,
            runtime_handle,
            forwarder_started: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn start(&self) {
        self.store.init();
        if self
            .forwarder_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let events = self.events.clone();
        let mut states = self.store.subscribe();
        self.runtime_handle.spawn(async move {
            loop {
                let state = states.borrow_and_update().clone();
                events.send(AppEvent::StateChanged(state));
                if states.changed().await.is_err() {
                    tracing::debug!("session store closed, state forwarding stopped");
                    break;
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.store.shutdown();
    }

    pub fn authenticate(&self, submit: LoginSubmit) {
        let events = self.events.clone();
        let identity = Arc::clone(&self.identity);
        self.runtime_handle.spawn(async move {
            let result = login::authenticate(identity.as_ref(), &submit)
                .await
                .map(|identity| {
                    tracing::info!(uid = %identity.uid, "signed in");
                });
            events.send(AppEvent::AuthFinished(result));
        });
    }

    pub fn sign_out(&self) {
        let events = self.events.clone();
        let identity = Arc::clone(&self.identity);
        self.runtime_handle.spawn(async move {
            if let Err(err) = identity.sign_out().await {
                tracing::warn!("sign out failed: {err}");
                events.send(AppEvent::SignOutFailed(format!("Sign out failed: {err}")));
            }
        });
    }

    pub fn upload(&self, path: PathBuf) {
        let events = self.events.clone();
        let store = Arc::clone(&self.store);
        let gateway = Arc::clone(&self.gateway);
        self.runtime_handle.spawn(async move {
            let token = match store.refresh_token().await {
                Ok(token) => Some(token),
                Err(err) => {
                    tracing::warn!("no token for upload: {err}");
                    None
                }
            };
            let outcome = upload::upload_file(gateway.as_ref(), token.as_deref(), &path).await;
            events.send(AppEvent::UploadFinished(outcome));
        });
    }

    pub fn open_brief(&self, doc_id: String, cancel: CancellationToken) {
        let events = self.events.clone();
        let store = Arc::clone(&self.store);
        let documents = Arc::clone(&self.documents);
        self.runtime_handle.spawn(async move {
            let Some(uid) = current_uid(&store) else {
                events.send(AppEvent::BriefLoaded {
                    doc_id,
                    state: EditorState::Error(format!(
                        "Error fetching brief: {}",
                        ClientError::NotSignedIn
                    )),
                });
                return;
            };
            let state = tokio::select! {
                _ = cancel.cancelled() => return,
                state = editor::fetch_brief(documents.as_ref(), &uid, &doc_id) => state,
            };
            if !cancel.is_cancelled() {
                events.send(AppEvent::BriefLoaded { doc_id, state });
            }
        });
    }

    pub fn save_brief(&self, doc_id: String, text: String, cancel: CancellationToken) {
        let events = self.events.clone();
        let store = Arc::clone(&self.store);
        let documents = Arc::clone(&self.documents);
        self.runtime_handle.spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            let result = match current_uid(&store) {
                Some(uid) => editor::save_brief(documents.as_ref(), &uid, &doc_id, &text).await,
                None => Err(ClientError::NotSignedIn),
            };
            if let Err(err) = &result {
                tracing::warn!(doc_id = %doc_id, "failed to save brief: {err}");
            }
            if cancel.is_cancelled() {
                return;
            }
            events.send(AppEvent::BriefSaved {
                doc_id,
                text,
                result: result.map_err(|err| err.to_string()),
            });
        });
    }

    pub fn export_brief(&self, doc_id: String, cancel: CancellationToken) {
        let events = self.events.clone();
        let store = Arc::clone(&self.store);
        let gateway = Arc::clone(&self.gateway);
        let export_dir = self.export_dir.clone();
        self.runtime_handle.spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            let download = async {
                let token = store.refresh_token().await?;
                editor::export_brief(gateway.as_ref(), &token, &doc_id).await
            };
            let downloaded: Result<Vec<u8>> = tokio::select! {
                _ = cancel.cancelled() => return,
                downloaded = download => downloaded,
            };
            if cancel.is_cancelled() {
                return;
            }
            let result = downloaded.and_then(|bytes| api::save_export(&export_dir, &doc_id, &bytes));
            if let Err(err) = &result {
                tracing::warn!(doc_id = %doc_id, "failed to export brief: {err}");
            }
            events.send(AppEvent::BriefExported {
                doc_id,
                result: result.map_err(|err| err.to_string()),
            });
        });
    }
}

fn current_uid(store: &SessionStore) -> Option<String> {
    store.snapshot().identity.map(|identity| identity.uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{GatewayCall, RecordingGateway};
    use crate::remote::fake::{FakeIdentity, MemoryDocumentStore};
    use crate::session::{Identity, StoreState};
    use crate::ui::login::AuthMode;
    use serde_json::json;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        client: CaseBriefClient,
        rx: Receiver<AppEvent>,
        identity: Arc<FakeIdentity>,
        documents: Arc<MemoryDocumentStore>,
        gateway: Arc<RecordingGateway>,
        export_dir: TempDir,
    }

    fn harness() -> Harness {
        let (tx, rx) = mpsc::channel();
        let identity = FakeIdentity::new();
        let documents = MemoryDocumentStore::new();
        let gateway = Arc::new(RecordingGateway::default());
        let export_dir = TempDir::new().expect("temp dir should be created");
        let client = CaseBriefClient::new(
            EventSink::new(tx),
            identity.clone(),
            documents.clone(),
            gateway.clone(),
            export_dir.path().to_path_buf(),
        )
        .expect("client should build inside runtime");
        Harness {
            client,
            rx,
            identity,
            documents,
            gateway,
            export_dir,
        }
    }

    fn next_event(rx: &Receiver<AppEvent>, mut matches: impl FnMut(&AppEvent) -> bool) -> AppEvent {
        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(2))
                .expect("expected event should arrive in time");
            if matches(&event) {
                return event;
            }
        }
    }

    fn signed_in(harness: &Harness, uid: &str) -> StoreState {
        harness.client.start();
        harness.identity.set_identity(Some(Identity {
            uid: uid.to_string(),
            email: Some(format!("{uid}@example.com")),
        }));
        match next_event(&harness.rx, |event| {
            matches!(event, AppEvent::StateChanged(state) if state.token.is_some())
        }) {
            AppEvent::StateChanged(state) => state,
            _ => unreachable!(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_forwards_store_state() {
        let harness = harness();
        harness
            .documents
            .insert("u1", "doc-1", json!({"filename": "a.pdf", "status": "pending"}));

        harness.client.start();
        harness.identity.set_identity(Some(Identity {
            uid: "u1".to_string(),
            email: None,
        }));
        let event = next_event(&harness.rx, |event| {
            matches!(event, AppEvent::StateChanged(state) if !state.documents.is_empty())
        });

        let AppEvent::StateChanged(state) = event else {
            unreachable!()
        };
        assert_eq!(state.documents[0].display_name(), "a.pdf");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejected_credentials_produce_alert_text() {
        let harness = harness();
        harness.identity.reject_with("INVALID_PASSWORD");

        harness.client.authenticate(LoginSubmit {
            mode: AuthMode::SignIn,
            email: "a@example.com".to_string(),
            password: "wrong".to_string(),
        });

        let event = next_event(&harness.rx, |event| matches!(event, AppEvent::AuthFinished(_)));
        let AppEvent::AuthFinished(result) = event else {
            unreachable!()
        };
        assert_eq!(result, Err("Auth failed: INVALID_PASSWORD".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn upload_uses_session_token() {
        let harness = harness();
        signed_in(&harness, "u1");
        let dir = TempDir::new().expect("temp dir should be created");
        let path = dir.path().join("x.pdf");
        std::fs::write(&path, b"%PDF").expect("fixture should write");

        harness.client.upload(path);

        let event = next_event(&harness.rx, |event| matches!(event, AppEvent::UploadFinished(_)));
        let AppEvent::UploadFinished(outcome) = event else {
            unreachable!()
        };
        assert_eq!(outcome.message(), upload::STARTED_MESSAGE);
        assert_eq!(
            harness.gateway.calls(),
            vec![GatewayCall::Upload {
                token: "token-1".to_string(),
                filename: "x.pdf".to_string(),
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn open_brief_loads_completed_document() {
        let harness = harness();
        harness
            .documents
            .insert("u1", "doc-1", json!({"status": "completed", "brief": "B"}));
        signed_in(&harness, "u1");

        harness
            .client
            .open_brief("doc-1".to_string(), CancellationToken::new());

        let event = next_event(&harness.rx, |event| matches!(event, AppEvent::BriefLoaded { .. }));
        let AppEvent::BriefLoaded { doc_id, state } = event else {
            unreachable!()
        };
        assert_eq!(doc_id, "doc-1");
        assert_eq!(state.text(), Some("B"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_requests_send_nothing() {
        let harness = harness();
        harness
            .documents
            .insert("u1", "doc-1", json!({"status": "completed", "brief": "B"}));
        signed_in(&harness, "u1");
        let cancel = CancellationToken::new();
        cancel.cancel();

        harness.client.open_brief("doc-1".to_string(), cancel.clone());
        harness
            .client
            .save_brief("doc-1".to_string(), "B2".to_string(), cancel);

        while let Ok(event) = harness.rx.recv_timeout(Duration::from_millis(200)) {
            assert!(
                !matches!(event, AppEvent::BriefLoaded { .. } | AppEvent::BriefSaved { .. }),
                "cancelled requests should not report back"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn export_writes_docx_to_export_dir() {
        let harness = harness();
        signed_in(&harness, "u1");

        harness
            .client
            .export_brief("doc-7".to_string(), CancellationToken::new());

        let event = next_event(&harness.rx, |event| matches!(event, AppEvent::BriefExported { .. }));
        let AppEvent::BriefExported { result, .. } = event else {
            unreachable!()
        };
        let path = result.expect("export should succeed");
        assert_eq!(path, harness.export_dir.path().join("brief_doc-7.docx"));
        assert_eq!(
            harness.gateway.calls(),
            vec![GatewayCall::Export {
                token: "token-1".to_string(),
                doc_id: "doc-7".to_string(),
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn closed_editor_export_downloads_nothing() {
        let harness = harness();
        signed_in(&harness, "u1");
        let closed = CancellationToken::new();
        closed.cancel();
        harness.client.export_brief("doc-1".to_string(), closed);

        let requested = harness.identity.token_requests();
        harness.identity.hold_tokens();
        let closing = CancellationToken::new();
        harness.client.export_brief("doc-2".to_string(), closing.clone());
        tokio::time::timeout(Duration::from_secs(2), async {
            while harness.identity.token_requests() == requested {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("export should ask for a token");
        closing.cancel();
        harness.identity.release_tokens();

        while let Ok(event) = harness.rx.recv_timeout(Duration::from_millis(200)) {
            assert!(
                !matches!(event, AppEvent::BriefExported { .. }),
                "cancelled export should not report back"
            );
        }
        assert!(harness.gateway.calls().is_empty());
        assert!(!harness.export_dir.path().join("brief_doc-1.docx").exists());
        assert!(!harness.export_dir.path().join("brief_doc-2.docx").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn save_without_identity_reports_error() {
        let harness = harness();

        harness
            .client
            .save_brief("doc-1".to_string(), "B2".to_string(), CancellationToken::new());

        let event = next_event(&harness.rx, |event| matches!(event, AppEvent::BriefSaved { .. }));
        let AppEvent::BriefSaved { result, .. } = event else {
            unreachable!()
        };
        assert_eq!(result, Err("Not signed in.".to_string()));
        assert!(harness.documents.merges().is_empty());
    }
}
