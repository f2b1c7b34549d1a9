use crate::error::{ClientError, Result};
use crate::remote::{DocumentStore, IdentityProvider, RemoteDocument, Subscription};
use crate::session::{DocumentRecord, Identity, StoreState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct Shared {
    identity: Arc<dyn IdentityProvider>,
    documents: Arc<dyn DocumentStore>,
    state: Arc<watch::Sender<StoreState>>,
    runtime_handle: Handle,
}

pub struct SessionStore {
    shared: Shared,
    listener: Mutex<Option<Subscription>>,
}

impl SessionStore {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        let runtime_handle = Handle::try_current()
            .map_err(|err| ClientError::Store(format!("tokio runtime unavailable: {err}")))?;
        let (state, _) = watch::channel(StoreState::default());

        Ok(Self {
            shared: Shared {
                identity,
                documents,
                state: Arc::new(state),
                runtime_handle,
            },
            listener: Mutex::new(None),
        })
    }

    pub fn init(&self) {
        let mut listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if listener.is_some() {
            tracing::debug!("session store already initialised");
            return;
        }

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let shared = self.shared.clone();
        let mut identities = self.shared.identity.subscribe();

        let task = self.shared.runtime_handle.spawn(async move {
            let mut documents: Option<Subscription> = None;
            let mut epoch: Option<CancellationToken> = None;
            let mut applied: Option<Option<Identity>> = None;

            loop {
                let current = identities.borrow_and_update().clone();
                if applied.as_ref() != Some(&current) {
                    shared.apply_identity(current.clone(), &stop, &mut documents, &mut epoch);
                    applied = Some(current);
                }

                tokio::select! {
                    _ = stop.cancelled() => break,
                    changed = identities.changed() => {
                        if changed.is_err() {
                            tracing::debug!("identity provider closed its listener");
                            break;
                        }
                    }
                }
            }

            if let Some(epoch) = epoch.take() {
                epoch.cancel();
            }
            if let Some(documents) = documents.take() {
                documents.dispose();
            }
        });

        *listener = Some(Subscription::new(cancel, task));
    }

    pub fn subscribe_to_documents(&self, user_id: &str) -> Subscription {
        self.shared
            .subscribe_to_documents(user_id, CancellationToken::new())
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> StoreState {
        self.shared.state.borrow().clone()
    }

    // Asks the provider for a token (it refreshes when near expiry) and
    // records it if the identity is unchanged.
    pub async fn refresh_token(&self) -> Result<String> {
        let uid = self
            .shared
            .current_uid()
            .ok_or(ClientError::NotSignedIn)?;
        let token = self.shared.identity.id_token().await?;
        self.shared.store_token(&uid, token.clone());
        Ok(token)
    }

    pub fn shutdown(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.dispose();
            tracing::debug!("session store shut down");
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn apply_identity(
        &self,
        identity: Option<Identity>,
        parent: &CancellationToken,
        documents: &mut Option<Subscription>,
        epoch: &mut Option<CancellationToken>,
    ) {
        if let Some(previous) = epoch.take() {
            previous.cancel();
        }
        if let Some(previous) = documents.take() {
            previous.dispose();
        }

        match identity {
            Some(identity) => {
                tracing::info!(uid = %identity.uid, "identity changed, subscribing to documents");
                self.state.send_modify(|state| {
                    state.identity = Some(identity.clone());
                    state.token = None;
                    state.documents.clear();
                });

                let token = parent.child_token();
                self.spawn_token_fetch(identity.uid.clone(), token.clone());
                *epoch = Some(token);
                *documents =
                    Some(self.subscribe_to_documents(&identity.uid, parent.child_token()));
            }
            None => {
                tracing::info!("identity cleared, dropping session state");
                self.state.send_replace(StoreState::default());
            }
        }
    }

    fn spawn_token_fetch(&self, uid: String, epoch: CancellationToken) {
        let shared = self.clone();
        self.runtime_handle.spawn(async move {
            let fetched = tokio::select! {
                _ = epoch.cancelled() => return,
                fetched = shared.identity.id_token() => fetched,
            };
            if epoch.is_cancelled() {
                return;
            }
            match fetched {
                Ok(token) => shared.store_token(&uid, token),
                Err(err) => tracing::warn!(uid = %uid, "failed to fetch access token: {err}"),
            }
        });
    }

    fn subscribe_to_documents(&self, user_id: &str, cancel: CancellationToken) -> Subscription {
        let stop = cancel.clone();
        let shared = self.clone();
        let user_id = user_id.to_string();

        let task = self.runtime_handle.spawn(async move {
            let listen = tokio::select! {
                _ = stop.cancelled() => return,
                listen = shared.documents.listen(&user_id) => listen,
            };
            let mut stream = match listen {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(uid = %user_id, "failed to open document subscription: {err}");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    push = stream.recv() => match push {
                        Some(Ok(snapshot)) => {
                            if stop.is_cancelled() {
                                break;
                            }
                            shared.replace_documents(&user_id, snapshot);
                        }
                        Some(Err(err)) => {
                            tracing::warn!(uid = %user_id, "document subscription error: {err}");
                        }
                        None => {
                            tracing::debug!(uid = %user_id, "document subscription closed");
                            break;
                        }
                    },
                }
            }
        });

        Subscription::new(cancel, task)
    }

    fn current_uid(&self) -> Option<String> {
        self.state
            .borrow()
            .identity
            .as_ref()
            .map(|identity| identity.uid.clone())
    }

    fn store_token(&self, uid: &str, token: String) {
        self.state.send_if_modified(|state| {
            let same_identity = state
                .identity
                .as_ref()
                .is_some_and(|identity| identity.uid == uid);
            if !same_identity || state.token.as_deref() == Some(token.as_str()) {
                return false;
            }
            state.token = Some(token);
            true
        });
    }

    fn replace_documents(&self, uid: &str, snapshot: Vec<RemoteDocument>) {
        let documents = map_snapshot(snapshot);
        let count = documents.len();
        let applied = self.state.send_if_modified(|state| {
            let same_identity = state
                .identity
                .as_ref()
                .is_some_and(|identity| identity.uid == uid);
            if !same_identity {
                return false;
            }
            state.documents = documents;
            true
        });
        if applied {
            tracing::debug!(uid = %uid, count, "document mirror replaced");
        }
    }
}

// Later duplicates win but keep the position of the first occurrence.
pub fn map_snapshot(snapshot: Vec<RemoteDocument>) -> Vec<DocumentRecord> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut documents: Vec<DocumentRecord> = Vec::with_capacity(snapshot.len());
    for remote in snapshot {
        let record = DocumentRecord::from_parts(&remote.id, &remote.fields);
        match positions.get(&record.id) {
            Some(&index) => documents[index] = record,
            None => {
                positions.insert(record.id.clone(), documents.len());
                documents.push(record);
            }
        }
    }
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::{FakeIdentity, MemoryDocumentStore};
    use crate::session::DocumentStatus;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.to_string(),
            email: Some(format!("{uid}@example.com")),
        }
    }

    fn remote(id: &str, fields: serde_json::Value) -> RemoteDocument {
        RemoteDocument {
            id: id.to_string(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    async fn wait_for(
        rx: &mut watch::Receiver<StoreState>,
        predicate: impl FnMut(&StoreState) -> bool,
    ) -> StoreState {
        timeout(Duration::from_secs(2), rx.wait_for(predicate))
            .await
            .expect("store should reach expected state in time")
            .expect("store sender should stay alive")
            .clone()
    }

    fn fixture() -> (Arc<FakeIdentity>, Arc<MemoryDocumentStore>, SessionStore) {
        let identity = FakeIdentity::new();
        let documents = MemoryDocumentStore::new();
        let store = SessionStore::new(identity.clone(), documents.clone())
            .expect("store should build inside runtime");
        (identity, documents, store)
    }

    #[test]
    fn map_snapshot_uses_id_as_unique_key() {
        let documents = map_snapshot(vec![
            remote("a", json!({"status": "processing"})),
            remote("b", json!({"status": "pending"})),
            remote("a", json!({"status": "completed", "brief": "B"})),
        ]);
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].id, "a");
        assert_eq!(documents[0].status, DocumentStatus::Completed);
        assert_eq!(documents[1].id, "b");
    }

    #[test]
    fn new_requires_a_tokio_runtime() {
        let result = SessionStore::new(FakeIdentity::new(), MemoryDocumentStore::new());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sign_in_fetches_token_and_mirrors_documents() {
        let (identity, documents, store) = fixture();
        documents.insert("u1", "doc-1", json!({"filename": "a.pdf", "status": "processing"}));
        let mut rx = store.subscribe();

        store.init();
        identity.set_identity(Some(self::identity("u1")));

        let state = wait_for(&mut rx, |state| {
            state.token.is_some() && state.documents.len() == 1
        })
        .await;
        assert_eq!(state.identity, Some(self::identity("u1")));
        assert_eq!(state.token.as_deref(), Some("token-1"));
        assert_eq!(state.documents[0].filename.as_deref(), Some("a.pdf"));
    }

    #[tokio::test]
    async fn identity_loss_clears_token_and_documents() {
        let (identity, documents, store) = fixture();
        documents.insert("u1", "doc-1", json!({"status": "completed", "brief": "B"}));
        let mut rx = store.subscribe();
        store.init();
        identity.set_identity(Some(self::identity("u1")));
        wait_for(&mut rx, |state| {
            state.token.is_some() && !state.documents.is_empty()
        })
        .await;

        identity.set_identity(None);

        let state = wait_for(&mut rx, |state| state.identity.is_none()).await;
        assert!(state.token.is_none());
        assert!(state.documents.is_empty());
    }

    #[tokio::test]
    async fn each_push_replaces_the_mirror() {
        let (identity, documents, store) = fixture();
        documents.insert("u1", "stale", json!({"status": "processing"}));
        let mut rx = store.subscribe();
        store.init();
        identity.set_identity(Some(self::identity("u1")));
        wait_for(&mut rx, |state| state.documents.len() == 1).await;

        documents
            .push_documents(
                "u1",
                vec![
                    remote("fresh-1", json!({"status": "completed", "brief": "B"})),
                    remote("fresh-2", json!({"status": "pending"})),
                ],
            )
            .await;

        let state = wait_for(&mut rx, |state| {
            state.documents.iter().any(|doc| doc.id == "fresh-1")
        })
        .await;
        let ids: Vec<_> = state.documents.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh-1", "fresh-2"]);
    }

    #[tokio::test]
    async fn subscription_error_keeps_current_mirror() {
        let (identity, documents, store) = fixture();
        documents.insert("u1", "doc-1", json!({"status": "pending"}));
        let mut rx = store.subscribe();
        store.init();
        identity.set_identity(Some(self::identity("u1")));
        wait_for(&mut rx, |state| state.documents.len() == 1).await;

        documents.push_error("u1", "permission denied").await;
        documents.insert("u1", "doc-2", json!({"status": "pending"}));
        documents.push("u1").await;

        let state = wait_for(&mut rx, |state| state.documents.len() == 2).await;
        assert_eq!(state.documents[0].id, "doc-1");
    }

    #[tokio::test]
    async fn disposed_subscription_ignores_late_pushes() {
        let (identity, documents, store) = fixture();
        let mut rx = store.subscribe();
        store.init();
        identity.set_identity(Some(self::identity("u1")));
        wait_for(&mut rx, |state| state.token.is_some()).await;
        store.shutdown();

        let manual = store.subscribe_to_documents("u1");
        manual.dispose();
        documents.insert("u1", "late", json!({"status": "completed"}));
        documents.push("u1").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.snapshot().documents.is_empty());
        assert_eq!(documents.listener_count("u1"), 0);
    }

    #[tokio::test]
    async fn switching_identity_resubscribes_for_new_user() {
        let (identity, documents, store) = fixture();
        documents.insert("u1", "mine", json!({"status": "pending"}));
        documents.insert("u2", "theirs", json!({"status": "pending"}));
        let mut rx = store.subscribe();
        store.init();
        identity.set_identity(Some(self::identity("u1")));
        wait_for(&mut rx, |state| state.documents.len() == 1).await;

        identity.set_identity(Some(self::identity("u2")));
        let state = wait_for(&mut rx, |state| {
            state.documents.first().is_some_and(|doc| doc.id == "theirs")
        })
        .await;
        assert_eq!(state.documents.len(), 1);

        documents.push("u1").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.snapshot().documents[0].id, "theirs");
    }

    #[tokio::test]
    async fn late_token_for_previous_identity_is_discarded() {
        let (identity, _documents, store) = fixture();
        let mut rx = store.subscribe();
        identity.hold_tokens();
        identity.set_token(Some("token-u1"));
        store.init();
        identity.set_identity(Some(self::identity("u1")));
        timeout(Duration::from_secs(2), async {
            while identity.token_requests() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("token for u1 should be requested");

        identity.set_token(Some("token-u2"));
        identity.set_identity(Some(self::identity("u2")));
        wait_for(&mut rx, |state| {
            state.identity.as_ref().is_some_and(|id| id.uid == "u2")
        })
        .await;
        identity.release_tokens();

        let state = wait_for(&mut rx, |state| state.token.is_some()).await;
        assert_eq!(state.token.as_deref(), Some("token-u2"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = store.snapshot();
        assert_eq!(state.identity.map(|id| id.uid).as_deref(), Some("u2"));
        assert_eq!(state.token.as_deref(), Some("token-u2"));
    }

    #[tokio::test]
    async fn init_registers_listener_once() {
        let (identity, documents, store) = fixture();
        store.init();
        store.init();
        let mut rx = store.subscribe();
        identity.set_identity(Some(self::identity("u1")));
        wait_for(&mut rx, |state| state.identity.is_some()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(documents.listener_count("u1"), 1);
    }

    #[tokio::test]
    async fn refresh_token_requires_identity() {
        let (identity, _documents, store) = fixture();
        let error = store
            .refresh_token()
            .await
            .expect_err("refresh without identity should fail");
        assert!(matches!(error, ClientError::NotSignedIn));

        let mut rx = store.subscribe();
        store.init();
        identity.set_identity(Some(self::identity("u1")));
        wait_for(&mut rx, |state| state.token.is_some()).await;
        identity.set_token(Some("token-2"));

        let token = store
            .refresh_token()
            .await
            .expect("refresh should succeed");
        assert_eq!(token, "token-2");
        assert_eq!(store.snapshot().token.as_deref(), Some("token-2"));
    }
}
