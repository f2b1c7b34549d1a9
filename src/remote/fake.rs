use super::{DocumentStore, IdentityProvider, RemoteDocument, SnapshotStream};
use crate::error::{ClientError, Result};
use crate::session::Identity;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

pub struct FakeIdentity {
    identity: watch::Sender<Option<Identity>>,
    token: Mutex<Option<String>>,
    rejection: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
    hold: watch::Sender<bool>,
    token_requests: AtomicUsize,
}

impl FakeIdentity {
    pub fn new() -> Arc<Self> {
        let (identity, _) = watch::channel(None);
        let (hold, _) = watch::channel(false);
        Arc::new(Self {
            identity,
            token: Mutex::new(Some("token-1".to_string())),
            rejection: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            hold,
            token_requests: AtomicUsize::new(0),
        })
    }

    // Token requests read the token immediately but do not answer until
    // released.
    pub fn hold_tokens(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_tokens(&self) {
        self.hold.send_replace(false);
    }

    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    pub fn set_identity(&self, identity: Option<Identity>) {
        self.identity.send_replace(identity);
    }

    pub fn set_token(&self, token: Option<&str>) {
        *self.token.lock().expect("token lock") = token.map(str::to_string);
    }

    pub fn reject_with(&self, message: &str) {
        *self.rejection.lock().expect("rejection lock") = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn authenticate(&self, op: &str, email: &str) -> Result<Identity> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("{op}:{email}"));
        if let Some(message) = self.rejection.lock().expect("rejection lock").clone() {
            return Err(ClientError::Auth(message));
        }
        let identity = Identity {
            uid: format!("uid-{email}"),
            email: Some(email.to_string()),
        };
        self.set_identity(Some(identity.clone()));
        Ok(identity)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in(&self, email: &str, _password: &str) -> Result<Identity> {
        self.authenticate("sign_in", email)
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<Identity> {
        self.authenticate("sign_up", email)
    }

    async fn sign_out(&self) -> Result<()> {
        self.calls
            .lock()
            .expect("calls lock")
            .push("sign_out".to_string());
        self.set_identity(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }

    async fn id_token(&self) -> Result<String> {
        let token = self.token.lock().expect("token lock").clone();
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        let mut hold = self.hold.subscribe();
        let _ = hold.wait_for(|held| !*held).await;
        token.ok_or(ClientError::NotSignedIn)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeCall {
    pub user_id: String,
    pub doc_id: String,
    pub fields: Map<String, Value>,
}

#[derive(Default)]
struct MemoryState {
    documents: BTreeMap<(String, String), Map<String, Value>>,
    listeners: Vec<(String, mpsc::Sender<Result<Vec<RemoteDocument>>>)>,
    get_failure: Option<String>,
    merges: Vec<MergeCall>,
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, user_id: &str, doc_id: &str, fields: Value) {
        let fields = fields.as_object().cloned().unwrap_or_default();
        self.state
            .lock()
            .expect("store lock")
            .documents
            .insert((user_id.to_string(), doc_id.to_string()), fields);
    }

    pub fn document(&self, user_id: &str, doc_id: &str) -> Option<Map<String, Value>> {
        self.state
            .lock()
            .expect("store lock")
            .documents
            .get(&(user_id.to_string(), doc_id.to_string()))
            .cloned()
    }

    pub fn fail_gets_with(&self, message: &str) {
        self.state.lock().expect("store lock").get_failure = Some(message.to_string());
    }

    pub fn merges(&self) -> Vec<MergeCall> {
        self.state.lock().expect("store lock").merges.clone()
    }

    pub fn listener_count(&self, user_id: &str) -> usize {
        self.state
            .lock()
            .expect("store lock")
            .listeners
            .iter()
            .filter(|(uid, tx)| uid == user_id && !tx.is_closed())
            .count()
    }

    pub async fn push_documents(&self, user_id: &str, documents: Vec<RemoteDocument>) {
        for tx in self.senders(user_id) {
            let _ = tx.send(Ok(documents.clone())).await;
        }
    }

    pub async fn push_error(&self, user_id: &str, message: &str) {
        for tx in self.senders(user_id) {
            let _ = tx.send(Err(ClientError::Store(message.to_string()))).await;
        }
    }

    pub async fn push(&self, user_id: &str) {
        let snapshot = self.collection(user_id);
        self.push_documents(user_id, snapshot).await;
    }

    fn senders(&self, user_id: &str) -> Vec<mpsc::Sender<Result<Vec<RemoteDocument>>>> {
        self.state
            .lock()
            .expect("store lock")
            .listeners
            .iter()
            .filter(|(uid, _)| uid == user_id)
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    fn collection(&self, user_id: &str) -> Vec<RemoteDocument> {
        self.state
            .lock()
            .expect("store lock")
            .documents
            .iter()
            .filter(|((uid, _), _)| uid == user_id)
            .map(|((_, id), fields)| RemoteDocument {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn listen(&self, user_id: &str) -> Result<SnapshotStream> {
        let (tx, rx) = mpsc::channel(16);
        let initial = self.collection(user_id);
        let _ = tx.send(Ok(initial)).await;
        self.state
            .lock()
            .expect("store lock")
            .listeners
            .push((user_id.to_string(), tx));
        Ok(rx)
    }

    async fn get(&self, user_id: &str, doc_id: &str) -> Result<Option<RemoteDocument>> {
        if let Some(message) = self.state.lock().expect("store lock").get_failure.clone() {
            return Err(ClientError::Store(message));
        }
        Ok(self.document(user_id, doc_id).map(|fields| RemoteDocument {
            id: doc_id.to_string(),
            fields,
        }))
    }

    async fn merge(&self, user_id: &str, doc_id: &str, fields: Map<String, Value>) -> Result<()> {
        let mut state = self.state.lock().expect("store lock");
        state.merges.push(MergeCall {
            user_id: user_id.to_string(),
            doc_id: doc_id.to_string(),
            fields: fields.clone(),
        });
        let entry = state
            .documents
            .entry((user_id.to_string(), doc_id.to_string()))
            .or_default();
        for (key, value) in fields {
            entry.insert(key, value);
        }
        Ok(())
    }
}
