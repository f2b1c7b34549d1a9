use crate::error::Result;
use crate::session::Identity;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
pub mod fake;
pub mod firebase_auth;
pub mod firestore;

pub type SnapshotStream = mpsc::Receiver<Result<Vec<RemoteDocument>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_out(&self) -> Result<()>;

    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;

    async fn id_token(&self) -> Result<String>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    // Pushes the full collection whenever it changes. Dropping the
    // receiver ends the query.
    async fn listen(&self, user_id: &str) -> Result<SnapshotStream>;

    async fn get(&self, user_id: &str, doc_id: &str) -> Result<Option<RemoteDocument>>;

    async fn merge(&self, user_id: &str, doc_id: &str, fields: Map<String, Value>) -> Result<()>;
}

pub struct Subscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn dispose(mut self) {
        self.cancel_task();
    }

    fn cancel_task(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_task();
    }
}
