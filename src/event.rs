use crate::session::StoreState;
use crate::ui::editor::EditorState;
use crate::ui::upload::UploadOutcome;
use eframe::egui;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, OnceLock};

#[derive(Debug, Clone)]
pub enum AppEvent {
    StateChanged(StoreState),
    AuthFinished(Result<(), String>),
    SignOutFailed(String),
    UploadFinished(UploadOutcome),
    BriefLoaded {
        doc_id: String,
        state: EditorState,
    },
    BriefSaved {
        doc_id: String,
        text: String,
        result: Result<(), String>,
    },
    BriefExported {
        doc_id: String,
        result: Result<PathBuf, String>,
    },
}

#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<AppEvent>,
    repaint: Arc<OnceLock<egui::Context>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            tx,
            repaint: Arc::new(OnceLock::new()),
        }
    }

    pub fn attach(&self, ctx: egui::Context) {
        let _ = self.repaint.set(ctx);
    }

    pub fn send(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped");
            return;
        }
        if let Some(ctx) = self.repaint.get() {
            ctx.request_repaint();
        }
    }
}
