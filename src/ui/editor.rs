use crate::api::Gateway;
use crate::error::Result;
use crate::remote::DocumentStore;
use crate::session::{DocumentRecord, DocumentStatus};
use crate::theme::Theme;
use eframe::egui::{self, RichText};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

pub const NOT_COMPLETED_MESSAGE: &str = "Document not yet completed.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorState {
    Loading,
    Error(String),
    NotCompleted,
    Editable { text: String, saved: String },
}

impl EditorState {
    pub fn editable(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::Editable {
            saved: text.clone(),
            text,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Editable { text, .. } => Some(text),
            _ => None,
        }
    }
}

pub async fn fetch_brief(store: &dyn DocumentStore, user_id: &str, doc_id: &str) -> EditorState {
    let remote = match store.get(user_id, doc_id).await {
        Ok(Some(remote)) => remote,
        Ok(None) => return EditorState::Error("Error fetching brief: Document not found".to_string()),
        Err(err) => {
            tracing::warn!(doc_id, "failed to fetch brief: {err}");
            return EditorState::Error(format!("Error fetching brief: {err}"));
        }
    };
    let record = DocumentRecord::from_parts(&remote.id, &remote.fields);
    match record.status {
        DocumentStatus::Completed => EditorState::editable(record.brief.unwrap_or_default()),
        _ => EditorState::NotCompleted,
    }
}

pub async fn save_brief(
    store: &dyn DocumentStore,
    user_id: &str,
    doc_id: &str,
    text: &str,
) -> Result<()> {
    let mut fields = Map::new();
    fields.insert("brief".to_string(), Value::String(text.to_string()));
    store.merge(user_id, doc_id, fields).await?;
    tracing::info!(doc_id, "brief saved");
    Ok(())
}

pub async fn export_brief(gateway: &dyn Gateway, token: &str, doc_id: &str) -> Result<Vec<u8>> {
    gateway.export_brief(token, doc_id).await
}

pub enum EditorAction {
    Save(String),
    Export,
    Close,
}

pub struct Editor {
    doc_id: String,
    state: EditorState,
    cancel: CancellationToken,
    saving: bool,
    exporting: bool,
    notice: Option<(String, bool)>,
}

impl Editor {
    pub fn open(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            state: EditorState::Loading,
            cancel: CancellationToken::new(),
            saving: false,
            exporting: false,
            notice: None,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_dirty(&self) -> bool {
        matches!(&self.state, EditorState::Editable { text, saved } if text != saved)
    }

    #[cfg(test)]
    fn is_saving(&self) -> bool {
        self.saving
    }

    #[cfg(test)]
    fn is_exporting(&self) -> bool {
        self.exporting
    }

    #[cfg(test)]
    fn notice(&self) -> Option<&str> {
        self.notice.as_ref().map(|(message, _)| message.as_str())
    }

    pub fn loaded(&mut self, state: EditorState) {
        if self.is_closed() {
            return;
        }
        self.state = state;
    }

    #[cfg(test)]
    fn edit(&mut self, new_text: &str) {
        if let EditorState::Editable { text, .. } = &mut self.state {
            *text = new_text.to_string();
        }
    }

    pub fn begin_save(&mut self) -> Option<String> {
        if self.saving || self.is_closed() {
            return None;
        }
        let text = self.state.text()?.to_string();
        self.saving = true;
        Some(text)
    }

    pub fn save_finished(&mut self, text: &str, result: std::result::Result<(), String>) {
        self.saving = false;
        match result {
            Ok(()) => {
                if let EditorState::Editable { saved, .. } = &mut self.state {
                    *saved = text.to_string();
                }
                self.notice = Some(("Brief saved.".to_string(), false));
            }
            Err(message) => self.notice = Some((format!("Save failed: {message}"), true)),
        }
    }

    pub fn begin_export(&mut self) -> bool {
        if self.exporting || self.is_closed() || self.state.text().is_none() {
            return false;
        }
        self.exporting = true;
        true
    }

    pub fn export_finished(&mut self, result: std::result::Result<String, String>) {
        self.exporting = false;
        self.notice = Some(match result {
            Ok(path) => (format!("Saved {path}"), false),
            Err(message) => (format!("Export failed: {message}"), true),
        });
    }

    pub fn render(&mut self, ui: &mut egui::Ui, theme: &Theme) -> Option<EditorAction> {
        let mut action = None;
        ui.horizontal(|ui| {
            ui.heading("Case Brief Editor");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Close").clicked() {
                    action = Some(EditorAction::Close);
                }
            });
        });
        ui.add_space(theme.spacing_8);

        match &mut self.state {
            EditorState::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading brief...");
                });
            }
            EditorState::Error(message) => {
                ui.label(RichText::new(message.as_str()).color(theme.danger));
            }
            EditorState::NotCompleted => {
                ui.label(RichText::new(NOT_COMPLETED_MESSAGE).color(theme.warning));
            }
            EditorState::Editable { text, .. } => {
                ui.label(RichText::new("Editable Brief").strong());
                egui::ScrollArea::vertical()
                    .id_salt("brief-editor")
                    .max_height((ui.available_height() - 80.0).max(120.0))
                    .show(ui, |ui| {
                        ui.add(
                            egui::TextEdit::multiline(text)
                                .desired_rows(20)
                                .desired_width(f32::INFINITY),
                        );
                    });
            }
        }

        if self.state.text().is_some() {
            ui.add_space(theme.spacing_8);
            ui.horizontal(|ui| {
                let label = if self.is_dirty() { "Save *" } else { "Save" };
                if ui.add_enabled(!self.saving, egui::Button::new(label)).clicked() {
                    if let Some(text) = self.begin_save() {
                        action = Some(EditorAction::Save(text));
                    }
                }
                let export = ui.add_enabled(!self.exporting, egui::Button::new("Download as .docx"));
                if export.clicked() && self.begin_export() {
                    action = Some(EditorAction::Export);
                }
                if self.saving || self.exporting {
                    ui.spinner();
                }
            });
        }

        if let Some((message, is_error)) = &self.notice {
            let color = if *is_error { theme.danger } else { theme.success };
            ui.label(RichText::new(message.as_str()).color(color));
        }
        action
    }
}
