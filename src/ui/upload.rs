use crate::api::{Gateway, JobAccepted, UploadFile};
use crate::theme::Theme;
use eframe::egui::{self, RichText};
use std::path::{Path, PathBuf};

pub const INVALID_FILE_MESSAGE: &str = "Please select a valid PDF file.";
pub const STARTED_MESSAGE: &str =
    "Document processing started! It will appear in your list shortly.";
pub const DROP_PROMPT: &str = "Drag & drop a PDF file here, or type its path and press Upload";
pub const PATH_ENTRY_HINT: &str = "Type a PDF path, e.g. /home/me/opinion.pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Rejected(String),
    Started(JobAccepted),
    Failed(String),
}

impl UploadOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Rejected(message) => message.clone(),
            Self::Started(_) => STARTED_MESSAGE.to_string(),
            Self::Failed(message) => format!("Upload failed: {message}"),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Started(_))
    }
}

pub fn is_pdf_name(name: &str) -> bool {
    name.ends_with(".pdf")
}

// Exactly one file per interaction; the suffix check is case-sensitive.
pub fn validate_selection(files: &[PathBuf]) -> Result<PathBuf, UploadOutcome> {
    let [file] = files else {
        return Err(UploadOutcome::Rejected(INVALID_FILE_MESSAGE.to_string()));
    };
    let accepted = file
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(is_pdf_name);
    if accepted {
        Ok(file.clone())
    } else {
        Err(UploadOutcome::Rejected(INVALID_FILE_MESSAGE.to_string()))
    }
}

pub async fn upload_file(gateway: &dyn Gateway, token: Option<&str>, path: &Path) -> UploadOutcome {
    let Some(token) = token else {
        return UploadOutcome::Rejected("Not signed in.".to_string());
    };
    let file = match UploadFile::read(path) {
        Ok(file) => file,
        Err(err) => return UploadOutcome::Failed(err.to_string()),
    };
    match gateway.upload_document(token, file).await {
        Ok(accepted) => {
            tracing::info!(doc_id = ?accepted.doc_id, "upload accepted");
            UploadOutcome::Started(accepted)
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), "upload failed: {err}");
            UploadOutcome::Failed(err.to_string())
        }
    }
}

#[derive(Debug, Default)]
pub struct UploadZone {
    pub path_input: String,
    pub notice: Option<UploadOutcome>,
    pub in_flight: bool,
}

impl UploadZone {
    // Returns the file to upload, or records the rejection.
    pub fn select(&mut self, files: &[PathBuf]) -> Option<PathBuf> {
        if self.in_flight {
            return None;
        }
        match validate_selection(files) {
            Ok(path) => {
                self.notice = None;
                self.in_flight = true;
                Some(path)
            }
            Err(rejected) => {
                self.notice = Some(rejected);
                None
            }
        }
    }

    pub fn select_typed_path(&mut self) -> Option<PathBuf> {
        let typed = self.path_input.trim();
        if typed.is_empty() {
            return None;
        }
        let path = PathBuf::from(typed);
        self.select(&[path])
    }

    pub fn finish(&mut self, outcome: UploadOutcome) {
        self.in_flight = false;
        if !outcome.is_error() {
            self.path_input.clear();
        }
        self.notice = Some(outcome);
    }

    pub fn render(&mut self, ui: &mut egui::Ui, theme: &Theme, dropped: Vec<PathBuf>) -> Option<PathBuf> {
        let mut selected = None;
        if !dropped.is_empty() {
            selected = self.select(&dropped);
        }

        let hovering = ui.ctx().input(|i| !i.raw.hovered_files.is_empty());
        theme.drop_zone_frame(hovering).show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.vertical_centered(|ui| {
                let prompt = if hovering {
                    "Drop the PDF here..."
                } else {
                    DROP_PROMPT
                };
                ui.label(RichText::new(prompt).color(theme.text_muted));
            });
            ui.add_space(theme.spacing_8);
            ui.horizontal(|ui| {
                ui.add(
                    egui::TextEdit::singleline(&mut self.path_input)
                        .hint_text(PATH_ENTRY_HINT)
                        .desired_width(ui.available_width() - 90.0),
                );
                let ready = !self.in_flight && !self.path_input.trim().is_empty();
                if ui.add_enabled(ready, egui::Button::new("Upload")).clicked() {
                    selected = self.select_typed_path();
                }
            });

            if self.in_flight {
                ui.label(RichText::new("Uploading...").color(theme.text_muted));
            }
            if let Some(notice) = &self.notice {
                let color = if notice.is_error() {
                    theme.danger
                } else {
                    theme.success
                };
                ui.label(RichText::new(notice.message()).color(color));
            }
        });
        selected
    }
}
