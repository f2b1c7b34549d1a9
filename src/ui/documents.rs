use crate::session::{DocumentRecord, DocumentStatus};
use crate::theme::Theme;
use eframe::egui::{self, RichText};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub id: String,
    pub label: String,
    pub status: DocumentStatus,
    pub error: Option<String>,
    pub openable: bool,
}

impl DocumentRow {
    pub fn from_record(record: &DocumentRecord) -> Self {
        let error = match record.status {
            DocumentStatus::Failed => record.error.clone(),
            _ => None,
        };
        Self {
            id: record.id.clone(),
            label: record.display_name().to_string(),
            status: record.status.clone(),
            error,
            openable: record.status.is_completed(),
        }
    }
}

pub fn rows(documents: &[DocumentRecord]) -> Vec<DocumentRow> {
    documents.iter().map(DocumentRow::from_record).collect()
}

#[derive(Debug, Default)]
pub struct DocumentList {
    selected: Option<String>,
}

impl DocumentList {
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    // Returns true when the selection actually changed.
    pub fn select(&mut self, doc_id: &str) -> bool {
        if self.selected.as_deref() == Some(doc_id) {
            return false;
        }
        self.selected = Some(doc_id.to_string());
        true
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn render(
        &mut self,
        ui: &mut egui::Ui,
        theme: &Theme,
        documents: &[DocumentRecord],
    ) -> Option<String> {
        let mut opened = None;
        ui.label(RichText::new("Your Documents").strong());
        if documents.is_empty() {
            ui.label(RichText::new("No documents yet.").color(theme.text_muted));
            return None;
        }

        egui::ScrollArea::vertical()
            .id_salt("document-list")
            .auto_shrink([false, true])
            .show(ui, |ui| {
                for row in rows(documents) {
                    let selected = self.selected.as_deref() == Some(row.id.as_str());
                    let fill = if selected { theme.surface_3 } else { theme.surface_2 };
                    theme.panel_frame(fill, theme.spacing_8 as i8).show(ui, |ui| {
                        ui.set_width(ui.available_width());
                        ui.horizontal(|ui| {
                            ui.label(RichText::new(&row.label).strong());
                            ui.label(
                                RichText::new(row.status.as_str())
                                    .color(theme.status_color(&row.status)),
                            );
                            if row.openable && ui.button("View & Edit").clicked() && self.select(&row.id) {
                                opened = Some(row.id.clone());
                            }
                        });
                        if let Some(error) = &row.error {
                            ui.label(RichText::new(error).color(theme.danger).small());
                        }
                    });
                    ui.add_space(theme.spacing_4);
                }
            });
        opened
    }
}
