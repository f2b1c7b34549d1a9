use crate::client::CaseBriefClient;
use crate::event::AppEvent;
use crate::session::{Identity, StoreState};
use crate::theme::Theme;
use crate::ui::documents::DocumentList;
use crate::ui::editor::{Editor, EditorAction};
use crate::ui::login::LoginForm;
use crate::ui::upload::UploadZone;
use eframe::egui::{self, RichText, ScrollArea};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CaseBriefApp {
    rx: Receiver<AppEvent>,
    client: CaseBriefClient,
    theme: Theme,
    state: StoreState,
    login: LoginForm,
    upload: UploadZone,
    documents: DocumentList,
    editor: Option<Editor>,
    alert: Option<String>,
    diagnostics_log: Vec<String>,
}

pub fn welcome_line(identity: &Identity) -> String {
    format!("Welcome, {}", identity.email.as_deref().unwrap_or("User"))
}

impl CaseBriefApp {
    pub fn new(rx: Receiver<AppEvent>, client: CaseBriefClient, ctx: &egui::Context) -> Self {
        let theme = Theme::default();
        theme.apply_visuals(ctx);
        client.events().attach(ctx.clone());

        Self {
            rx,
            client,
            theme,
            state: StoreState::default(),
            login: LoginForm::default(),
            upload: UploadZone::default(),
            documents: DocumentList::default(),
            editor: None,
            alert: None,
            diagnostics_log: Vec::new(),
        }
    }

    fn timestamp() -> String {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_secs().to_string(),
            Err(_) => "0".to_string(),
        }
    }

    fn log_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics_log
            .push(format!("[{}] {}", Self::timestamp(), message.into()));
    }

    fn close_editor(&mut self) {
        if let Some(editor) = self.editor.take() {
            editor.close();
        }
        self.documents.clear();
    }

    fn open_editor(&mut self, doc_id: String) {
        if let Some(previous) = self.editor.take() {
            previous.close();
        }
        let editor = Editor::open(doc_id.clone());
        self.client.open_brief(doc_id, editor.cancel_token());
        self.editor = Some(editor);
    }

    // Results for a closed or replaced editor are dropped.
    fn editor_for(&mut self, doc_id: &str) -> Option<&mut Editor> {
        self.editor
            .as_mut()
            .filter(|editor| editor.doc_id() == doc_id && !editor.is_closed())
    }

    fn drain_events(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.apply_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.log_diagnostic("event channel disconnected");
                    break;
                }
            }
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::StateChanged(state) => {
                let previous = self.state.identity.as_ref().map(|identity| identity.uid.clone());
                let current = state.identity.as_ref().map(|identity| identity.uid.clone());
                if previous != current {
                    self.close_editor();
                    self.upload = UploadZone::default();
                    self.log_diagnostic(match &current {
                        Some(uid) => format!("signed in as {uid}"),
                        None => "signed out".to_string(),
                    });
                }
                self.state = state;
            }
            AppEvent::AuthFinished(result) => {
                self.login.finish();
                if let Err(message) = result {
                    self.log_diagnostic(message.clone());
                    self.alert = Some(message);
                }
            }
            AppEvent::SignOutFailed(message) => {
                self.log_diagnostic(message.clone());
                self.alert = Some(message);
            }
            AppEvent::UploadFinished(outcome) => {
                self.log_diagnostic(outcome.message());
                self.upload.finish(outcome);
            }
            AppEvent::BriefLoaded { doc_id, state } => {
                if let Some(editor) = self.editor_for(&doc_id) {
                    editor.loaded(state);
                }
            }
            AppEvent::BriefSaved {
                doc_id,
                text,
                result,
            } => {
                if let Err(message) = &result {
                    self.log_diagnostic(format!("save failed for {doc_id}: {message}"));
                }
                if let Some(editor) = self.editor_for(&doc_id) {
                    editor.save_finished(&text, result);
                }
            }
            AppEvent::BriefExported { doc_id, result } => {
                let result = result.map(|path| path.display().to_string());
                if let Ok(path) = &result {
                    self.log_diagnostic(format!("exported {doc_id} to {path}"));
                }
                if let Some(editor) = self.editor_for(&doc_id) {
                    editor.export_finished(result);
                }
            }
        }
    }

    fn render_top_bar(&mut self, ctx: &egui::Context) {
        let mut sign_out = false;
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(self.theme.spacing_4);
            ui.horizontal(|ui| {
                ui.heading("CaseBrief AI");
                if let Some(identity) = &self.state.identity {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        sign_out = ui.button("Sign Out").clicked();
                        ui.label(welcome_line(identity));
                    });
                }
            });
            ui.add_space(self.theme.spacing_4);
        });
        if sign_out {
            self.client.sign_out();
        }
    }

    fn render_diagnostics(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("diagnostics").show(ctx, |ui| {
            egui::CollapsingHeader::new("Diagnostics")
                .default_open(false)
                .show(ui, |ui| {
                    ScrollArea::vertical()
                        .id_salt("diagnostics_log")
                        .max_height(90.0)
                        .stick_to_bottom(true)
                        .show(ui, |ui| {
                            for entry in &self.diagnostics_log {
                                ui.label(RichText::new(entry).small());
                            }
                        });
                });
        });
    }

    fn render_login(&mut self, ctx: &egui::Context) {
        let mut submit = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(ui.available_height() * 0.2);
            ui.vertical_centered(|ui| {
                submit = self.login.render(ui, &self.theme);
            });
        });
        if let Some(submit) = submit {
            self.client.authenticate(submit);
        }
    }

    fn render_dashboard(&mut self, ctx: &egui::Context) {
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .map(|file| file.path.clone().unwrap_or_else(|| PathBuf::from(&file.name)))
                .collect()
        });

        let mut upload = None;
        let mut opened = None;
        egui::SidePanel::left("documents_panel")
            .resizable(true)
            .default_width(360.0)
            .show(ctx, |ui| {
                ui.add_space(self.theme.spacing_12);
                upload = self.upload.render(ui, &self.theme, dropped);
                ui.add_space(self.theme.spacing_12);
                opened = self.documents.render(ui, &self.theme, &self.state.documents);
            });
        if let Some(path) = upload {
            self.client.upload(path);
        }
        if let Some(doc_id) = opened {
            self.open_editor(doc_id);
        }

        let mut action = None;
        egui::CentralPanel::default().show(ctx, |ui| match self.editor.as_mut() {
            Some(editor) => action = editor.render(ui, &self.theme),
            None => {
                ui.centered_and_justified(|ui| {
                    ui.label(
                        RichText::new("Select a completed document to view its brief.")
                            .color(self.theme.text_muted),
                    );
                });
            }
        });

        let Some(editor) = self.editor.as_ref() else {
            return;
        };
        let doc_id = editor.doc_id().to_string();
        let cancel = editor.cancel_token();
        match action {
            Some(EditorAction::Save(text)) => self.client.save_brief(doc_id, text, cancel),
            Some(EditorAction::Export) => self.client.export_brief(doc_id, cancel),
            Some(EditorAction::Close) => self.close_editor(),
            None => {}
        }
    }

    fn render_alert(&mut self, ctx: &egui::Context) {
        let Some(message) = self.alert.clone() else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new("Error")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(RichText::new(message).color(self.theme.danger));
                dismissed = ui.button("OK").clicked();
            });
        if dismissed {
            self.alert = None;
        }
    }
}

impl eframe::App for CaseBriefApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        self.render_top_bar(ctx);
        self.render_diagnostics(ctx);
        if self.state.identity.is_some() {
            self.render_dashboard(ctx);
        } else {
            self.render_login(ctx);
        }
        self.render_alert(ctx);
    }
}

impl Drop for CaseBriefApp {
    fn drop(&mut self) {
        if let Some(editor) = self.editor.take() {
            editor.close();
        }
        self.client.shutdown();
    }
}
