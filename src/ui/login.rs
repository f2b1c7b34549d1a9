use crate::remote::IdentityProvider;
use crate::session::Identity;
use crate::theme::Theme;
use eframe::egui::{self, RichText};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

impl AuthMode {
    pub fn title(self) -> &'static str {
        match self {
            Self::SignIn => "Login",
            Self::SignUp => "Sign Up",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::SignIn => Self::SignUp,
            Self::SignUp => Self::SignIn,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub mode: AuthMode,
    pub pending: bool,
}

pub struct LoginSubmit {
    pub mode: AuthMode,
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggled();
    }

    pub fn toggle_label(&self) -> String {
        format!("Switch to {}", self.mode.toggled().title())
    }

    pub fn submission(&mut self) -> Option<LoginSubmit> {
        if self.pending {
            return None;
        }
        self.pending = true;
        Some(LoginSubmit {
            mode: self.mode,
            email: self.email.clone(),
            password: self.password.clone(),
        })
    }

    pub fn finish(&mut self) {
        self.pending = false;
        self.password.clear();
    }

    pub fn render(&mut self, ui: &mut egui::Ui, theme: &Theme) -> Option<LoginSubmit> {
        let mut submit = None;
        theme.card_frame().show(ui, |ui| {
            ui.set_max_width(360.0);
            ui.heading(self.mode.title());
            ui.add_space(theme.spacing_8);
            ui.add(egui::TextEdit::singleline(&mut self.email).hint_text("Email"));
            let password = ui.add(
                egui::TextEdit::singleline(&mut self.password)
                    .password(true)
                    .hint_text("Password"),
            );
            let enter = password.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

            ui.horizontal(|ui| {
                let clicked = ui
                    .add_enabled(!self.pending, egui::Button::new(self.mode.title()))
                    .clicked();
                if clicked || (enter && !self.pending) {
                    submit = self.submission();
                }
                if ui.button(self.toggle_label()).clicked() {
                    self.toggle_mode();
                }
            });

            if self.pending {
                ui.label(RichText::new("Signing in...").color(theme.text_muted));
            }
        });
        submit
    }
}

pub async fn authenticate(
    provider: &dyn IdentityProvider,
    submit: &LoginSubmit,
) -> Result<Identity, String> {
    let result = match submit.mode {
        AuthMode::SignIn => provider.sign_in(&submit.email, &submit.password).await,
        AuthMode::SignUp => provider.sign_up(&submit.email, &submit.password).await,
    };
    result.map_err(|err| {
        tracing::warn!(mode = submit.mode.title(), "authentication failed: {err}");
        format!("Auth failed: {err}")
    })
}
