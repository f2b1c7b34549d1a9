use crate::session::DocumentStatus;
use eframe::egui::{self, Color32, CornerRadius, FontId, Frame, Margin, Stroke, TextStyle};

#[derive(Debug, Clone)]
pub struct Theme {
    pub surface_1: Color32,
    pub surface_2: Color32,
    pub surface_3: Color32,
    pub accent_primary: Color32,
    pub accent_muted: Color32,
    pub success: Color32,
    pub warning: Color32,
    pub danger: Color32,
    pub text_primary: Color32,
    pub text_muted: Color32,
    pub border_subtle: Color32,
    pub spacing_4: f32,
    pub spacing_8: f32,
    pub spacing_12: f32,
    pub spacing_16: f32,
    pub radius_10: u8,
    pub radius_12: u8,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            surface_1: Color32::from_rgb(0xF4, 0xF6, 0xF9),
            surface_2: Color32::from_rgb(0xFF, 0xFF, 0xFF),
            surface_3: Color32::from_rgb(0xE3, 0xEB, 0xF7),
            accent_primary: Color32::from_rgb(0x25, 0x63, 0xEB),
            accent_muted: Color32::from_rgb(0x1D, 0x4E, 0xD8),
            success: Color32::from_rgb(0x16, 0xA3, 0x4A),
            warning: Color32::from_rgb(0xD9, 0x77, 0x06),
            danger: Color32::from_rgb(0xDC, 0x26, 0x26),
            text_primary: Color32::from_rgb(0x1F, 0x29, 0x37),
            text_muted: Color32::from_rgb(0x6B, 0x72, 0x80),
            border_subtle: Color32::from_rgb(0xD1, 0xD5, 0xDB),
            spacing_4: 4.0,
            spacing_8: 8.0,
            spacing_12: 12.0,
            spacing_16: 16.0,
            radius_10: 10,
            radius_12: 12,
        }
    }
}

impl Theme {
    pub fn apply_visuals(&self, ctx: &egui::Context) {
        let mut visuals = egui::Visuals::light();
        visuals.panel_fill = self.surface_1;
        visuals.override_text_color = Some(self.text_primary);
        visuals.widgets.noninteractive.bg_fill = self.surface_2;
        visuals.widgets.noninteractive.bg_stroke = Stroke::new(1.0, self.border_subtle);
        visuals.widgets.inactive.bg_fill = self.surface_3;
        visuals.widgets.inactive.weak_bg_fill = self.surface_3;
        visuals.widgets.hovered.weak_bg_fill = self.accent_primary;
        visuals.widgets.hovered.fg_stroke.color = Color32::WHITE;
        visuals.widgets.active.weak_bg_fill = self.accent_muted;
        visuals.widgets.active.fg_stroke.color = Color32::WHITE;
        visuals.selection.bg_fill = self.surface_3;
        visuals.hyperlink_color = self.accent_primary;
        visuals.window_fill = self.surface_2;
        visuals.window_corner_radius = CornerRadius::same(self.radius_10);

        let mut style = (*ctx.style()).clone();
        style.visuals = visuals;
        style.spacing.item_spacing = egui::vec2(10.0, 8.0);
        style.spacing.button_padding = egui::vec2(12.0, 6.0);
        style.text_styles.insert(TextStyle::Heading, FontId::proportional(20.0));
        style.text_styles.insert(TextStyle::Body, FontId::proportional(14.0));
        style.text_styles.insert(TextStyle::Monospace, FontId::monospace(13.0));
        style.text_styles.insert(TextStyle::Small, FontId::proportional(12.0));
        ctx.set_style(style);
    }

    pub fn panel_frame(&self, fill: Color32, inner_padding: i8) -> Frame {
        Frame::new()
            .fill(fill)
            .inner_margin(Margin::same(inner_padding))
            .corner_radius(CornerRadius::same(self.radius_12))
            .stroke(Stroke::new(1.0, self.border_subtle))
    }

    pub fn card_frame(&self) -> Frame {
        self.panel_frame(self.surface_2, self.spacing_16 as i8)
    }

    pub fn drop_zone_frame(&self, hovering: bool) -> Frame {
        let (fill, stroke) = if hovering {
            (self.surface_3, self.accent_primary)
        } else {
            (self.surface_2, self.border_subtle)
        };
        Frame::new()
            .fill(fill)
            .inner_margin(Margin::same(self.spacing_16 as i8))
            .corner_radius(CornerRadius::same(self.radius_10))
            .stroke(Stroke::new(2.0, stroke))
    }

    pub fn status_color(&self, status: &DocumentStatus) -> Color32 {
        match status {
            DocumentStatus::Completed => self.success,
            DocumentStatus::Failed => self.danger,
            DocumentStatus::Processing => self.accent_primary,
            DocumentStatus::Pending => self.warning,
            DocumentStatus::Other(_) => self.text_muted,
        }
    }
}
