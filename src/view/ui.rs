use egui::Context;

use crate::config::LightingSettings;
use crate::controller::OverlayText;

/// Something the user asked for through the menus or panels.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    LoadModel,
    AddPrimitive(String),
    UnloadModel,
    LoadVertexShader,
    LoadFragmentShader,
    ReloadShaders,
    Screenshot,
    ReloadSettings,
    ResetView,
    SetLighting(LightingSettings),
    DismissError,
    Quit,
}

/// Read-only view of the session for one UI pass.
pub struct UiFrame<'a> {
    pub overlay: &'a OverlayText,
    pub lighting: &'a LightingSettings,
    pub primitives: &'a [String],
    pub vertex_shader: &'a str,
    pub fragment_shader: &'a str,
    pub error: Option<&'a str>,
    pub status: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct UiOutput {
    pub actions: Vec<UiAction>,
    /// A menu was open this pass; held input must be dropped.
    pub menu_open: bool,
}

/// Build the menu bar, overlay text and message panels.
pub fn build_ui(ctx: &Context, frame: &UiFrame) -> UiOutput {
    let mut out = UiOutput::default();
    draw_menu_bar(ctx, frame, &mut out);
    draw_error_panel(ctx, frame, &mut out);
    draw_overlay(ctx, frame);
    out
}

fn draw_menu_bar(ctx: &Context, frame: &UiFrame, out: &mut UiOutput) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::MenuBar::new().ui(ui, |ui| {
            let file = ui.menu_button("File", |ui| {
                if ui.button("Load Model…").clicked() {
                    out.actions.push(UiAction::LoadModel);
                    ui.close();
                }
                ui.menu_button("Primitive", |ui| {
                    if frame.primitives.is_empty() {
                        ui.label("no primitives found");
                    }
                    for name in frame.primitives {
                        if ui.button(name).clicked() {
                            out.actions.push(UiAction::AddPrimitive(name.clone()));
                            ui.close();
                        }
                    }
                });
                if ui.button("Unload Model").clicked() {
                    out.actions.push(UiAction::UnloadModel);
                    ui.close();
                }
                ui.separator();
                if ui.button("Load Vertex Shader…").clicked() {
                    out.actions.push(UiAction::LoadVertexShader);
                    ui.close();
                }
                if ui.button("Load Fragment Shader…").clicked() {
                    out.actions.push(UiAction::LoadFragmentShader);
                    ui.close();
                }
                if ui.button("Reload Shaders").clicked() {
                    out.actions.push(UiAction::ReloadShaders);
                    ui.close();
                }
                ui.separator();
                if ui.button("Screenshot").clicked() {
                    out.actions.push(UiAction::Screenshot);
                    ui.close();
                }
                if ui.button("Quit").clicked() {
                    out.actions.push(UiAction::Quit);
                    ui.close();
                }
            });
            let view = ui.menu_button("View", |ui| {
                if ui.button("Reset").clicked() {
                    out.actions.push(UiAction::ResetView);
                    ui.close();
                }
            });
            let settings = ui.menu_button("Settings", |ui| {
                if let Some(lighting) = lighting_controls(ui, frame.lighting) {
                    out.actions.push(UiAction::SetLighting(lighting));
                }
                ui.separator();
                if ui.button("Reload Settings").clicked() {
                    out.actions.push(UiAction::ReloadSettings);
                    ui.close();
                }
            });
            out.menu_open = file.inner.is_some() || view.inner.is_some() || settings.inner.is_some();
        });
    });
}

/// Sliders for the ADS lighting terms. Returns the edited copy on change.
fn lighting_controls(ui: &mut egui::Ui, current: &LightingSettings) -> Option<LightingSettings> {
    let mut lighting = current.clone();
    let mut changed = false;

    ui.label("Lighting");
    changed |= ui.add(egui::Slider::new(&mut lighting.ka, 0.0..=1.0).text("ambient")).changed();
    changed |= ui.add(egui::Slider::new(&mut lighting.kd, 0.0..=1.0).text("diffuse")).changed();
    changed |= ui.add(egui::Slider::new(&mut lighting.ks, 0.0..=1.0).text("specular")).changed();
    changed |= ui.add(egui::Slider::new(&mut lighting.shininess, 1.0..=128.0).text("shininess")).changed();
    ui.horizontal(|ui| {
        ui.label("light");
        for axis in lighting.light_position.iter_mut() {
            changed |= ui.add(egui::DragValue::new(axis).speed(0.05)).changed();
        }
    });
    ui.horizontal(|ui| {
        ui.label("colour");
        changed |= ui.color_edit_button_rgba_unmultiplied(&mut lighting.ad_color).changed();
        ui.label("specular");
        changed |= ui.color_edit_button_rgba_unmultiplied(&mut lighting.specular_color).changed();
    });

    changed.then_some(lighting)
}

fn draw_error_panel(ctx: &Context, frame: &UiFrame, out: &mut UiOutput) {
    let Some(error) = frame.error else {
        return;
    };
    egui::TopBottomPanel::top("error_panel").show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.colored_label(egui::Color32::from_rgb(230, 80, 80), error);
            if ui.small_button("✕").clicked() {
                out.actions.push(UiAction::DismissError);
            }
        });
    });
}

fn draw_overlay(ctx: &Context, frame: &UiFrame) {
    egui::Area::new(egui::Id::new("overlay"))
        .anchor(egui::Align2::LEFT_BOTTOM, [8.0, -8.0])
        .interactable(false)
        .show(ctx, |ui| {
            for line in frame.overlay.lines() {
                ui.label(egui::RichText::new(line).small().color(egui::Color32::WHITE));
            }
            ui.label(
                egui::RichText::new(format!("{} | {}", frame.vertex_shader, frame.fragment_shader))
                    .small()
                    .color(egui::Color32::LIGHT_GRAY),
            );
            if let Some(status) = frame.status {
                ui.label(egui::RichText::new(status).small().color(egui::Color32::LIGHT_GREEN));
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(frame: &UiFrame) -> UiOutput {
        let ctx = Context::default();
        let mut output = UiOutput::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            output = build_ui(ctx, frame);
        });
        output
    }

    #[test]
    fn test_idle_pass_requests_nothing() {
        let overlay = OverlayText { fps: 60, model_size: None };
        let lighting = LightingSettings::default();
        let frame = UiFrame {
            overlay: &overlay,
            lighting: &lighting,
            primitives: &["cube.obj".to_string()],
            vertex_shader: "ads.vert.wgsl",
            fragment_shader: "ads.frag.wgsl",
            error: Some("failed to link shader program"),
            status: None,
        };
        let output = run(&frame);
        assert!(output.actions.is_empty());
        assert!(!output.menu_open);
    }
}
