use bevy::prelude::*;
use bevy_egui::EguiContexts;
use bevy_egui::egui;

use crate::color::ColorMode;
use crate::quadtree::QuadTreeResource;
use crate::resources::{EnergyHistory, ResetSimulation, SimConfig, SimSettings};

const PLOT_HEIGHT: f32 = 80.0;

/// Draws the kinetic energy history as a polyline scaled to its own range.
fn energy_plot(ui: &mut egui::Ui, history: &EnergyHistory) {
    let width = ui.available_width();
    let (response, painter) =
        ui.allocate_painter(egui::vec2(width, PLOT_HEIGHT), egui::Sense::hover());
    let rect = response.rect;

    if history.samples.len() < 2 {
        return;
    }

    let (low, high) = history
        .samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), &sample| {
            (low.min(sample), high.max(sample))
        });
    let span = (high - low).max(f64::EPSILON);
    let step = rect.width() / (history.capacity.max(2) - 1) as f32;

    let points: Vec<egui::Pos2> = history
        .samples
        .iter()
        .enumerate()
        .map(|(i, &sample)| {
            let t = ((sample - low) / span) as f32;
            egui::pos2(rect.left() + i as f32 * step, rect.bottom() - t * rect.height())
        })
        .collect();

    painter.add(egui::Shape::line(
        points,
        egui::Stroke::new(1.5, egui::Color32::from_rgb(120, 200, 255)),
    ));
}

pub fn ui_controls(
    mut contexts: EguiContexts,
    mut settings: ResMut<SimSettings>,
    mut sim_config: ResMut<SimConfig>,
    mut frames_rendered: Local<usize>,
    mut reset: ResMut<ResetSimulation>,
    history: Res<EnergyHistory>,
    quadtree: Res<QuadTreeResource>,
) {
    if *frames_rendered < 5 {
        *frames_rendered += 1;
        return;
    }

    if let Ok(ctx) = contexts.ctx_mut() {
        egui::Window::new("Galaxy Controls")
            .default_pos(egui::pos2(10.0, 10.0))
            .max_size([320.0, 520.0])
            .vscroll(true)
            .show(ctx, |ui| {
                ui.heading("Simulation");
                ui.add(
                    egui::Slider::new(&mut settings.time_scale, 0.1..=5.0)
                        .text("Time Scale (Speed)"),
                );
                ui.add(
                    egui::Slider::new(&mut sim_config.gravity_constant, 1.0..=500.0)
                        .text("Gravity"),
                );
                ui.add(
                    egui::Slider::new(&mut sim_config.max_speed, 10.0..=1000.0)
                        .text("Max Speed"),
                );
                ui.add(
                    egui::Slider::new(&mut sim_config.theta, 0.0..=3.0)
                        .text("Theta (Approximation)"),
                );
                ui.add(
                    egui::Slider::new(&mut sim_config.softening_exponent, -3.0..=2.0)
                        .text("Softening (log10)"),
                );
                ui.label(format!("Bodies: {}", quadtree.body_count()));

                ui.separator();
                ui.heading("Colors");
                ui.horizontal(|ui| {
                    ui.radio_value(&mut settings.color_mode, ColorMode::Solid, "Solid");
                    ui.radio_value(&mut settings.color_mode, ColorMode::Radial, "Radial");
                    ui.radio_value(&mut settings.color_mode, ColorMode::Velocity, "Velocity");
                });
                ui.horizontal(|ui| {
                    ui.label("Galaxy tint");
                    ui.color_edit_button_rgb(&mut settings.galaxy_tint);
                });
                ui.add(
                    egui::Slider::new(&mut settings.color_radius, 10.0..=1000.0)
                        .text("Radial Falloff"),
                );
                ui.checkbox(&mut settings.show_gizmos, "Show QuadTree Grid");

                ui.separator();
                ui.heading("Kinetic Energy");
                if let Some(latest) = history.latest() {
                    ui.label(format!("{latest:.1}"));
                }
                energy_plot(ui, &history);

                ui.separator();
                if ui.button("Reset Simulation").clicked() {
                    *settings = SimSettings::default();
                    *sim_config = SimConfig::default();
                    reset.pending = true;
                }
            });
    }
}
