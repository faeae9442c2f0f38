mod color;
mod components;
mod physics;
mod quadtree;
mod resources;
mod systems;

use bevy::prelude::*;
use bevy::window::WindowResolution;
use bevy_egui::{EguiPlugin, EguiPrimaryContextPass};

use crate::quadtree::QuadTreeResource;
use crate::resources::{DEFAULT_DT, DOMAIN_HEIGHT, DOMAIN_WIDTH, SimulationBounds};
use crate::resources::{EnergyHistory, ResetSimulation, SimConfig, SimSettings};
use crate::systems::*;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Galaxy Modeller".into(),
                resolution: WindowResolution::new(DOMAIN_WIDTH as u32, DOMAIN_HEIGHT as u32),
                resizable: false,
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin::default())
        .insert_resource(ClearColor(Color::BLACK))
        .init_resource::<SimConfig>()
        .init_resource::<SimulationBounds>()
        .init_resource::<QuadTreeResource>()
        .init_resource::<SimSettings>()
        .init_resource::<EnergyHistory>()
        .init_resource::<ResetSimulation>()
        .add_systems(EguiPrimaryContextPass, ui_controls)
        .add_systems(Startup, setup_scene)
        .add_systems(
            Update,
            (
                apply_reset_request,
                (sync_transforms, update_star_colors, draw_quadtree_gizmos)
                    .chain()
                    .after(apply_reset_request),
            ),
        )
        .add_systems(
            FixedUpdate,
            (rebuild_tree, step_bodies, record_energy).chain(),
        )
        .insert_resource(Time::<Fixed>::from_seconds(DEFAULT_DT))
        .run();
}
