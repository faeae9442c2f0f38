use bevy::ecs::system::SystemParam;
use bevy::math::DVec2;
use bevy::prelude::*;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::color::{ColorContext, star_color};
use crate::components::*;
use crate::physics::kinetic_energy;
use crate::quadtree::QuadTreeResource;
use crate::resources::*;

/// Bundled system params used when resetting the simulation.
#[derive(SystemParam)]
pub struct ResetParams<'w, 's> {
    pub commands: Commands<'w, 's>,
    pub meshes: ResMut<'w, Assets<Mesh>>,
    pub materials: ResMut<'w, Assets<ColorMaterial>>,
    pub settings: ResMut<'w, SimSettings>,
    pub sim_config: ResMut<'w, SimConfig>,
    pub bounds: ResMut<'w, SimulationBounds>,
    pub quadtree: ResMut<'w, QuadTreeResource>,
    pub energy: ResMut<'w, EnergyHistory>,
}

/// Initial velocity for a body at `position`: each axis points toward the
/// galaxy center, scaled down with distance from the domain origin, then
/// turned a quarter revolution so the disk spins.
pub fn swirl_velocity(position: DVec2, center: DVec2) -> DVec2 {
    let reach = position.length().max(1.0);
    let inward = DVec2::new(
        (center.x - position.x).signum(),
        (center.y - position.y).signum(),
    ) * SWIRL_STRENGTH
        / reach;
    DVec2::new(inward.y, -inward.x)
}

/// Samples `count` bodies uniformly over a disk.
pub fn sample_galaxy(rng: &mut impl Rng, count: usize, center: DVec2, radius: f64) -> Vec<Body> {
    (0..count)
        .map(|_| {
            let x = rng.random_range(center.x - radius..=center.x + radius);
            let offset = x - center.x;
            let half_chord = (radius * radius - offset * offset).max(0.0).sqrt();
            let y = rng.random_range(center.y - half_chord..=center.y + half_chord);
            let position = DVec2::new(x, y);
            Body::new(position, swirl_velocity(position, center))
        })
        .collect()
}

/// Spawns the initial galaxy as a disk in the middle of the domain.
pub fn spawn_simulation_bodies(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<ColorMaterial>,
    bounds: &SimulationBounds,
) {
    let mesh_handle = meshes.add(Circle::new(1.5));
    let mut rng = StdRng::from_os_rng();
    let center = bounds.region().midpoint();
    let bodies = sample_galaxy(&mut rng, NUM_BODIES, center, GALAXY_RADIUS);

    for body in bodies {
        let mat = materials.add(ColorMaterial::from(Color::WHITE));
        commands.spawn((
            Mesh2d(mesh_handle.clone()),
            MeshMaterial2d(mat),
            Transform::from_translation(bounds.to_world(body.position).extend(0.0)),
            body,
            Star,
        ));
    }

    info!(
        "spawned {} bodies in a {}x{} domain",
        NUM_BODIES, bounds.width, bounds.height
    );
}

/// Sets up camera and populates the simulation with initial bodies.
pub fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    bounds: Res<SimulationBounds>,
) {
    commands.spawn(Camera2d);
    spawn_simulation_bodies(&mut commands, &mut meshes, &mut materials, &bounds);
}

/// Rebuilds the quadtree over the domain and inserts every body. Bodies that
/// have left the domain are despawned.
pub fn rebuild_tree(
    mut commands: Commands,
    mut quadtree: ResMut<QuadTreeResource>,
    bounds: Res<SimulationBounds>,
    config: Res<SimConfig>,
    query: Query<(Entity, &Body)>,
) {
    quadtree.reset(bounds.region(), config.tree_config());

    for (entity, body) in query.iter() {
        if !quadtree.insert(entity, body.position) {
            warn!(
                "body {:?} at {:?} is outside the simulation domain, removing it",
                entity, body.position
            );
            commands.entity(entity).despawn();
        }
    }

    debug!(
        "quadtree rebuilt: {} nodes, {} bodies",
        quadtree.len(),
        quadtree.body_count()
    );
}

/// Advances every body held in the tree by one tick of the fixed clock.
pub fn step_bodies(
    quadtree: Res<QuadTreeResource>,
    mut bodies: Query<&mut Body>,
    time: Res<Time>,
    settings: Res<SimSettings>,
) {
    let dt = time.delta_secs_f64() * settings.time_scale;
    quadtree.step_simulation(dt, &mut bodies);
}

/// Appends the current total kinetic energy to the rolling history.
pub fn record_energy(
    bodies: Query<&Body>,
    config: Res<SimConfig>,
    mut history: ResMut<EnergyHistory>,
) {
    history.push(kinetic_energy(bodies.iter(), config.gravity_constant));
}

/// Copies body positions into render transforms.
pub fn sync_transforms(
    mut query: Query<(&Body, &mut Transform)>,
    bounds: Res<SimulationBounds>,
) {
    for (body, mut transform) in query.iter_mut() {
        transform.translation = bounds.to_world(body.position).extend(0.0);
    }
}

/// Recolors stars according to the selected color mode.
pub fn update_star_colors(
    query: Query<(&Body, &MeshMaterial2d<ColorMaterial>)>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    quadtree: Res<QuadTreeResource>,
    settings: Res<SimSettings>,
    config: Res<SimConfig>,
) {
    if quadtree.is_empty() {
        return;
    }

    let context = ColorContext {
        center_of_mass: quadtree.center_of_mass(),
        max_distance: settings.color_radius,
        max_speed: config.max_speed,
        tint: settings.galaxy_tint,
    };

    for (body, material) in query.iter() {
        if let Some(material) = materials.get_mut(&material.0) {
            material.color = star_color(settings.color_mode, body, &context);
        }
    }
}

/// Renders quadtree node bounds as rectangles when gizmo display is enabled.
pub fn draw_quadtree_gizmos(
    mut gizmos: Gizmos,
    quadtree: Res<QuadTreeResource>,
    bounds: Res<SimulationBounds>,
    settings: Res<SimSettings>,
) {
    if !settings.show_gizmos {
        return;
    }

    let color = Color::srgba(0.0, 1.0, 0.0, 0.1);
    for node in quadtree.nodes() {
        if !node.is_split() {
            continue;
        }
        let region = node.bounds;
        if region.width().max(region.height()) < MIN_GIZMO_NODE_SIZE {
            continue;
        }
        gizmos.rect_2d(
            Isometry2d::from_translation(bounds.to_world(region.midpoint())),
            Vec2::new(region.width() as f32, region.height() as f32),
            color,
        );
    }
}

/// Responds to a pending reset: clears entities, resets resources, and respawns bodies.
pub fn apply_reset_request(
    params: ResetParams,
    mut reset: ResMut<ResetSimulation>,
    query: Query<Entity, With<Body>>,
) {
    if !reset.pending {
        return;
    }
    reset.pending = false;

    let ResetParams {
        mut commands,
        mut meshes,
        mut materials,
        mut settings,
        mut sim_config,
        mut bounds,
        mut quadtree,
        mut energy,
    } = params;

    *settings = SimSettings::default();
    *sim_config = SimConfig::default();
    *bounds = SimulationBounds::default();
    quadtree.reset(bounds.region(), sim_config.tree_config());
    energy.clear();

    for entity in query.iter() {
        commands.entity(entity).despawn();
    }

    spawn_simulation_bodies(&mut commands, &mut meshes, &mut materials, &bounds);
}
