use bevy::math::DVec2;
use bevy::prelude::*;
use std::collections::VecDeque;

use crate::color::ColorMode;
use crate::quadtree::{Region, TreeConfig};

/// Tunable runtime simulation parameters.
#[derive(Resource, Clone, Copy, Debug)]
pub struct SimConfig {
    /// Mass of every body; folds the gravitational constant in.
    pub gravity_constant: f64,
    /// Per-axis velocity cap.
    pub max_speed: f64,
    /// Barnes-Hut opening threshold (node size / distance).
    pub theta: f64,
    /// Softening length is `10^softening_exponent`.
    pub softening_exponent: f64,
}

// --- Simulation Defaults ---
/// Default per-body point mass.
pub const DEFAULT_GRAVITY_CONSTANT: f64 = 50.0;
/// Default per-axis speed cap.
pub const DEFAULT_MAX_SPEED: f64 = 200.0;
/// Default Barnes-Hut theta threshold.
pub const DEFAULT_THETA: f64 = 1.0;
/// Default log10 of the softening length.
pub const DEFAULT_SOFTENING_EXPONENT: f64 = 1.0;
/// Fixed timestep for physics; each tick integrates over the fixed clock's delta.
pub const DEFAULT_DT: f64 = 1.0 / 60.0;
/// Simulation domain size; also the window size.
pub const DOMAIN_WIDTH: f64 = 1000.0;
pub const DOMAIN_HEIGHT: f64 = 1000.0;
/// Number of bodies spawned at reset.
pub const NUM_BODIES: usize = 5000;
/// Radius of the initial galactic disk.
pub const GALAXY_RADIUS: f64 = 200.0;
/// Scale of the initial swirl velocity.
pub const SWIRL_STRENGTH: f64 = 5000.0;
/// Number of kinetic energy samples kept for the plot.
pub const ENERGY_HISTORY_LEN: usize = 300;
/// Smallest quadtree node size that will be drawn as a gizmo.
pub const MIN_GIZMO_NODE_SIZE: f64 = 2.0;

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            gravity_constant: DEFAULT_GRAVITY_CONSTANT,
            max_speed: DEFAULT_MAX_SPEED,
            theta: DEFAULT_THETA,
            softening_exponent: DEFAULT_SOFTENING_EXPONENT,
        }
    }
}

impl SimConfig {
    pub fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            gravity_constant: self.gravity_constant,
            max_speed: self.max_speed,
            theta: self.theta,
            softening_exponent: self.softening_exponent,
        }
    }
}

/// Size of the simulated universe. The tree root always covers exactly this.
#[derive(Resource, Clone, Copy, Debug)]
pub struct SimulationBounds {
    pub width: f64,
    pub height: f64,
}

impl Default for SimulationBounds {
    fn default() -> Self {
        Self {
            width: DOMAIN_WIDTH,
            height: DOMAIN_HEIGHT,
        }
    }
}

impl SimulationBounds {
    pub fn region(&self) -> Region {
        Region::from_size(self.width, self.height)
    }

    /// Maps domain coordinates (origin top-left, y down) to world space
    /// (origin at the domain center, y up).
    pub fn to_world(&self, position: DVec2) -> Vec2 {
        Vec2::new(
            (position.x - self.width / 2.0) as f32,
            (self.height / 2.0 - position.y) as f32,
        )
    }
}

/// User-facing toggles that drive rendering.
#[derive(Resource)]
pub struct SimSettings {
    pub time_scale: f64,
    pub color_mode: ColorMode,
    pub galaxy_tint: [f32; 3],
    /// Distance from the center of mass at which radial coloring reaches the tint.
    pub color_radius: f64,
    pub show_gizmos: bool,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            color_mode: ColorMode::Radial,
            galaxy_tint: [0.45, 0.55, 0.9],
            color_radius: 300.0,
            show_gizmos: false,
        }
    }
}

/// Rolling window of total kinetic energy, oldest sample first.
#[derive(Resource)]
pub struct EnergyHistory {
    pub samples: VecDeque<f64>,
    pub capacity: usize,
}

impl Default for EnergyHistory {
    fn default() -> Self {
        Self::with_capacity(ENERGY_HISTORY_LEN)
    }
}

impl EnergyHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, shifting out the oldest one once full.
    pub fn push(&mut self, sample: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Marker resource to request a simulation reset from the UI.
#[derive(Resource, Default)]
pub struct ResetSimulation {
    pub pending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_history_shifts_out_oldest_sample() {
        let mut history = EnergyHistory::with_capacity(3);
        for sample in [1.0, 2.0, 3.0, 4.0] {
            history.push(sample);
        }
        assert_eq!(history.samples, [2.0, 3.0, 4.0]);
        assert_eq!(history.latest(), Some(4.0));
    }

    #[test]
    fn zero_capacity_history_stays_empty() {
        let mut history = EnergyHistory::with_capacity(0);
        history.push(1.0);
        assert!(history.samples.is_empty());
    }

    #[test]
    fn domain_maps_to_centered_world_space() {
        let bounds = SimulationBounds {
            width: 600.0,
            height: 400.0,
        };
        assert_eq!(bounds.to_world(DVec2::new(0.0, 0.0)), Vec2::new(-300.0, 200.0));
        assert_eq!(bounds.to_world(DVec2::new(300.0, 200.0)), Vec2::ZERO);
        assert_eq!(bounds.to_world(DVec2::new(600.0, 400.0)), Vec2::new(300.0, -200.0));
    }

    #[test]
    fn tree_config_mirrors_sim_config() {
        let config = SimConfig::default();
        let tree = config.tree_config();
        assert_eq!(tree.gravity_constant, DEFAULT_GRAVITY_CONSTANT);
        assert_eq!(tree.max_speed, DEFAULT_MAX_SPEED);
        assert_eq!(tree.theta, DEFAULT_THETA);
        assert_eq!(tree.softening_exponent, DEFAULT_SOFTENING_EXPONENT);
    }
}
