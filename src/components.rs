use bevy::math::DVec2;
use bevy::prelude::*;

/// A point mass moving through the simulation domain.
///
/// Coordinates are in domain space: origin at the top-left corner, y growing downward.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq)]
pub struct Body {
    pub position: DVec2,
    pub velocity: DVec2,
    /// Recomputed from scratch every tick.
    pub acceleration: DVec2,
}

impl Body {
    pub fn new(position: DVec2, velocity: DVec2) -> Self {
        Self {
            position,
            velocity,
            acceleration: DVec2::ZERO,
        }
    }
}

#[cfg(test)]
impl Body {
    /// A body at rest.
    pub fn at(x: f64, y: f64) -> Self {
        Self::new(DVec2::new(x, y), DVec2::ZERO)
    }
}

/// Marker for the rendered star entities.
#[derive(Component, Default)]
pub struct Star;
