use bevy::math::DVec2;
use bevy::prelude::*;

use crate::components::Body;

/// How stars are colored in the view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorMode {
    /// Every star takes the galaxy tint.
    Solid,
    /// White at the center of mass, fading to the tint at `max_distance`.
    #[default]
    Radial,
    /// Hue ramp from slow (blue) to fast (red).
    Velocity,
}

/// Per-frame inputs shared by all stars.
#[derive(Clone, Copy, Debug)]
pub struct ColorContext {
    pub center_of_mass: DVec2,
    pub max_distance: f64,
    pub max_speed: f64,
    pub tint: [f32; 3],
}

/// Linearly maps `value` from one range onto another. An empty source range
/// maps everything to `new_min`.
pub fn remap(value: f64, old_min: f64, old_max: f64, new_min: f64, new_max: f64) -> f64 {
    let old_range = old_max - old_min;
    if old_range == 0.0 {
        return new_min;
    }
    (value - old_min) * (new_max - new_min) / old_range + new_min
}

pub fn star_color(mode: ColorMode, body: &Body, context: &ColorContext) -> Color {
    let [r, g, b] = context.tint;
    match mode {
        ColorMode::Solid => Color::srgb(r, g, b),
        ColorMode::Radial => {
            let residual = context.max_distance - body.position.distance(context.center_of_mass);
            let channel = |tint: f32| {
                let tint = tint as f64;
                let value = tint + remap(residual, 0.0, context.max_distance, 0.0, 1.0 - tint);
                value.clamp(0.0, 1.0) as f32
            };
            Color::srgb(channel(r), channel(g), channel(b))
        }
        ColorMode::Velocity => {
            // Per-axis clamping lets diagonal speeds reach max_speed * √2.
            let top_speed = context.max_speed * std::f64::consts::SQRT_2;
            let t = if top_speed > 0.0 {
                (body.velocity.length() / top_speed).clamp(0.0, 1.0)
            } else {
                0.0
            };
            Color::hsl((240.0 * (1.0 - t)) as f32, 0.85, 0.6)
        }
    }
}
