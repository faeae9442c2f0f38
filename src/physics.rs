use bevy::math::DVec2;

use crate::components::Body;
use crate::quadtree::Region;

/// Distance from a domain edge inside which a body's velocity is reflected.
pub const BOUNDARY_MARGIN: f64 = 10.0;

/// Softening length for a log10 exponent.
pub fn softening_length(exponent: f64) -> f64 {
    10f64.powf(exponent)
}

/// Acceleration toward a source of `mass` displaced by `delta` from the body,
/// using the softened inverse-square law `mass / (r² + ε²)`.
///
/// Zero displacement contributes nothing.
pub fn softened_acceleration(delta: DVec2, mass: f64, softening: f64) -> DVec2 {
    if delta == DVec2::ZERO {
        return DVec2::ZERO;
    }
    let radius_squared = delta.length_squared();
    let magnitude = mass / (radius_squared + softening * softening);
    let angle = delta.y.atan2(delta.x);
    DVec2::new(angle.cos(), angle.sin()) * magnitude
}

/// Clamps one velocity component to `max_speed` in magnitude, keeping its sign.
fn clamp_axis(value: f64, max_speed: f64) -> f64 {
    if value == 0.0 {
        return value;
    }
    value.abs().min(max_speed) * value.signum()
}

/// Advances `body` by one tick using its already accumulated acceleration.
///
/// Velocity is clamped per axis, so diagonal speeds may reach `max_speed * √2`.
/// Position is never clamped; a body inside the boundary margin just has that
/// axis of its velocity reversed.
pub fn advance_body(body: &mut Body, dt: f64, max_speed: f64, domain: &Region) {
    body.velocity += body.acceleration * dt;
    body.velocity.x = clamp_axis(body.velocity.x, max_speed);
    body.velocity.y = clamp_axis(body.velocity.y, max_speed);

    body.position += body.velocity * dt + 0.5 * body.acceleration * dt * dt;

    if body.position.x < domain.min.x + BOUNDARY_MARGIN
        || body.position.x > domain.max.x - BOUNDARY_MARGIN
    {
        body.velocity.x = -body.velocity.x;
    }
    if body.position.y < domain.min.y + BOUNDARY_MARGIN
        || body.position.y > domain.max.y - BOUNDARY_MARGIN
    {
        body.velocity.y = -body.velocity.y;
    }
}

/// Total kinetic energy of equal-mass bodies.
pub fn kinetic_energy<'a>(bodies: impl IntoIterator<Item = &'a Body>, mass: f64) -> f64 {
    bodies
        .into_iter()
        .map(|body| 0.5 * mass * body.velocity.length_squared())
        .sum()
}
