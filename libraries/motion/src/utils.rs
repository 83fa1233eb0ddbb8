use core::f32::consts::PI;
use nalgebra as na;

/// Convert radians to degrees
pub fn rad_to_deg(rad: f32) -> f32 {
    rad * 180.0 / PI
}

/// Wrap an angle into `[-π, π]`.
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    // rem_euclid can round up to exactly 2π for inputs just below -π
    wrapped.clamp(-PI, PI)
}

/// Signed difference `a - b`, wrapped into `[-π, π]`.
pub fn angle_diff(a: f32, b: f32) -> f32 {
    wrap_angle(a - b)
}

/// Rotate a world vector `[north, up, east]` into the heading frame
/// `[forward, right, up]`.
///
/// Only heading is used: forward and right stay horizontal regardless of
/// pitch and roll.
pub fn world_to_body(world: &na::Vector3<f32>, yaw: f32) -> na::Vector3<f32> {
    let horizontal = na::Vector3::new(world.x, world.z, world.y);
    let rotation = na::Rotation3::from_axis_angle(&na::Vector3::z_axis(), -yaw);
    rotation * horizontal
}
