/// Common data types for the I/O interfaces
pub use nalgebra::Vector3;

/// 3D vector representation using nalgebra
pub type Vector3d = Vector3<f32>;

/// Euler angles (rad) or their rates (rad/s).
///
/// Positive pitch is nose up, positive roll is right wing down, positive yaw
/// is clockwise seen from above.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Attitude {
    pub fn new(roll: f32, pitch: f32, yaw: f32) -> Self {
        Self { roll, pitch, yaw }
    }
}
