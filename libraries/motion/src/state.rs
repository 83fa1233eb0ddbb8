use filter::Ema;
use hal::{Attitude, MotionSample, Vector3d};

use crate::utils::world_to_body;

/// Vehicle motion in the heading-relative body frame.
///
/// Updated exactly once per control tick, before any control law reads it.
/// The previous tick's values are kept so loops can rebuild a derivative
/// after they have been idle (e.g. during manual flight).
#[derive(Debug, Clone)]
pub struct MotionState {
    // [forward, right, up]
    body_velocity: Vector3d,
    body_acceleration: Vector3d,
    attitude: Attitude,
    rates: Attitude,
    position: Vector3d,

    prev_body_velocity: Vector3d,
    prev_body_acceleration: Vector3d,
    prev_attitude: Attitude,
    prev_rates: Attitude,
    prev_position: Vector3d,

    acc_filters: [Ema; 3],
}

impl MotionState {
    /// `accel_alpha` is the EMA alpha used on body-frame accelerations.
    pub fn new(accel_alpha: f32) -> Self {
        Self {
            body_velocity: Vector3d::zeros(),
            body_acceleration: Vector3d::zeros(),
            attitude: Attitude::default(),
            rates: Attitude::default(),
            position: Vector3d::zeros(),
            prev_body_velocity: Vector3d::zeros(),
            prev_body_acceleration: Vector3d::zeros(),
            prev_attitude: Attitude::default(),
            prev_rates: Attitude::default(),
            prev_position: Vector3d::zeros(),
            acc_filters: [Ema::new(accel_alpha); 3],
        }
    }

    pub fn update(&mut self, sample: &MotionSample) {
        self.prev_body_velocity = self.body_velocity;
        self.prev_body_acceleration = self.body_acceleration;
        self.prev_attitude = self.attitude;
        self.prev_rates = self.rates;
        self.prev_position = self.position;

        let yaw = sample.attitude.yaw;
        self.body_velocity = world_to_body(&sample.velocity, yaw);
        let raw_acc = world_to_body(&sample.acceleration, yaw);
        for (i, filter) in self.acc_filters.iter_mut().enumerate() {
            self.body_acceleration[i] = filter.update(raw_acc[i]);
        }

        self.attitude = sample.attitude;
        self.rates = sample.rates;
        self.position = sample.position;
    }

    /// `reference - current` position, expressed in the current body frame
    /// as `[forward, right, up]`.
    pub fn position_delta(&self, reference: &Vector3d) -> Vector3d {
        world_to_body(&(reference - self.position), self.attitude.yaw)
    }

    pub fn forward_v(&self) -> f32 {
        self.body_velocity.x
    }

    pub fn right_v(&self) -> f32 {
        self.body_velocity.y
    }

    pub fn up_v(&self) -> f32 {
        self.body_velocity.z
    }

    pub fn forward_acc(&self) -> f32 {
        self.body_acceleration.x
    }

    pub fn right_acc(&self) -> f32 {
        self.body_acceleration.y
    }

    pub fn up_acc(&self) -> f32 {
        self.body_acceleration.z
    }

    pub fn body_velocity(&self) -> &Vector3d {
        &self.body_velocity
    }

    pub fn body_acceleration(&self) -> &Vector3d {
        &self.body_acceleration
    }

    pub fn attitude(&self) -> &Attitude {
        &self.attitude
    }

    pub fn rates(&self) -> &Attitude {
        &self.rates
    }

    /// World position `[north, up, east]`
    pub fn position(&self) -> &Vector3d {
        &self.position
    }

    pub fn prev_body_velocity(&self) -> &Vector3d {
        &self.prev_body_velocity
    }

    pub fn prev_body_acceleration(&self) -> &Vector3d {
        &self.prev_body_acceleration
    }

    pub fn prev_attitude(&self) -> &Attitude {
        &self.prev_attitude
    }

    pub fn prev_rates(&self) -> &Attitude {
        &self.prev_rates
    }

    pub fn prev_position(&self) -> &Vector3d {
        &self.prev_position
    }
}
