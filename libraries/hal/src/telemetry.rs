/// Vehicle telemetry interface
use crate::types::{Attitude, Vector3d};

/// One complete motion sample.
///
/// World-frame vectors are `[north, up, east]`.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    /// Linear velocity in m/s
    pub velocity: Vector3d,

    /// Linear acceleration in m/s²
    pub acceleration: Vector3d,

    /// Attitude in rad
    pub attitude: Attitude,

    /// Attitude rates in rad/s
    pub rates: Attitude,

    /// Position in m
    pub position: Vector3d,
}

/// A possibly partial telemetry update, as received from an exporter.
///
/// Every field is optional; absent fields keep their last known value when
/// merged into a [`MotionSample`].
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub vz: Option<f32>,
    pub ax: Option<f32>,
    pub ay: Option<f32>,
    pub az: Option<f32>,
    pub pitch: Option<f32>,
    pub roll: Option<f32>,
    pub yaw: Option<f32>,
    pub pitch_rate: Option<f32>,
    pub roll_rate: Option<f32>,
    pub yaw_rate: Option<f32>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
}

impl TelemetryFrame {
    /// A frame with every field populated from `sample`.
    pub fn from_sample(sample: &MotionSample) -> Self {
        Self {
            vx: Some(sample.velocity.x),
            vy: Some(sample.velocity.y),
            vz: Some(sample.velocity.z),
            ax: Some(sample.acceleration.x),
            ay: Some(sample.acceleration.y),
            az: Some(sample.acceleration.z),
            pitch: Some(sample.attitude.pitch),
            roll: Some(sample.attitude.roll),
            yaw: Some(sample.attitude.yaw),
            pitch_rate: Some(sample.rates.pitch),
            roll_rate: Some(sample.rates.roll),
            yaw_rate: Some(sample.rates.yaw),
            x: Some(sample.position.x),
            y: Some(sample.position.y),
            z: Some(sample.position.z),
        }
    }
}

fn keep_last(dst: &mut f32, src: Option<f32>) {
    if let Some(value) = src {
        if value.is_finite() {
            *dst = value;
        }
    }
}

impl MotionSample {
    /// Overlay `frame` on this sample. Missing or non-finite fields keep the
    /// last known value rather than dropping to zero.
    pub fn merge(&mut self, frame: &TelemetryFrame) {
        keep_last(&mut self.velocity.x, frame.vx);
        keep_last(&mut self.velocity.y, frame.vy);
        keep_last(&mut self.velocity.z, frame.vz);
        keep_last(&mut self.acceleration.x, frame.ax);
        keep_last(&mut self.acceleration.y, frame.ay);
        keep_last(&mut self.acceleration.z, frame.az);
        keep_last(&mut self.attitude.pitch, frame.pitch);
        keep_last(&mut self.attitude.roll, frame.roll);
        keep_last(&mut self.attitude.yaw, frame.yaw);
        keep_last(&mut self.rates.pitch, frame.pitch_rate);
        keep_last(&mut self.rates.roll, frame.roll_rate);
        keep_last(&mut self.rates.yaw, frame.yaw_rate);
        keep_last(&mut self.position.x, frame.x);
        keep_last(&mut self.position.y, frame.y);
        keep_last(&mut self.position.z, frame.z);
    }
}

/// Source of the most recent motion sample.
///
/// Implementations must not block: the control loop calls this once per tick.
pub trait TelemetrySource {
    fn latest_sample(&mut self) -> MotionSample;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_frame_keeps_last_known() {
        let mut sample = MotionSample::default();
        sample.merge(&TelemetryFrame {
            vx: Some(3.0),
            yaw: Some(1.2),
            ..Default::default()
        });
        sample.merge(&TelemetryFrame {
            vz: Some(-1.0),
            yaw: Some(f32::NAN),
            ..Default::default()
        });
        assert_eq!(sample.velocity.x, 3.0, "vx should survive a frame without it");
        assert_eq!(sample.velocity.z, -1.0);
        assert_eq!(sample.attitude.yaw, 1.2, "NaN should not overwrite the last known yaw");
    }

    #[test]
    fn test_full_frame_round_trip() {
        let mut source = MotionSample::default();
        source.rates.roll = 0.4;
        source.position.y = 120.0;
        let mut sample = MotionSample::default();
        sample.merge(&TelemetryFrame::from_sample(&source));
        assert_eq!(sample, source);
    }
}
