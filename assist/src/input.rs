use filter::sign;
use hal::{AxisOutput, ManualInput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::InputConfig;

/// Below this magnitude a stick counts as centered for the sign-cross check.
const CENTER_EPSILON: f32 = 1e-3;

/// `(1 - e) * x + e * x³`, clamped to `[-1, 1]`.
pub fn apply_expo(x: f32, expo: f32) -> f32 {
    let x = x.clamp(-1.0, 1.0);
    ((1.0 - expo) * x + expo * x * x * x).clamp(-1.0, 1.0)
}

/// Rate-limits and shapes pilot input, and dithers outputs before they
/// reach the device.
///
/// Moving away from center is limited to `rate_up`, moving back toward it to
/// `rate_down`. If the target is on the other side of center the stick first
/// returns to zero at `rate_down`.
#[derive(Debug, Clone)]
pub struct InputProcessor {
    config: InputConfig,
    // cyclic_x, cyclic_y, yaw
    last_raw: [f32; 3],
    smoothed: [f32; 3],
    prev_output: [f32; 3],
    rng: StdRng,
}

impl InputProcessor {
    pub fn new(config: InputConfig) -> Self {
        Self::from_rng(config, StdRng::from_entropy())
    }

    /// Deterministic dither sequence.
    pub fn with_seed(config: InputConfig, seed: u64) -> Self {
        Self::from_rng(config, StdRng::seed_from_u64(seed))
    }

    fn from_rng(config: InputConfig, rng: StdRng) -> Self {
        Self {
            config,
            last_raw: [0.0; 3],
            smoothed: [0.0; 3],
            prev_output: [0.0; 3],
            rng,
        }
    }

    /// Replace non-finite stick values with the last finite reading of that
    /// axis.
    pub fn sanitize(&mut self, raw: ManualInput) -> ManualInput {
        let values = [raw.cyclic_x, raw.cyclic_y, raw.yaw];
        for (axis, (last, value)) in self.last_raw.iter_mut().zip(values).enumerate() {
            if value.is_finite() {
                *last = value;
            } else {
                log::warn!("input: non-finite value {} on axis {}, holding {:+.3}", value, axis, *last);
            }
        }
        ManualInput {
            cyclic_x: self.last_raw[0],
            cyclic_y: self.last_raw[1],
            yaw: self.last_raw[2],
        }
    }

    /// Rate-limit `raw` toward its target and apply the expo curve.
    pub fn process(&mut self, raw: ManualInput, dt: f32) -> ManualInput {
        let targets = [raw.cyclic_x, raw.cyclic_y, raw.yaw];
        for (current, target) in self.smoothed.iter_mut().zip(targets) {
            *current = rate_limit(target, *current, self.config.rate_up, self.config.rate_down, dt);
        }
        ManualInput {
            cyclic_x: apply_expo(self.smoothed[0], self.config.expo_cyclic),
            cyclic_y: apply_expo(self.smoothed[1], self.config.expo_cyclic),
            yaw: apply_expo(self.smoothed[2], self.config.expo_yaw),
        }
    }

    /// Expo curve only, no rate limit. Used when an assist is off.
    pub fn curve_only(&self, raw: ManualInput) -> ManualInput {
        ManualInput {
            cyclic_x: apply_expo(raw.cyclic_x, self.config.expo_cyclic),
            cyclic_y: apply_expo(raw.cyclic_y, self.config.expo_cyclic),
            yaw: apply_expo(raw.yaw, self.config.expo_yaw),
        }
    }

    /// Rate-limited stick positions before the curve.
    pub fn smoothed(&self) -> ManualInput {
        ManualInput {
            cyclic_x: self.smoothed[0],
            cyclic_y: self.smoothed[1],
            yaw: self.smoothed[2],
        }
    }

    /// Nudge each present axis that has barely moved since the last write,
    /// so the output device keeps seeing changes.
    pub fn dither(&mut self, output: AxisOutput) -> AxisOutput {
        AxisOutput {
            cyclic_x: output.cyclic_x.map(|v| self.dither_axis(0, v)),
            cyclic_y: output.cyclic_y.map(|v| self.dither_axis(1, v)),
            yaw: output.yaw.map(|v| self.dither_axis(2, v)),
        }
    }

    fn dither_axis(&mut self, axis: usize, value: f32) -> f32 {
        let amplitude = self.config.dither_amplitude;
        let mut value = if value.is_finite() { value } else { self.prev_output[axis] };
        if (self.prev_output[axis] - value).abs() < self.config.dither_threshold && amplitude > 0.0 {
            value += self.rng.gen_range(-amplitude..=amplitude);
        }
        let value = value.clamp(-1.0, 1.0);
        self.prev_output[axis] = value;
        value
    }

    pub fn reset_dither(&mut self) {
        self.prev_output = [0.0; 3];
    }

    pub fn reset(&mut self) {
        self.last_raw = [0.0; 3];
        self.smoothed = [0.0; 3];
        self.reset_dither();
    }
}

fn rate_limit(target: f32, current: f32, rate_up: f32, rate_down: f32, dt: f32) -> f32 {
    if !target.is_finite() {
        return current;
    }
    let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
    let (goal, max_delta) = if sign(target) != sign(current) && current.abs() > CENTER_EPSILON {
        (0.0, rate_down * dt)
    } else if target.abs() < current.abs() {
        (target, rate_down * dt)
    } else {
        (target, rate_up * dt)
    };
    let delta = (goal - current).clamp(-max_delta, max_delta);
    current + delta
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.02;

    fn processor() -> InputProcessor {
        InputProcessor::with_seed(InputConfig::default(), 7)
    }

    #[test]
    fn test_expo_curve() {
        assert_eq!(apply_expo(1.0, 0.5), 1.0);
        assert_eq!(apply_expo(0.0, 0.5), 0.0);
        assert!((apply_expo(0.5, 0.5) - 0.3125).abs() < 1e-6);
        assert_eq!(apply_expo(3.0, 0.5), 1.0, "Input should be clamped");
    }

    #[test]
    fn test_rate_limit_up_slower_than_down() {
        let mut input = processor();
        input.process(ManualInput::new(1.0, 0.0, 0.0), DT);
        assert!((input.smoothed().cyclic_x - 0.02).abs() < 1e-6, "Moving away from center is limited to rate_up");

        for _ in 0..100 {
            input.process(ManualInput::new(1.0, 0.0, 0.0), DT);
        }
        assert_eq!(input.smoothed().cyclic_x, 1.0);

        input.process(ManualInput::new(0.5, 0.0, 0.0), DT);
        assert!((input.smoothed().cyclic_x - 0.96).abs() < 1e-6, "Moving toward center is limited to rate_down");
    }

    #[test]
    fn test_sign_cross_returns_to_zero_first() {
        let mut input = processor();
        for _ in 0..100 {
            input.process(ManualInput::new(0.0, 0.05, 0.0), DT);
        }
        let out = input.process(ManualInput::new(0.0, -1.0, 0.0), DT);
        assert!((input.smoothed().cyclic_y - 0.01).abs() < 1e-6);
        assert!(out.cyclic_y >= 0.0, "Stick should not cross center within one tick");
        input.process(ManualInput::new(0.0, -1.0, 0.0), DT);
        assert!(input.smoothed().cyclic_y.abs() < 1e-6, "Stick should stop at center");
        input.process(ManualInput::new(0.0, -1.0, 0.0), DT);
        assert!(input.smoothed().cyclic_y < 0.0);
    }

    #[test]
    fn test_non_finite_input_holds_last_value() {
        let mut input = processor();
        let raw = input.sanitize(ManualInput::new(0.3, -0.2, 0.1));
        assert_eq!(raw, ManualInput::new(0.3, -0.2, 0.1));
        let raw = input.sanitize(ManualInput::new(f32::NAN, -0.4, f32::INFINITY));
        assert_eq!(raw, ManualInput::new(0.3, -0.4, 0.1), "Bad axes should hold their last reading");
    }

    #[test]
    fn test_nan_does_not_latch_into_smoothing() {
        let mut input = processor();
        input.process(ManualInput::new(0.0, 0.0, f32::NAN), DT);
        assert_eq!(input.smoothed().yaw, 0.0, "NaN target should leave the axis in place");
        let mut out = ManualInput::default();
        for _ in 0..200 {
            out = input.process(ManualInput::new(0.0, 0.0, 0.8), DT);
        }
        assert!((input.smoothed().yaw - 0.8).abs() < 1e-6, "Pedal should recover, got {}", input.smoothed().yaw);
        assert!(out.yaw > 0.5);

        let dithered = input.dither(AxisOutput::new(None, None, Some(f32::NAN)));
        let yaw = dithered.yaw.expect("yaw should be present");
        assert!(yaw.is_finite(), "Non-finite output should never reach the device");
    }

    #[test]
    fn test_dither_only_when_output_is_static() {
        let mut input = processor();
        let first = input.dither(AxisOutput::new(Some(0.5), None, Some(0.0)));
        assert_eq!(first.cyclic_x, Some(0.5), "A real change is passed through");
        assert_eq!(first.cyclic_y, None);
        let yaw = first.yaw.expect("yaw should be present");
        assert!(yaw.abs() <= 0.001, "Static axis gets a small nudge, got {}", yaw);

        let second = input.dither(AxisOutput::new(Some(0.5), None, None));
        let x = second.cyclic_x.expect("cyclic_x should be present");
        assert!((x - 0.5).abs() <= 0.001);
    }

    #[test]
    fn test_seeded_dither_is_deterministic() {
        let mut a = processor();
        let mut b = processor();
        for _ in 0..10 {
            let out = AxisOutput::new(Some(0.1), Some(0.1), Some(0.1));
            assert_eq!(a.dither(out), b.dither(out));
        }
    }
}
