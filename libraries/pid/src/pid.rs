// Adaptive PID controller with multirate gating and bumpless transfer
use filter::Ema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Integral values smaller than this are treated as zero when rescaling.
const KI_EPSILON: f32 = 1e-12;

/// Minimum rate magnitude used by the integral leak.
const LEAK_RATE_FLOOR: f32 = 0.1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PIDError {
    #[error("Invalid gain configuration: {0}")]
    InvalidGain(String),

    #[error("Invalid limit configuration: {name} value {value} is out of range")]
    InvalidLimit { name: &'static str, value: f32 },

    #[error("Invalid skip factor {0}: must be at least 1")]
    InvalidSkip(u32),
}

/// Tunable parameters for one loop. Gains are configuration, so every field
/// has a default and partial configs deserialize cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PIDConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Extra proportional gain per unit of |error|.
    pub adaptive_factor: f32,
    pub max_authority: f32,
    pub integral_max: f32,
    /// Fraction of the integral removed per tick, scaled by max(|rate|, 0.1).
    /// Zero disables the leak.
    pub integral_leak: f32,
    /// Run once every `skip` ticks of the owning cascade.
    pub skip: u32,
    /// EMA alpha for the error-rate filter.
    pub rate_alpha: f32,
    pub stable_threshold: f32,
}

impl Default for PIDConfig {
    fn default() -> Self {
        Self {
            kp: 0.5,
            ki: 0.1,
            kd: 0.08,
            adaptive_factor: 0.003,
            max_authority: 0.35,
            integral_max: 5.0,
            integral_leak: 0.0,
            skip: 1,
            rate_alpha: 0.25,
            stable_threshold: 0.02,
        }
    }
}

impl PIDConfig {
    pub fn validate(&self) -> Result<(), PIDError> {
        for (name, value) in [
            ("kp", self.kp),
            ("ki", self.ki),
            ("kd", self.kd),
            ("adaptive_factor", self.adaptive_factor),
        ] {
            if !value.is_finite() {
                return Err(PIDError::InvalidGain(format!("{name} value {value} is not a valid number")));
            }
        }
        if !(self.max_authority.is_finite() && self.max_authority > 0.0) {
            return Err(PIDError::InvalidLimit { name: "max_authority", value: self.max_authority });
        }
        if !(self.integral_max.is_finite() && self.integral_max >= 0.0) {
            return Err(PIDError::InvalidLimit { name: "integral_max", value: self.integral_max });
        }
        if !(0.0..=1.0).contains(&self.integral_leak) {
            return Err(PIDError::InvalidLimit { name: "integral_leak", value: self.integral_leak });
        }
        if !(self.rate_alpha > 0.0 && self.rate_alpha <= 1.0) {
            return Err(PIDError::InvalidLimit { name: "rate_alpha", value: self.rate_alpha });
        }
        if self.skip == 0 {
            return Err(PIDError::InvalidSkip(self.skip));
        }
        Ok(())
    }

    pub fn with_gains(mut self, kp: f32, ki: f32, kd: f32) -> Self {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self
    }

    pub fn with_limits(mut self, max_authority: f32, integral_max: f32) -> Self {
        self.max_authority = max_authority;
        self.integral_max = integral_max;
        self
    }

    pub fn with_skip(mut self, skip: u32) -> Self {
        self.skip = skip;
        self
    }
}

/// Single-axis adaptive PID.
///
/// The proportional gain grows with error magnitude, the integral is clamped
/// (and optionally leaks while the error moves quickly), and the derivative
/// term works on a filtered rate that is either supplied by the caller
/// (derivative on measurement) or reconstructed from the error.
#[derive(Debug, Clone)]
pub struct AdaptivePID {
    config: PIDConfig,
    // Live integral gain; may differ from `config.ki` after `update_ki`.
    ki: f32,

    integral: f32,
    prev_error: f32,
    rate: f32,
    output: f32,
    rate_filter: Ema,
    skip_count: u32,
}

impl AdaptivePID {
    /// Create a controller from a validated configuration.
    pub fn new(config: PIDConfig) -> Result<Self, PIDError> {
        config.validate()?;
        Ok(Self {
            ki: config.ki,
            integral: 0.0,
            prev_error: 0.0,
            rate: 0.0,
            output: 0.0,
            rate_filter: Ema::new(config.rate_alpha),
            skip_count: 0,
            config,
        })
    }

    pub fn config(&self) -> &PIDConfig {
        &self.config
    }

    pub fn kp(&self) -> f32 {
        self.config.kp
    }

    pub fn ki(&self) -> f32 {
        self.ki
    }

    pub fn kd(&self) -> f32 {
        self.config.kd
    }

    pub fn max_authority(&self) -> f32 {
        self.config.max_authority
    }

    pub fn integral_max(&self) -> f32 {
        self.config.integral_max
    }

    pub fn skip(&self) -> u32 {
        self.config.skip
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn prev_error(&self) -> f32 {
        self.prev_error
    }

    /// Latest clamped output.
    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn set_kp(&mut self, kp: f32) -> Result<&mut Self, PIDError> {
        if !kp.is_finite() {
            return Err(PIDError::InvalidGain(format!("kp value {kp} is not a valid number")));
        }
        self.config.kp = kp;
        Ok(self)
    }

    pub fn set_kd(&mut self, kd: f32) -> Result<&mut Self, PIDError> {
        if !kd.is_finite() {
            return Err(PIDError::InvalidGain(format!("kd value {kd} is not a valid number")));
        }
        self.config.kd = kd;
        Ok(self)
    }

    /// Change the integral gain while keeping `ki * integral` unchanged.
    ///
    /// A zero gain (or an empty integral) resets the integral instead of
    /// dividing by zero. The integral bound wins over the product: when the
    /// rescaled integral exceeds `integral_max` it is clamped and the product
    /// shrinks.
    pub fn update_ki(&mut self, new_ki: f32) -> Result<&mut Self, PIDError> {
        if !new_ki.is_finite() {
            return Err(PIDError::InvalidGain(format!("ki value {new_ki} is not a valid number")));
        }
        if new_ki.abs() < KI_EPSILON || self.integral == 0.0 {
            self.integral = 0.0;
        } else {
            self.integral = self.clamp_integral(self.ki / new_ki * self.integral);
        }
        self.ki = new_ki;
        Ok(self)
    }

    fn adaptive_kp(&self, error: f32) -> f32 {
        self.config.kp + self.config.adaptive_factor * error.abs()
    }

    fn clamp_integral(&self, value: f32) -> f32 {
        value.clamp(-self.config.integral_max, self.config.integral_max)
    }

    fn clamp_output(&self, value: f32) -> f32 {
        value.clamp(-self.config.max_authority, self.config.max_authority)
    }

    fn refresh_rate(&mut self, error: f32, rate: Option<f32>, dt: f32) {
        let raw = match rate {
            Some(r) if r.is_finite() => r,
            _ => (error - self.prev_error) / dt,
        };
        self.rate = self.rate_filter.update(raw);
        self.prev_error = error;
    }

    /// Run one step and return the clamped output.
    ///
    /// Non-finite input or a non-positive `dt` holds the previous output and
    /// leaves every state variable untouched.
    pub fn update(&mut self, error: f32, rate: Option<f32>, dt: f32) -> f32 {
        if !error.is_finite() || !dt.is_finite() || dt <= 0.0 {
            return self.output;
        }

        let kp = self.adaptive_kp(error);
        self.refresh_rate(error, rate, dt);

        // Leak toward zero faster while the error is changing quickly
        if self.config.integral_leak > 0.0 {
            let leak = (self.config.integral_leak * self.rate.abs().max(LEAK_RATE_FLOOR)).min(1.0);
            self.integral -= leak * self.integral;
        }

        self.integral = self.clamp_integral(self.integral + error * dt);

        let output = kp * error + self.ki * self.integral + self.config.kd * self.rate;
        self.output = self.clamp_output(output);
        self.skip_count = 0;
        self.output
    }

    /// Back-solve the integral so the controller reproduces `manual_output`
    /// for the current error and rate.
    ///
    /// `prev_error` seeds the finite difference so the rate reflects motion
    /// that happened while the loop was not running. With `ki == 0` the
    /// integral is reset instead.
    ///
    /// Returns the output the controller state actually produces. It differs
    /// from `manual_output` when the integral saturates or `ki` is zero.
    pub fn manual_override_integral(
        &mut self,
        error: f32,
        rate: Option<f32>,
        dt: f32,
        manual_output: f32,
        prev_error: f32,
    ) -> f32 {
        if !error.is_finite() || !manual_output.is_finite() || !dt.is_finite() || dt <= 0.0 {
            return self.output;
        }

        let kp = self.adaptive_kp(error);
        if prev_error.is_finite() {
            self.prev_error = prev_error;
        }
        self.refresh_rate(error, rate, dt);

        self.integral = if self.ki.abs() < KI_EPSILON {
            0.0
        } else {
            self.clamp_integral((manual_output - kp * error - self.config.kd * self.rate) / self.ki)
        };
        let output = kp * error + self.ki * self.integral + self.config.kd * self.rate;
        self.output = self.clamp_output(output);
        self.skip_count = 0;
        log::trace!("manual override integral: {:.4} output: {:.4}", self.integral, self.output);
        self.output
    }

    /// Add `delta` to the integral (clamped).
    pub fn add_integral(&mut self, delta: f32) {
        if delta.is_finite() {
            self.integral = self.clamp_integral(self.integral + delta);
        }
    }

    /// Count one tick of the owning cascade.
    pub fn tick_skip(&mut self) {
        self.skip_count = self.skip_count.saturating_add(1);
    }

    pub fn is_available(&self) -> bool {
        self.skip_count >= self.config.skip
    }

    /// Make the loop run on the next availability check.
    pub fn force_available(&mut self) {
        self.skip_count = self.config.skip;
    }

    pub fn is_stable(&self) -> bool {
        self.prev_error.abs() <= self.config.stable_threshold
    }

    /// Clear dynamic state. Gains (including a live `ki`) are preserved.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.rate = 0.0;
        self.output = 0.0;
        self.rate_filter.reset();
        self.skip_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{AdaptivePID, PIDConfig, PIDError};

    const DT: f32 = 0.02;

    fn pid(config: PIDConfig) -> AdaptivePID {
        AdaptivePID::new(config).expect("Valid config should not cause an error")
    }

    #[test]
    fn test_pid() {
        let config = PIDConfig::default().with_gains(1.0, 0.5, 0.0);
        let mut pid = pid(PIDConfig { adaptive_factor: 0.0, max_authority: 10.0, ..config });
        let output = pid.update(1.0, Some(0.0), 0.1);
        // p = 1.0, i = 0.5 * 0.1 = 0.05
        assert!((output - 1.05).abs() < 1e-5, "Expected output around 1.05, got {}", output);
    }

    #[test]
    fn test_adaptive_gain_grows_with_error() {
        let config = PIDConfig { adaptive_factor: 0.5, max_authority: 100.0, ..PIDConfig::default().with_gains(1.0, 0.0, 0.0) };
        let mut small = pid(config);
        let mut large = pid(config);
        let s = small.update(0.1, Some(0.0), DT) / 0.1;
        let l = large.update(2.0, Some(0.0), DT) / 2.0;
        assert!(l > s, "Effective gain should be larger for larger errors ({} vs {})", l, s);
        assert!((l - 2.0).abs() < 1e-5, "kp_eff should be 1 + 0.5 * 2 = 2, got {}", l);
    }

    #[test]
    fn test_output_and_integral_bounds() {
        let config = PIDConfig::default().with_gains(3.0, 2.0, 0.5).with_limits(0.4, 1.5);
        let mut pid = pid(config);
        let errors = [10.0, -25.0, 0.3, 1e4, -1e4, 0.0, 7.5, -0.01];
        let rates = [None, Some(50.0), Some(-80.0), None];
        for i in 0..400 {
            let e = errors[i % errors.len()];
            let r = rates[i % rates.len()];
            let out = pid.update(e, r, DT);
            assert!(out.abs() <= 0.4 + 1e-6, "Output {} escaped authority", out);
            assert!(pid.integral().abs() <= 1.5 + 1e-6, "Integral {} escaped bounds", pid.integral());
        }
    }

    #[test]
    fn test_rate_reconstructed_from_error() {
        let config = PIDConfig { rate_alpha: 1.0, ..PIDConfig::default() };
        let mut pid = pid(config);
        pid.update(0.0, None, DT);
        pid.update(0.1, None, DT);
        assert!((pid.rate() - 5.0).abs() < 1e-4, "Rate should be 0.1 / 0.02 = 5, got {}", pid.rate());
    }

    #[test]
    fn test_supplied_rate_is_used() {
        let config = PIDConfig { rate_alpha: 1.0, ..PIDConfig::default() };
        let mut pid = pid(config);
        pid.update(1.0, Some(-0.3), DT);
        assert!((pid.rate() + 0.3).abs() < 1e-6, "Supplied rate should be used directly");
    }

    #[test]
    fn test_integral_leak() {
        let base = PIDConfig::default().with_gains(0.0, 1.0, 0.0).with_limits(10.0, 10.0);
        let mut leaky = pid(PIDConfig { integral_leak: 0.05, ..base });
        let mut plain = pid(base);
        for _ in 0..100 {
            leaky.update(1.0, Some(0.0), DT);
            plain.update(1.0, Some(0.0), DT);
        }
        assert!(leaky.integral() < plain.integral(), "Leak should keep the integral smaller");
    }

    #[test]
    fn test_update_ki_preserves_product() {
        let mut pid = pid(PIDConfig::default().with_gains(0.5, 0.4, 0.0).with_limits(1.0, 10.0));
        for _ in 0..50 {
            pid.update(0.5, Some(0.0), DT);
        }
        let before = pid.ki() * pid.integral();
        pid.update_ki(0.8).expect("Valid ki should not cause an error");
        let after = pid.ki() * pid.integral();
        assert!((before - after).abs() < 1e-6, "ki * integral should be preserved ({} vs {})", before, after);
        assert_eq!(pid.ki(), 0.8);
    }

    #[test]
    fn test_update_ki_zero_resets_integral() {
        let mut pid = pid(PIDConfig::default());
        for _ in 0..10 {
            pid.update(1.0, Some(0.0), DT);
        }
        assert!(pid.integral() != 0.0);
        pid.update_ki(0.0).expect("Zero ki is a valid gain");
        assert_eq!(pid.integral(), 0.0, "Integral should reset when ki becomes zero");

        // Back to a non-zero gain from an empty integral
        pid.update_ki(0.2).expect("Valid ki should not cause an error");
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn test_update_ki_rejects_nan() {
        let mut pid = pid(PIDConfig::default());
        pid.update(1.0, None, DT);
        let integral = pid.integral();
        assert!(pid.update_ki(f32::NAN).is_err(), "NaN ki should cause an error");
        assert_eq!(pid.integral(), integral, "Integral should be unchanged after a failed update");
        assert_eq!(pid.ki(), 0.1);
    }

    #[test]
    fn test_bumpless_manual_override() {
        let config = PIDConfig::default().with_gains(0.8, 0.2, 0.1).with_limits(0.6, 5.0);
        let mut pid = pid(config);
        let manual = 0.27;
        let error = 0.05;
        let out = pid.manual_override_integral(error, Some(0.0), DT, manual, error);
        assert!((out - manual).abs() < 1e-6, "Override should reproduce the manual output");

        let next = pid.update(error, Some(0.0), DT);
        assert!((next - manual).abs() < 0.01, "Auto output {} should be close to manual {}", next, manual);
    }

    #[test]
    fn test_manual_override_with_zero_ki() {
        let mut pid = pid(PIDConfig { adaptive_factor: 0.0, ..PIDConfig::default().with_gains(1.0, 0.0, 0.0) });
        let out = pid.manual_override_integral(0.1, Some(0.0), DT, 0.3, 0.1);
        assert_eq!(pid.integral(), 0.0, "Zero ki should short-circuit to an empty integral");
        assert!((out - 0.1).abs() < 1e-6, "Output should be the P term alone, got {}", out);
    }

    #[test]
    fn test_saturated_override_reports_reachable_output() {
        let config = PIDConfig { adaptive_factor: 0.0, ..PIDConfig::default() }
            .with_gains(2.0, 0.05, 0.0)
            .with_limits(0.35, 8.0);
        let mut pid = pid(config);
        // P alone is -1.0, so reaching +0.2 would need an integral of 24
        let out = pid.manual_override_integral(-0.5, Some(0.0), DT, 0.2, -0.5);
        assert_eq!(pid.integral(), 8.0, "Integral should saturate at its bound");
        assert!((out + 0.35).abs() < 1e-6, "Saturated override should report the clamped output, got {}", out);
        assert_eq!(pid.output(), out);

        let next = pid.update(-0.5, Some(0.0), DT);
        assert!((next - out).abs() < 1e-6, "Next update {} should match the reported override {}", next, out);
    }

    #[test]
    fn test_update_ki_clamps_rescaled_integral() {
        let config = PIDConfig { adaptive_factor: 0.0, ..PIDConfig::default() }
            .with_gains(0.0, 1.0, 0.0)
            .with_limits(10.0, 1.0);
        let mut pid = pid(config);
        for _ in 0..100 {
            pid.update(1.0, Some(0.0), DT);
        }
        assert_eq!(pid.integral(), 1.0);
        pid.update_ki(0.25).expect("Valid ki should not cause an error");
        assert_eq!(pid.integral(), 1.0, "Rescaled integral of 4 should be held at the bound");
        assert!((pid.ki() * pid.integral() - 0.25).abs() < 1e-6, "Product shrinks when the bound applies");
    }

    #[test]
    fn test_skip_gate() {
        let mut pid = pid(PIDConfig::default().with_skip(3));
        assert!(!pid.is_available());
        pid.tick_skip();
        pid.tick_skip();
        assert!(!pid.is_available());
        pid.tick_skip();
        assert!(pid.is_available(), "Should be available after 3 ticks");
        pid.update(0.1, None, DT * 3.0);
        assert!(!pid.is_available(), "Update should restart the skip count");
        pid.force_available();
        assert!(pid.is_available());
    }

    #[test]
    fn test_invalid_update_inputs() {
        let mut pid = pid(PIDConfig::default());
        let out = pid.update(0.2, None, DT);
        assert_eq!(pid.update(f32::NAN, None, DT), out, "NaN error should hold the output");
        assert_eq!(pid.update(0.2, None, 0.0), out, "Zero dt should hold the output");
        assert_eq!(pid.update(0.2, None, f32::INFINITY), out, "Infinite dt should hold the output");
    }

    #[test]
    fn test_reset_preserves_gains() {
        let mut pid = pid(PIDConfig::default());
        pid.update_ki(0.3).expect("Valid ki should not cause an error");
        pid.update(1.0, None, DT);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.output(), 0.0);
        assert_eq!(pid.ki(), 0.3, "Live ki should survive a reset");
    }

    #[test]
    fn test_error_handling() {
        let result = AdaptivePID::new(PIDConfig { max_authority: 0.0, ..PIDConfig::default() });
        match result {
            Err(PIDError::InvalidLimit { name, .. }) => assert_eq!(name, "max_authority"),
            _ => panic!("Expected InvalidLimit error"),
        }
        assert!(AdaptivePID::new(PIDConfig { skip: 0, ..PIDConfig::default() }).is_err());
        assert!(AdaptivePID::new(PIDConfig { kp: f32::NAN, ..PIDConfig::default() }).is_err());
        assert!(AdaptivePID::new(PIDConfig { integral_leak: 1.5, ..PIDConfig::default() }).is_err());

        let mut pid = pid(PIDConfig::default());
        assert!(pid.set_kp(f32::INFINITY).is_err(), "Infinite kp should cause an error");
        pid.set_kp(1.2).expect("Valid kp should not cause an error")
            .set_kd(0.1).expect("Valid kd should not cause an error");
        assert_eq!(pid.kp(), 1.2);
        assert_eq!(pid.kd(), 0.1);
    }
}
