// Trim (steady-state bias) learning with bumpless application
use filter::{slew_toward, BiasKalman};
use serde::{Deserialize, Serialize};

use crate::PIDError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// Alpha of the very slow long-term rate mean.
    pub long_lp_alpha: f32,
    /// Slow EMA alpha pulling `trim_est` toward the control preview.
    pub trim_alpha_slow: f32,
    /// |rate| at or below this counts as "near zero".
    pub zero_rate_threshold: f32,
    /// Seconds of continuous near-zero rate before a fast update.
    pub zero_stable_seconds: f32,
    /// Blend gain applied on a fast update.
    pub zero_fast_gain: f32,
    pub max_fast_updates_per_sec: f32,

    /// Variance normalisation for the confidence estimate.
    pub var_ref: f32,
    pub min_confidence: f32,
    pub max_confidence: f32,
    /// Alpha of the short-term mean / mean-square used for the variance.
    pub short_lp_alpha: f32,

    pub use_kalman: bool,
    pub kf_q: f32,
    pub kf_r: f32,
    pub kf_init_p: f32,
    /// The Kalman bias only feeds the slow path below this uncertainty.
    pub kalman_trust_p: f32,

    pub apply_lp_alpha: f32,
    /// Maximum change of the applied trim per second.
    pub apply_slew_rate: f32,
    pub trim_min: f32,
    pub trim_max: f32,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            long_lp_alpha: 0.005,
            trim_alpha_slow: 1e-4,
            zero_rate_threshold: 0.01,
            zero_stable_seconds: 1.0,
            zero_fast_gain: 0.05,
            max_fast_updates_per_sec: 1.0,
            var_ref: 1e-4,
            min_confidence: 0.2,
            max_confidence: 3.0,
            short_lp_alpha: 0.2,
            use_kalman: true,
            kf_q: 1e-6,
            kf_r: 1e-3,
            kf_init_p: 1e-3,
            kalman_trust_p: 1e-2,
            apply_lp_alpha: 0.2,
            apply_slew_rate: 0.3,
            trim_min: -0.5,
            trim_max: 0.5,
        }
    }
}

impl TrimConfig {
    pub fn validate(&self) -> Result<(), PIDError> {
        if !(self.trim_min.is_finite() && self.trim_max.is_finite() && self.trim_min <= self.trim_max) {
            return Err(PIDError::InvalidLimit { name: "trim_min", value: self.trim_min });
        }
        if !(self.apply_slew_rate.is_finite() && self.apply_slew_rate >= 0.0) {
            return Err(PIDError::InvalidLimit { name: "apply_slew_rate", value: self.apply_slew_rate });
        }
        for (name, value) in [
            ("long_lp_alpha", self.long_lp_alpha),
            ("trim_alpha_slow", self.trim_alpha_slow),
            ("zero_fast_gain", self.zero_fast_gain),
            ("short_lp_alpha", self.short_lp_alpha),
            ("apply_lp_alpha", self.apply_lp_alpha),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PIDError::InvalidLimit { name, value });
            }
        }
        if !(self.kf_q >= 0.0 && self.kf_r > 0.0 && self.kf_init_p >= 0.0) {
            return Err(PIDError::InvalidLimit { name: "kf_r", value: self.kf_r });
        }
        Ok(())
    }
}

/// Per-tick snapshot of the estimator internals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrimDiagnostics {
    pub trim_est: f32,
    pub trim_applied: f32,
    pub short_var: f32,
    pub long_lp: f32,
    pub confidence: f32,
    pub fast_update: bool,
    pub stable_seconds: f32,
    pub kf_bias: Option<f32>,
    pub kf_p: Option<f32>,
    pub delta_trim: f32,
    pub manual_active: bool,
}

/// Learns the steady output needed to hold zero rate.
///
/// Three paths run every tick: a Kalman bias filter, then either a fast
/// zero-rate absorption step or a slow EMA step. The applied trim follows the
/// estimate through a low-pass and a slew limiter, so a jump in the estimate
/// never shows up as a jump in the output.
#[derive(Debug, Clone)]
pub struct TrimEstimator {
    config: TrimConfig,

    trim_est: f32,
    trim_applied: f32,

    short_lp: f32,
    short_lp_sq: f32,
    long_lp: f32,
    stable_counter: u32,
    // Seconds since the last fast update; `None` until the first one.
    since_fast_update: Option<f32>,

    kf: Option<BiasKalman>,
    last_diag: TrimDiagnostics,
}

impl TrimEstimator {
    pub fn new(config: TrimConfig) -> Result<Self, PIDError> {
        config.validate()?;
        let kf = config
            .use_kalman
            .then(|| BiasKalman::new(config.kf_q, config.kf_r, 0.0, config.kf_init_p));
        Ok(Self {
            config,
            trim_est: 0.0,
            trim_applied: 0.0,
            short_lp: 0.0,
            short_lp_sq: 0.0,
            long_lp: 0.0,
            stable_counter: 0,
            since_fast_update: None,
            kf,
            last_diag: TrimDiagnostics::default(),
        })
    }

    pub fn config(&self) -> &TrimConfig {
        &self.config
    }

    /// Advance the estimator by one tick.
    ///
    /// `control_preview` is the total control the loop is currently
    /// commanding; `predicted_rate` (if known) turns the Kalman measurement
    /// into a residual.
    pub fn update(
        &mut self,
        measured_rate: f32,
        control_preview: f32,
        manual_active: bool,
        dt: f32,
        predicted_rate: Option<f32>,
    ) -> TrimDiagnostics {
        if !measured_rate.is_finite() || !control_preview.is_finite() || !dt.is_finite() || dt <= 0.0 {
            return self.last_diag;
        }
        let cfg = self.config;

        let a = cfg.short_lp_alpha;
        self.short_lp = (1.0 - a) * self.short_lp + a * measured_rate;
        self.short_lp_sq = (1.0 - a) * self.short_lp_sq + a * measured_rate * measured_rate;
        let short_var = (self.short_lp_sq - self.short_lp * self.short_lp).max(0.0);

        self.long_lp += cfg.long_lp_alpha * (measured_rate - self.long_lp);

        let kf_bias = self.kf.as_mut().map(|kf| {
            kf.predict();
            let z = match predicted_rate {
                Some(p) if p.is_finite() => measured_rate - p,
                _ => measured_rate,
            };
            kf.update(z)
        });

        let near_zero = measured_rate.abs() <= cfg.zero_rate_threshold;
        let quiet = short_var < (cfg.var_ref * 10.0).max(1e-6);
        if near_zero && quiet && !manual_active {
            self.stable_counter = self.stable_counter.saturating_add(1);
        } else {
            self.stable_counter = 0;
        }
        let stable_seconds = self.stable_counter as f32 * dt;

        let confidence = (1.0 / (1.0 + short_var / cfg.var_ref.max(1e-12)))
            .clamp(cfg.min_confidence, cfg.max_confidence);

        if let Some(elapsed) = self.since_fast_update.as_mut() {
            *elapsed += dt;
        }
        let min_interval = 1.0 / cfg.max_fast_updates_per_sec.max(1e-6);
        let cooled_down = self.since_fast_update.map_or(true, |t| t >= min_interval);

        let fast_update = stable_seconds >= cfg.zero_stable_seconds && cooled_down;
        if fast_update {
            self.trim_est = (1.0 - cfg.zero_fast_gain) * self.trim_est + cfg.zero_fast_gain * control_preview;
            self.since_fast_update = Some(0.0);
            log::debug!("trim fast update: est={:.4} preview={:.4}", self.trim_est, control_preview);
        } else {
            let mut preview = control_preview;
            if let (Some(bias), Some(kf)) = (kf_bias, self.kf.as_ref()) {
                if kf.uncertainty() < cfg.kalman_trust_p {
                    preview = 0.5 * preview + 0.5 * (control_preview - bias);
                }
            }
            let alpha = (cfg.trim_alpha_slow * confidence).min(1.0);
            self.trim_est = (1.0 - alpha) * self.trim_est + alpha * preview;
        }

        let lp_target = (1.0 - cfg.apply_lp_alpha) * self.trim_applied + cfg.apply_lp_alpha * self.trim_est;
        let applied = slew_toward(self.trim_applied, lp_target, cfg.apply_slew_rate * dt)
            .clamp(cfg.trim_min, cfg.trim_max);
        let delta_trim = applied - self.trim_applied;
        self.trim_applied = applied;

        self.last_diag = TrimDiagnostics {
            trim_est: self.trim_est,
            trim_applied: self.trim_applied,
            short_var,
            long_lp: self.long_lp,
            confidence,
            fast_update,
            stable_seconds,
            kf_bias: self.kf.as_ref().map(|kf| kf.bias()),
            kf_p: self.kf.as_ref().map(|kf| kf.uncertainty()),
            delta_trim,
            manual_active,
        };
        self.last_diag
    }

    /// Integrator adjustment that cancels a trim step of `delta_trim` in a
    /// loop computing `u = Kp*e + Ki*I + Kd*d`. Zero when `ki` is zero.
    pub fn compute_integrator_compensation(&self, delta_trim: f32, ki: f32) -> f32 {
        if ki.abs() < 1e-12 || !delta_trim.is_finite() {
            return 0.0;
        }
        -delta_trim / ki
    }

    pub fn set_trim(&mut self, value: f32) {
        if value.is_finite() {
            self.trim_est = value.clamp(self.config.trim_min, self.config.trim_max);
        }
    }

    pub fn trim_est(&self) -> f32 {
        self.trim_est
    }

    pub fn trim_applied(&self) -> f32 {
        self.trim_applied
    }

    pub fn last_diagnostics(&self) -> &TrimDiagnostics {
        &self.last_diag
    }

    pub fn reset(&mut self) {
        self.trim_est = 0.0;
        self.trim_applied = 0.0;
        self.short_lp = 0.0;
        self.short_lp_sq = 0.0;
        self.long_lp = 0.0;
        self.stable_counter = 0;
        self.since_fast_update = None;
        if let Some(kf) = self.kf.as_mut() {
            kf.reset();
        }
        self.last_diag = TrimDiagnostics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::{TrimConfig, TrimEstimator};

    const DT: f32 = 0.02;

    fn estimator() -> TrimEstimator {
        TrimEstimator::new(TrimConfig::default()).expect("Default trim config should be valid")
    }

    #[test]
    fn test_converges_to_constant_preview() {
        let mut trim = estimator();
        for _ in 0..10_000 {
            trim.update(0.0, 0.2, false, DT, None);
        }
        assert!((trim.trim_est() - 0.2).abs() < 0.01, "trim_est should approach 0.2, got {}", trim.trim_est());
        assert!((trim.trim_applied() - 0.2).abs() < 0.01, "trim_applied should approach 0.2, got {}", trim.trim_applied());
    }

    #[test]
    fn test_applied_trim_is_slew_limited() {
        let mut trim = estimator();
        let max_step = trim.config().apply_slew_rate * DT;
        trim.set_trim(0.5);
        let mut prev = trim.trim_applied();
        for i in 0..500 {
            // Alternate previews so both paths are exercised
            let preview = if i % 50 < 25 { 0.5 } else { -0.5 };
            let diag = trim.update(0.0, preview, false, DT, None);
            assert!((diag.trim_applied - prev).abs() <= max_step + 1e-6, "Step {} exceeded slew limit", diag.delta_trim);
            assert!(diag.trim_applied <= 0.5 && diag.trim_applied >= -0.5);
            prev = diag.trim_applied;
        }
    }

    #[test]
    fn test_fast_update_needs_stable_window() {
        let mut trim = estimator();
        let ticks_needed = (1.0 / DT) as usize;
        let mut first_fast = None;
        for i in 0..ticks_needed * 2 {
            let diag = trim.update(0.0, 0.3, false, DT, None);
            if diag.fast_update && first_fast.is_none() {
                first_fast = Some(i);
            }
        }
        let first = first_fast.expect("A fast update should happen after one stable second");
        assert!(first + 2 >= ticks_needed, "Fast update came too early at tick {}", first);
    }

    #[test]
    fn test_no_fast_update_while_manual_or_moving() {
        let mut trim = estimator();
        for _ in 0..200 {
            let diag = trim.update(0.0, 0.3, true, DT, None);
            assert!(!diag.fast_update, "Manual input should block fast updates");
        }
        for _ in 0..200 {
            let diag = trim.update(0.5, 0.3, false, DT, None);
            assert!(!diag.fast_update, "A turning vehicle should block fast updates");
        }
    }

    #[test]
    fn test_fast_update_rate_limited() {
        let mut trim = estimator();
        let fast = (0..500)
            .filter(|_| trim.update(0.0, 0.1, false, DT, None).fast_update)
            .count();
        // 10 s of data at one update per second after the first stable second
        assert!(fast <= 10, "Expected at most 10 fast updates, got {}", fast);
        assert!(fast >= 8, "Expected repeated fast updates, got {}", fast);
    }

    #[test]
    fn test_integrator_compensation() {
        let trim = estimator();
        assert!((trim.compute_integrator_compensation(0.02, 0.5) + 0.04).abs() < 1e-6);
        assert_eq!(trim.compute_integrator_compensation(0.02, 0.0), 0.0, "Zero ki should short-circuit");
    }

    #[test]
    fn test_reset() {
        let mut trim = estimator();
        for _ in 0..300 {
            trim.update(0.0, 0.4, false, DT, None);
        }
        trim.reset();
        assert_eq!(trim.trim_est(), 0.0);
        assert_eq!(trim.trim_applied(), 0.0);
        assert_eq!(trim.last_diagnostics().kf_p, None);
    }

    #[test]
    fn test_invalid_config() {
        let config = TrimConfig { trim_min: 1.0, trim_max: -1.0, ..TrimConfig::default() };
        assert!(TrimEstimator::new(config).is_err(), "Inverted trim range should be rejected");
    }
}
