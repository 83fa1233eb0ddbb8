use filter::sign;
use motion::{angle_diff, MotionState};
use pid::{AdaptivePID, PIDError, TrimDiagnostics, TrimEstimator};

use crate::config::{TrimBlend, YawConfig};

/// Heading hold with yaw-rate damping.
///
/// The outer loop turns the heading error into a yaw-rate setpoint and only
/// runs once a heading has been captured. The inner loop tracks that setpoint
/// (zero without a target) every tick the pedals are centered. Learned trim
/// is added on top.
#[derive(Debug, Clone)]
pub struct YawLaw {
    config: YawConfig,
    heading: AdaptivePID,
    rate: AdaptivePID,
    trim: Option<TrimEstimator>,

    target_yaw: Option<f32>,
    last_manual_sign: f32,
    prev_manual_active: bool,
    last_output: f32,
}

impl YawLaw {
    pub fn new(config: YawConfig) -> Result<Self, PIDError> {
        let trim = if config.trim_enabled {
            let mut trim = TrimEstimator::new(config.trim)?;
            trim.set_trim(config.initial_trim);
            Some(trim)
        } else {
            None
        };
        Ok(Self {
            heading: AdaptivePID::new(config.heading)?,
            rate: AdaptivePID::new(config.rate)?,
            trim,
            target_yaw: None,
            last_manual_sign: 0.0,
            prev_manual_active: false,
            last_output: 0.0,
            config,
        })
    }

    /// Run one tick and return the yaw axis in `[-1, 1]`, or `None` while
    /// blocked.
    pub fn update(&mut self, motion: &MotionState, manual: f32, blocked: bool, dt: f32) -> Option<f32> {
        if blocked {
            return None;
        }

        let yaw = motion.attitude().yaw;
        let yaw_rate = motion.rates().yaw;
        let manual_active = manual.abs() >= self.config.manual_deadband;

        if manual_active {
            self.target_yaw = None;
            self.last_manual_sign = sign(manual);
        } else if self.target_yaw.is_none()
            && (yaw_rate.abs() <= self.config.capture_rate_threshold || sign(yaw_rate) == self.last_manual_sign)
        {
            self.target_yaw = Some(yaw);
            self.heading.reset();
            self.heading.force_available();
            log::debug!("yaw: heading captured at {:+.3}", yaw);
        }

        let setpoint = match self.target_yaw {
            Some(target) if !manual_active => self.run_heading(target, yaw, yaw_rate, dt),
            _ => 0.0,
        };

        let trim_applied = self.trim.as_ref().map_or(0.0, |t| t.trim_applied());
        if !manual_active {
            let error = setpoint - yaw_rate;
            if self.prev_manual_active {
                let prev_error = error + (yaw_rate - motion.prev_rates().yaw);
                self.rate
                    .manual_override_integral(error, None, dt, self.last_output - trim_applied, prev_error);
                log::debug!("yaw: auto engaged at {:+.3}", self.last_output);
            } else {
                self.rate.update(error, None, dt);
            }
        }

        let manual_term = if manual_active { manual } else { 0.0 };
        let auto = self.rate.output();

        let trim_applied = match self.trim.as_mut() {
            Some(trim) => {
                let preview = auto + manual_term + trim_applied;
                let diag = trim.update(yaw_rate, preview, manual_active, dt, None);
                if self.config.trim_blend == TrimBlend::IntegratorCompensation && !manual_active {
                    let compensation = trim.compute_integrator_compensation(diag.delta_trim, self.rate.ki());
                    self.rate.add_integral(compensation);
                }
                diag.trim_applied
            }
            None => 0.0,
        };

        let output = (auto + manual_term + trim_applied).clamp(-1.0, 1.0);
        log::trace!(
            "yaw: out={:+.3} auto={:+.3} trim={:+.4} target={:?}",
            output,
            auto,
            trim_applied,
            self.target_yaw
        );

        self.last_output = output;
        self.prev_manual_active = manual_active;
        Some(output)
    }

    /// Outer loop. Returns the yaw-rate setpoint.
    ///
    /// The error shrinks as yaw grows, so its derivative is `-yaw_rate`.
    fn run_heading(&mut self, target: f32, yaw: f32, yaw_rate: f32, dt: f32) -> f32 {
        let mut error = angle_diff(target, yaw);
        if error.abs() > self.config.relatch_tolerance {
            log::debug!("yaw: heading jump of {:+.3} rad, re-latching at {:+.3}", error, yaw);
            self.target_yaw = Some(yaw);
            self.heading.reset();
            self.heading.force_available();
            error = 0.0;
        }
        if self.heading.is_available() {
            self.heading
                .update(error, Some(-yaw_rate), dt * self.heading.skip() as f32);
        }
        self.heading.tick_skip();
        self.heading.output()
    }

    /// Heading being held, if any.
    pub fn target_yaw(&self) -> Option<f32> {
        self.target_yaw
    }

    /// Current wrapped heading error, zero without a target.
    pub fn heading_error(&self, motion: &MotionState) -> f32 {
        self.target_yaw
            .map_or(0.0, |target| angle_diff(target, motion.attitude().yaw))
    }

    /// A heading is captured and the heading loop has settled on it.
    pub fn is_holding(&self) -> bool {
        self.target_yaw.is_some() && self.heading.is_stable()
    }

    pub fn trim_applied(&self) -> f32 {
        self.trim.as_ref().map_or(0.0, |t| t.trim_applied())
    }

    pub fn trim_diagnostics(&self) -> Option<&TrimDiagnostics> {
        self.trim.as_ref().map(|t| t.last_diagnostics())
    }

    pub fn rate_loop(&self) -> &AdaptivePID {
        &self.rate
    }

    pub fn heading_loop(&self) -> &AdaptivePID {
        &self.heading
    }

    pub fn reset(&mut self) {
        self.heading.reset();
        self.rate.reset();
        if let Some(trim) = self.trim.as_mut() {
            trim.reset();
            trim.set_trim(self.config.initial_trim);
        }
        self.target_yaw = None;
        self.last_manual_sign = 0.0;
        self.prev_manual_active = false;
        self.last_output = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::PI;
    use hal::{Attitude, MotionSample};

    const DT: f32 = 0.02;

    fn law(config: YawConfig) -> YawLaw {
        YawLaw::new(config).expect("Yaw config should be valid")
    }

    fn motion_at(yaw: f32, yaw_rate: f32) -> MotionState {
        let sample = MotionSample {
            attitude: Attitude::new(0.0, 0.0, yaw),
            rates: Attitude::new(0.0, 0.0, yaw_rate),
            ..Default::default()
        };
        let mut motion = MotionState::new(0.25);
        motion.update(&sample);
        motion.update(&sample);
        motion
    }

    #[test]
    fn test_captures_heading_when_still() {
        let mut yaw = law(YawConfig::default());
        let motion = motion_at(1.0, 0.0);
        for _ in 0..50 {
            let out = yaw.update(&motion, 0.0, false, DT).expect("Not blocked");
            assert!((-1.0..=1.0).contains(&out));
        }
        assert_eq!(yaw.target_yaw(), Some(1.0));
        assert!(yaw.heading_error(&motion).abs() < 1e-6);
    }

    #[test]
    fn test_no_capture_while_turning() {
        let mut yaw = law(YawConfig::default());
        let motion = motion_at(0.0, 0.3);
        yaw.update(&motion, 0.0, false, DT);
        assert_eq!(yaw.target_yaw(), None, "Should wait for the turn to stop");
    }

    #[test]
    fn test_capture_when_turn_continues_in_pedal_direction() {
        let mut yaw = law(YawConfig::default());
        let motion = motion_at(0.0, 0.3);
        yaw.update(&motion, 0.5, false, DT);
        assert_eq!(yaw.target_yaw(), None, "Manual input clears the target");
        yaw.update(&motion, 0.0, false, DT);
        assert_eq!(yaw.target_yaw(), Some(0.0));
    }

    #[test]
    fn test_heading_error_wraps_across_seam() {
        let mut yaw = law(YawConfig::default());
        yaw.update(&motion_at(PI - 0.05, 0.0), 0.0, false, DT);
        let motion = motion_at(-PI + 0.05, 0.0);
        let error = yaw.heading_error(&motion);
        assert!((error + 0.1).abs() < 1e-4, "Expected -0.1 across the seam, got {}", error);
        assert!((-PI..=PI).contains(&error));
    }

    #[test]
    fn test_large_heading_jump_relatches() {
        let mut yaw = law(YawConfig::default());
        yaw.update(&motion_at(0.0, 0.0), 0.0, false, DT);
        assert_eq!(yaw.target_yaw(), Some(0.0));
        yaw.update(&motion_at(1.5, 0.0), 0.0, false, DT);
        assert_eq!(yaw.target_yaw(), Some(1.5), "Error beyond tolerance should move the target");
    }

    #[test]
    fn test_heading_hold_steers_back() {
        let mut config = YawConfig::default();
        config.trim_enabled = false;
        let mut yaw = law(config);
        yaw.update(&motion_at(0.0, 0.0), 0.0, false, DT);
        let mut out = 0.0;
        for _ in 0..10 {
            out = yaw.update(&motion_at(-0.1, 0.0), 0.0, false, DT).expect("Not blocked");
        }
        assert!(out > 0.0, "Left of target should yaw right, got {}", out);
    }

    #[test]
    fn test_heading_derivative_uses_yaw_rate() {
        let mut config = YawConfig::default();
        config.heading.kd = 0.3;
        let mut yaw = law(config);
        yaw.update(&motion_at(0.0, 0.03), 0.0, false, DT);
        assert_eq!(yaw.target_yaw(), Some(0.0));
        assert!((yaw.heading_loop().rate() + 0.03).abs() < 1e-6, "Derivative should be -yaw_rate");

        // Heading moves away with no measured rate: no derivative kick
        let mut yaw = law(config);
        for i in 0..20 {
            yaw.update(&motion_at(-0.005 * i as f32, 0.0), 0.0, false, DT);
        }
        let motion = motion_at(-0.095, 0.0);
        assert!(yaw.heading_error(&motion).abs() > 0.05);
        assert_eq!(yaw.heading_loop().rate(), 0.0, "Zero measured rate should give no derivative term");
    }

    #[test]
    fn test_blocked_leaves_state() {
        let mut yaw = law(YawConfig::default());
        let motion = motion_at(0.4, 0.0);
        yaw.update(&motion, 0.0, false, DT);
        let integral = yaw.rate_loop().integral();
        assert_eq!(yaw.update(&motion_at(0.2, 0.5), 0.3, true, DT), None);
        assert_eq!(yaw.target_yaw(), Some(0.4));
        assert_eq!(yaw.rate_loop().integral(), integral);
    }

    #[test]
    fn test_pedal_release_is_bumpless() {
        let mut config = YawConfig::default();
        config.trim_enabled = false;
        let mut yaw = law(config);
        let motion = motion_at(0.0, 0.02);
        let mut held = 0.0;
        for _ in 0..20 {
            held = yaw.update(&motion, 0.3, false, DT).expect("Not blocked");
        }
        let released = yaw.update(&motion, 0.0, false, DT).expect("Not blocked");
        assert!((released - held).abs() < 1e-4, "Yaw jumped from {} to {}", held, released);
    }

    #[test]
    fn test_trim_step_is_slew_limited() {
        let mut yaw = law(YawConfig::default());
        let motion = motion_at(0.0, 0.0);
        let max_step = YawConfig::default().trim.apply_slew_rate * DT;
        let mut prev = yaw.trim_applied();
        for _ in 0..500 {
            yaw.update(&motion, 0.4, false, DT);
            let applied = yaw.trim_applied();
            assert!((applied - prev).abs() <= max_step + 1e-6);
            prev = applied;
        }
    }

    #[test]
    fn test_initial_trim_survives_reset() {
        let mut config = YawConfig::default();
        config.initial_trim = 0.3;
        let mut yaw = law(config);
        let motion = motion_at(0.0, 0.0);
        yaw.update(&motion, 0.0, false, DT);
        let est = yaw.trim_diagnostics().expect("Trim is enabled").trim_est;
        assert!(est > 0.25, "Estimate should start from the configured trim, got {}", est);

        yaw.reset();
        yaw.update(&motion, 0.0, false, DT);
        let est = yaw.trim_diagnostics().expect("Trim is enabled").trim_est;
        assert!(est > 0.25, "Reset should restore the configured trim, got {}", est);
    }

    #[test]
    fn test_holding_after_capture() {
        let mut yaw = law(YawConfig::default());
        let motion = motion_at(0.5, 0.0);
        assert!(!yaw.is_holding());
        for _ in 0..5 {
            yaw.update(&motion, 0.0, false, DT);
        }
        assert!(yaw.is_holding(), "Settled capture should report holding");
        yaw.update(&motion, 0.4, false, DT);
        assert!(!yaw.is_holding(), "Pedal input drops the hold");
    }

    #[test]
    fn test_integrator_compensation_offsets_trim() {
        let mut config = YawConfig::default();
        config.trim_blend = TrimBlend::IntegratorCompensation;
        let mut yaw = law(config);
        let motion = motion_at(0.0, 0.0);
        for _ in 0..200 {
            let out = yaw.update(&motion, 0.0, false, DT).expect("Not blocked");
            assert!((-1.0..=1.0).contains(&out));
        }
        let diag = yaw.trim_diagnostics().expect("Trim is enabled");
        assert!(diag.trim_applied.is_finite());
    }
}
