use std::collections::VecDeque;

use filter::{slew_toward, Ema};
use hal::Vector3d;
use motion::MotionState;
use pid::{AdaptivePID, PIDError};

use crate::config::CyclicConfig;

/// Cascaded cyclic controller.
///
/// Each axis runs up to four loops, from the outside in: position offset,
/// body velocity, attitude, attitude rate. Outer loops run at a fraction of
/// the tick rate set by their `skip` and integrate over the matching longer
/// period. In cruise only the attitude and rate loops run and the pitch target
/// follows the recent pitch the pilot has been holding.
#[derive(Debug, Clone)]
pub struct CyclicLaw {
    config: CyclicConfig,

    right_offset: AdaptivePID,
    right_v: AdaptivePID,
    roll: AdaptivePID,
    roll_rate: AdaptivePID,
    forward_offset: AdaptivePID,
    forward_v: AdaptivePID,
    pitch: AdaptivePID,
    pitch_rate: AdaptivePID,

    ema_x: Ema,
    ema_y: Ema,

    pitch_history: VecDeque<f32>,
    history_len: usize,
    target_pitch: f32,
    reference: Option<Vector3d>,

    prev_manual_active: bool,
    prev_hovering: bool,
    // Last values returned, per axis
    last_output: (f32, f32),
    // Part of the held stick the loops could not absorb on engage, fading out
    handover: (f32, f32),
}

impl CyclicLaw {
    /// `period` is the nominal tick length in seconds and sizes the pitch
    /// averaging window.
    pub fn new(config: CyclicConfig, ema_alpha: f32, period: f32) -> Result<Self, PIDError> {
        let history_len = if period > 0.0 {
            ((config.pitch_history_seconds / period) + 1e-3).floor().max(1.0) as usize
        } else {
            1
        };
        Ok(Self {
            right_offset: AdaptivePID::new(config.right_offset)?,
            right_v: AdaptivePID::new(config.right_v)?,
            roll: AdaptivePID::new(config.roll)?,
            roll_rate: AdaptivePID::new(config.roll_rate)?,
            forward_offset: AdaptivePID::new(config.forward_offset)?,
            forward_v: AdaptivePID::new(config.forward_v)?,
            pitch: AdaptivePID::new(config.pitch)?,
            pitch_rate: AdaptivePID::new(config.pitch_rate)?,
            ema_x: Ema::new(ema_alpha),
            ema_y: Ema::new(ema_alpha),
            pitch_history: VecDeque::with_capacity(history_len),
            history_len,
            target_pitch: 0.0,
            reference: None,
            prev_manual_active: false,
            prev_hovering: false,
            last_output: (0.0, 0.0),
            handover: (0.0, 0.0),
            config,
        })
    }

    /// Run one tick and return `(cyclic_x, cyclic_y)` in `[-1, 1]`, or `None`
    /// while blocked.
    ///
    /// `manual_x` / `manual_y` are the shaped stick positions.
    pub fn update(
        &mut self,
        motion: &MotionState,
        manual_x: f32,
        manual_y: f32,
        hovering: bool,
        blocked: bool,
        dt: f32,
    ) -> Option<(f32, f32)> {
        if blocked {
            self.pitch_history.clear();
            return None;
        }

        let cfg = self.config;
        let manual_active = manual_x.abs() >= cfg.manual_deadband || manual_y.abs() >= cfg.manual_deadband;

        if hovering != self.prev_hovering {
            self.on_hover_change(motion, hovering);
        }

        self.record_pitch(motion, manual_x, manual_y, hovering);
        self.schedule_attitude_ki(hovering);

        let engaging = self.prev_manual_active && !manual_active;
        if engaging {
            self.engage(motion, hovering, dt);
        } else {
            let step = cfg.handover_slew * dt;
            self.handover = (
                slew_toward(self.handover.0, 0.0, step),
                slew_toward(self.handover.1, 0.0, step),
            );
        }

        if !manual_active {
            if hovering {
                self.run_position_loops(motion, dt);
            }
            self.run_attitude_loops(motion, hovering, dt);
            if !engaging {
                let rates = motion.rates();
                let roll_error = -rates.roll + self.roll.output();
                let pitch_error = rates.pitch + self.pitch.output();
                self.roll_rate.update(roll_error, None, dt);
                self.pitch_rate.update(pitch_error, None, dt);
            }
            self.roll.tick_skip();
            self.pitch.tick_skip();
        }

        let auto_x = self.roll_rate.output() + self.handover.0;
        let auto_y = self.pitch_rate.output() + self.handover.1;
        let smooth_x = self.ema_x.update(auto_x);
        let smooth_y = self.ema_y.update(auto_y);

        let x = if manual_x.abs() > cfg.blend_threshold { smooth_x + manual_x } else { auto_x };
        let y = if manual_y.abs() > cfg.blend_threshold { smooth_y + manual_y } else { auto_y };
        let output = (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));

        log::trace!(
            "cyclic: x={:+.3} y={:+.3} target_pitch={:+.3} manual={}",
            output.0,
            output.1,
            self.target_pitch,
            manual_active
        );

        self.last_output = output;
        self.prev_manual_active = manual_active;
        Some(output)
    }

    fn on_hover_change(&mut self, motion: &MotionState, hovering: bool) {
        if hovering {
            self.right_offset.reset();
            self.forward_offset.reset();
            self.right_v.reset();
            self.forward_v.reset();
            self.reference = Some(*motion.position());
            log::debug!("cyclic: hover reference latched at {:?}", motion.position());
        } else {
            self.pitch_rate.reset();
            self.target_pitch = 0.0;
            self.reference = None;
        }
        self.prev_hovering = hovering;
    }

    fn record_pitch(&mut self, motion: &MotionState, manual_x: f32, manual_y: f32, hovering: bool) {
        if hovering {
            self.pitch_history.clear();
            self.target_pitch = 0.0;
            return;
        }
        if manual_y.abs() > self.config.manual_deadband
            && manual_x.abs() < self.config.pitch_history_lateral_limit
        {
            if self.pitch_history.len() >= self.history_len {
                self.pitch_history.pop_front();
            }
            self.pitch_history.push_back(motion.attitude().pitch);
        }
        self.target_pitch = self.pitch_average();
    }

    fn schedule_attitude_ki(&mut self, hovering: bool) {
        let ki = if hovering { 0.0 } else { self.config.cruise_attitude_ki };
        for pid in [&mut self.roll, &mut self.pitch] {
            if pid.ki() != ki {
                if let Err(e) = pid.update_ki(ki) {
                    log::warn!("cyclic: attitude ki not updated: {}", e);
                }
            }
        }
    }

    /// Hand the axes back to the loops at the output the pilot was holding.
    ///
    /// The attitude loops are back-solved to keep the setpoint they last gave
    /// the rate loops, then the rate loops are back-solved to the held output.
    /// Whatever a saturated integral cannot reproduce is kept as an offset
    /// that fades at `handover_slew`.
    fn engage(&mut self, motion: &MotionState, hovering: bool, dt: f32) {
        let attitude = motion.attitude();
        let prev_attitude = motion.prev_attitude();
        let rates = motion.rates();
        let prev_rates = motion.prev_rates();
        let (right_v_out, forward_v_out) = self.velocity_feed(hovering);

        let roll_skip = self.roll.skip() as f32;
        let roll_error = -attitude.roll + right_v_out;
        let roll_prev_error = roll_error + (attitude.roll - prev_attitude.roll) * roll_skip;
        let roll_setpoint = self.roll.output();
        self.roll.manual_override_integral(
            roll_error,
            Some(-rates.roll),
            dt * roll_skip,
            roll_setpoint,
            roll_prev_error,
        );

        let pitch_skip = self.pitch.skip() as f32;
        let pitch_error = attitude.pitch + forward_v_out - self.target_pitch;
        let pitch_prev_error = pitch_error - (attitude.pitch - prev_attitude.pitch) * pitch_skip;
        let pitch_setpoint = self.pitch.output();
        self.pitch.manual_override_integral(
            pitch_error,
            Some(rates.pitch),
            dt * pitch_skip,
            pitch_setpoint,
            pitch_prev_error,
        );

        let roll_rate_error = -rates.roll + self.roll.output();
        let roll_rate_prev_error = roll_rate_error + (rates.roll - prev_rates.roll);
        let x = self.roll_rate.manual_override_integral(
            roll_rate_error,
            None,
            dt,
            self.last_output.0,
            roll_rate_prev_error,
        );

        let pitch_rate_error = rates.pitch + self.pitch.output();
        let pitch_rate_prev_error = pitch_rate_error - (rates.pitch - prev_rates.pitch);
        let y = self.pitch_rate.manual_override_integral(
            pitch_rate_error,
            None,
            dt,
            self.last_output.1,
            pitch_rate_prev_error,
        );

        self.handover = (self.last_output.0 - x, self.last_output.1 - y);
        log::debug!(
            "cyclic: auto engaged at x={:+.3} y={:+.3}, handover offset x={:+.3} y={:+.3}",
            self.last_output.0,
            self.last_output.1,
            self.handover.0,
            self.handover.1
        );
    }

    /// Velocity loop outputs as attitude setpoints; zero outside hover.
    fn velocity_feed(&self, hovering: bool) -> (f32, f32) {
        if hovering {
            (self.right_v.output(), self.forward_v.output())
        } else {
            (0.0, 0.0)
        }
    }

    fn run_position_loops(&mut self, motion: &MotionState, dt: f32) {
        let limit = self.config.offset_limit;
        let reference = *self.reference.get_or_insert(*motion.position());
        let delta = motion.position_delta(&reference);
        let forward_offset = delta.x.clamp(-limit, limit);
        let right_offset = delta.y.clamp(-limit, limit);

        let roll_period = dt * self.roll.skip() as f32;
        let pitch_period = dt * self.pitch.skip() as f32;
        let right_v_period = roll_period * self.right_v.skip() as f32;
        let forward_v_period = pitch_period * self.forward_v.skip() as f32;

        if self.right_offset.is_available() && self.forward_offset.is_available() {
            self.right_offset
                .update(right_offset, None, right_v_period * self.right_offset.skip() as f32);
            self.forward_offset
                .update(forward_offset, None, forward_v_period * self.forward_offset.skip() as f32);
            self.reference = Some(*motion.position());
        }

        if self.right_v.is_available() && self.forward_v.is_available() {
            self.right_v
                .update(-motion.right_v() + self.right_offset.output(), None, right_v_period);
            self.right_offset.tick_skip();
            self.forward_v
                .update(-motion.forward_v() + self.forward_offset.output(), None, forward_v_period);
            self.forward_offset.tick_skip();
        }
    }

    fn run_attitude_loops(&mut self, motion: &MotionState, hovering: bool, dt: f32) {
        if !(self.roll.is_available() && self.pitch.is_available()) {
            return;
        }
        let (right_v_out, forward_v_out) = self.velocity_feed(hovering);
        let attitude = motion.attitude();
        let rates = motion.rates();

        // Derivative on the measured rate, so setpoint steps do not kick
        self.roll.update(
            -attitude.roll + right_v_out,
            Some(-rates.roll),
            dt * self.roll.skip() as f32,
        );
        self.right_v.tick_skip();
        self.pitch.update(
            attitude.pitch + forward_v_out - self.target_pitch,
            Some(rates.pitch),
            dt * self.pitch.skip() as f32,
        );
        self.forward_v.tick_skip();
    }

    pub fn pitch_average(&self) -> f32 {
        if self.pitch_history.is_empty() {
            0.0
        } else {
            self.pitch_history.iter().sum::<f32>() / self.pitch_history.len() as f32
        }
    }

    pub fn target_pitch(&self) -> f32 {
        self.target_pitch
    }

    /// Position the hover loops are holding, world frame.
    pub fn reference(&self) -> Option<&Vector3d> {
        self.reference.as_ref()
    }

    pub fn pitch_rate_loop(&self) -> &AdaptivePID {
        &self.pitch_rate
    }

    pub fn roll_rate_loop(&self) -> &AdaptivePID {
        &self.roll_rate
    }

    pub fn attitude_loops(&self) -> (&AdaptivePID, &AdaptivePID) {
        (&self.roll, &self.pitch)
    }

    pub fn velocity_loops(&self) -> (&AdaptivePID, &AdaptivePID) {
        (&self.right_v, &self.forward_v)
    }

    pub fn offset_loops(&self) -> (&AdaptivePID, &AdaptivePID) {
        (&self.right_offset, &self.forward_offset)
    }

    /// Engage offset still being faded out, `(cyclic_x, cyclic_y)`.
    pub fn handover(&self) -> (f32, f32) {
        self.handover
    }

    pub fn reset(&mut self) {
        for pid in [
            &mut self.right_offset,
            &mut self.right_v,
            &mut self.roll,
            &mut self.roll_rate,
            &mut self.forward_offset,
            &mut self.forward_v,
            &mut self.pitch,
            &mut self.pitch_rate,
        ] {
            pid.reset();
        }
        self.ema_x.reset();
        self.ema_y.reset();
        self.pitch_history.clear();
        self.target_pitch = 0.0;
        self.reference = None;
        self.prev_manual_active = false;
        self.prev_hovering = false;
        self.last_output = (0.0, 0.0);
        self.handover = (0.0, 0.0);
    }
}
