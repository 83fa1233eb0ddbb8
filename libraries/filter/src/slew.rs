/// Three-way sign: -1, 0 or 1.
pub fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Move `current` toward `target` by at most `max_step` (absolute).
pub fn slew_toward(current: f32, target: f32, max_step: f32) -> f32 {
    let max_step = max_step.abs();
    let delta = target - current;
    if delta > max_step {
        current + max_step
    } else if delta < -max_step {
        current - max_step
    } else {
        target
    }
}
