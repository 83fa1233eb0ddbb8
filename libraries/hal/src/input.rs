/// Manual input interface

/// Pilot stick positions, each in `[-1, 1]`.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct ManualInput {
    /// Lateral cyclic, positive right
    pub cyclic_x: f32,

    /// Longitudinal cyclic, positive forward (nose down)
    pub cyclic_y: f32,

    /// Pedals, positive yaws right
    pub yaw: f32,
}

impl ManualInput {
    /// Build an input, clamping each axis and mapping non-finite values to 0.
    pub fn new(cyclic_x: f32, cyclic_y: f32, yaw: f32) -> Self {
        Self {
            cyclic_x: sanitize(cyclic_x),
            cyclic_y: sanitize(cyclic_y),
            yaw: sanitize(yaw),
        }
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Source of the most recent pilot input.
///
/// Implementations must not block.
pub trait ManualInputSource {
    fn latest_input(&mut self) -> ManualInput;
}

/// Discrete mode commands from hotkeys or buttons. Each is edge-triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCommand {
    /// Cycle cyclic assist OFF -> AUTO -> HOVER -> OFF
    ToggleCyclic,

    /// Switch heading hold / yaw damping on or off
    ToggleYawHold,

    /// Freeze every output axis
    Freeze,

    /// Release a freeze
    Unfreeze,
}

#[cfg(test)]
mod tests {
    use super::ManualInput;

    #[test]
    fn test_manual_input_is_clamped() {
        let input = ManualInput::new(1.7, f32::NAN, -3.0);
        assert_eq!(input, ManualInput { cyclic_x: 1.0, cyclic_y: 0.0, yaw: -1.0 });
    }
}
