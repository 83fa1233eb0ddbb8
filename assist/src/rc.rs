use hal::ManualInput;

/// Raw signed 16-bit axes from a physical input device.
#[derive(Default, Debug, Clone, Copy)]
pub struct RcInput {
    pub channels: [i16; 8],
}

/// Maps device channels onto the three control axes.
#[derive(Debug, Clone, Copy)]
pub struct RcMapper {
    pub cyclic_x_channel: usize,
    pub cyclic_y_channel: usize,
    pub yaw_channel: usize,
}

impl Default for RcMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl RcMapper {
    /// Gamepad layout: left stick X/Y for cyclic, right stick X for pedals.
    pub fn new() -> Self {
        RcMapper {
            cyclic_x_channel: 0,
            cyclic_y_channel: 1,
            yaw_channel: 3,
        }
    }

    pub fn map(&self, input: RcInput) -> ManualInput {
        ManualInput::new(
            normalize(channel(&input, self.cyclic_x_channel)),
            normalize(channel(&input, self.cyclic_y_channel)),
            normalize(channel(&input, self.yaw_channel)),
        )
    }
}

fn channel(input: &RcInput, index: usize) -> i16 {
    input.channels.get(index).copied().unwrap_or(0)
}

fn normalize(raw: i16) -> f32 {
    raw as f32 / i16::MAX as f32
}
