/// Output device interface

/// Per-tick command for the three control axes.
///
/// `None` means "leave this axis where it is", not "drive it to zero".
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct AxisOutput {
    pub cyclic_x: Option<f32>,
    pub cyclic_y: Option<f32>,
    pub yaw: Option<f32>,
}

impl AxisOutput {
    /// Output that leaves every axis untouched.
    pub const HOLD: AxisOutput = AxisOutput { cyclic_x: None, cyclic_y: None, yaw: None };

    pub fn new(cyclic_x: Option<f32>, cyclic_y: Option<f32>, yaw: Option<f32>) -> Self {
        Self { cyclic_x, cyclic_y, yaw }
    }

    pub fn is_hold(&self) -> bool {
        self.cyclic_x.is_none() && self.cyclic_y.is_none() && self.yaw.is_none()
    }

    /// Apply the present axes to `axes`, leaving absent ones unchanged.
    pub fn apply_to(&self, axes: &mut DeviceAxes) {
        if let Some(x) = self.cyclic_x {
            axes.cyclic_x = x.clamp(-1.0, 1.0);
        }
        if let Some(y) = self.cyclic_y {
            axes.cyclic_y = y.clamp(-1.0, 1.0);
        }
        if let Some(yaw) = self.yaw {
            axes.yaw = yaw.clamp(-1.0, 1.0);
        }
    }
}

/// Last values held by an output device, each in `[-1, 1]`.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct DeviceAxes {
    pub cyclic_x: f32,
    pub cyclic_y: f32,
    pub yaw: f32,
}

/// Virtual joystick range used by the output device.
pub const DEVICE_AXIS_MAX: u16 = 32767;

impl DeviceAxes {
    /// Map to raw device units. The longitudinal axis is inverted because
    /// joystick Y grows toward the pilot.
    pub fn to_device(&self) -> [u16; 3] {
        [
            norm_to_device(self.cyclic_x),
            norm_to_device(-self.cyclic_y),
            norm_to_device(self.yaw),
        ]
    }

    /// Inverse of [`DeviceAxes::to_device`].
    pub fn from_device(raw: [u16; 3]) -> Self {
        Self {
            cyclic_x: device_to_norm(raw[0]),
            cyclic_y: -device_to_norm(raw[1]),
            yaw: device_to_norm(raw[2]),
        }
    }
}

fn norm_to_device(value: f32) -> u16 {
    let v = value.clamp(-1.0, 1.0);
    ((v + 1.0) * 0.5 * DEVICE_AXIS_MAX as f32).round() as u16
}

fn device_to_norm(raw: u16) -> f32 {
    (raw.min(DEVICE_AXIS_MAX) as f32 / DEVICE_AXIS_MAX as f32 * 2.0 - 1.0).clamp(-1.0, 1.0)
}

/// Sink for the control outputs.
pub trait OutputDevice {
    /// Write the present axes. Returns true if the device accepted the write.
    fn write_axes(&mut self, output: &AxisOutput) -> bool;

    /// Center every axis
    ///
    /// Returns true if the write was successful
    fn neutral_all(&mut self) -> bool {
        self.write_axes(&AxisOutput::new(Some(0.0), Some(0.0), Some(0.0)))
    }
}
