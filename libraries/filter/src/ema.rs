/// Exponential moving average (single-pole low-pass).
///
/// `y = alpha * x + (1 - alpha) * y_prev`. The first sample seeds the output
/// directly so there is no warm-up transient from an arbitrary initial value.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f32,
    value: f32,
    initialized: bool,
}

impl Ema {
    /// Create a new filter. `alpha` is clamped to `[0, 1]`.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: 0.0,
            initialized: false,
        }
    }

    pub fn update(&mut self, x: f32) -> f32 {
        if !self.initialized {
            self.value = x;
            self.initialized = true;
        } else {
            self.value = self.alpha * x + (1.0 - self.alpha) * self.value;
        }
        self.value
    }

    /// Last filtered value, 0.0 before the first update.
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.initialized = false;
    }
}
