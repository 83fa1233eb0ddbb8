/// Scalar random-walk bias estimator.
///
/// Model: `bias[k+1] = bias[k] + w`, `z = bias + v`, with `w ~ N(0, q)` and
/// `v ~ N(0, r)`.
#[derive(Debug, Clone, Copy)]
pub struct BiasKalman {
    q: f32,
    r: f32,
    init_bias: f32,
    init_p: f32,
    bias: f32,
    p: f32,
}

impl BiasKalman {
    pub fn new(q: f32, r: f32, init_bias: f32, init_p: f32) -> Self {
        Self {
            q,
            r,
            init_bias,
            init_p,
            bias: init_bias,
            p: init_p,
        }
    }

    /// Inflate the uncertainty by the process noise.
    pub fn predict(&mut self) {
        self.p += self.q;
    }

    /// Correct the estimate with measurement `z` and return the new bias.
    pub fn update(&mut self, z: f32) -> f32 {
        let denom = self.p + self.r;
        if denom <= 0.0 || !z.is_finite() {
            return self.bias;
        }
        let k = self.p / denom;
        self.bias += k * (z - self.bias);
        self.p *= 1.0 - k;
        self.bias
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn uncertainty(&self) -> f32 {
        self.p
    }

    pub fn reset(&mut self) {
        self.bias = self.init_bias;
        self.p = self.init_p;
    }
}
