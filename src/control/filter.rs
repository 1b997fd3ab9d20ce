//! One-pole IIR low-pass filter shared by the speed and line estimators

use crate::system::config::LowPassCoefficients;

/// `y[n] = a0·y[n-1] + b0·x[n] + b1·x[n-1]` with a one-sample delay line
#[derive(Debug, Clone, Copy)]
pub struct LowPassFilter {
    coefficients: LowPassCoefficients,
    prev_input: f32,
    prev_output: f32,
}

impl LowPassFilter {
    /// Filter at rest, first output is `b0 * x`
    pub fn new(coefficients: LowPassCoefficients) -> Self {
        Self {
            coefficients,
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }

    /// Feed one sample, returns the filtered value
    pub fn update(&mut self, input: f32) -> f32 {
        let c = &self.coefficients;
        let output = c.a0 * self.prev_output + c.b0 * input + c.b1 * self.prev_input;
        self.prev_input = input;
        self.prev_output = output;
        output
    }

    /// Latest filtered value
    pub fn output(&self) -> f32 {
        self.prev_output
    }

    /// Clear the delay line, coefficients are kept
    pub fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_output = 0.0;
    }

    /// Coefficients in use
    pub fn coefficients(&self) -> LowPassCoefficients {
        self.coefficients
    }
}
