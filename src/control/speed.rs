//! Wheel speed estimation from encoder counts
//!
//! # Operation
//! Called once per control tick. The tick delta since the previous call is turned into a
//! rotational frequency assuming the configured fixed rate, then into linear speed at the wheel
//! rim, then low-pass filtered. Irregular call intervals give wrong frequencies; there is no
//! wall-clock correction.
//!
//! ```text
//! freq     = delta / (counts_per_pulse * pulses_per_rev) * rate
//! rpm      = freq * 60
//! speed    = 2π * r * freq
//! filtered = a0 * filtered' + b0 * speed + b1 * speed'
//! ```

use core::f32::consts::PI;

use crate::control::filter::LowPassFilter;
use crate::system::config::{DriveGeometry, LowPassCoefficients};
use crate::system::hal::Encoder;

/// Per-wheel estimate after the latest update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WheelSpeed {
    /// Ticks since the last reset
    pub ticks: i32,
    /// Wheel revolutions per second
    pub rotational_freq: f32,
    pub rpm: f32,
    /// Unfiltered rim speed (m/s)
    pub speed: f32,
    /// Low-pass filtered rim speed (m/s)
    pub filtered_speed: f32,
}

/// Speed estimator for one wheel
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    counts_per_rev: f32,
    wheel_radius_m: f32,
    rate_hz: f32,
    /// Raw counter value that corresponds to zero ticks
    baseline: i32,
    /// Raw counter value at the previous update
    last_raw: Option<i32>,
    state: WheelSpeed,
    filter: LowPassFilter,
}

impl SpeedEstimator {
    /// `geometry` and `rate_hz` are expected to be validated by the caller
    pub fn new(geometry: &DriveGeometry, filter: LowPassCoefficients, rate_hz: u32) -> Self {
        Self {
            counts_per_rev: geometry.counts_per_rev(),
            wheel_radius_m: geometry.wheel_radius_m,
            rate_hz: rate_hz as f32,
            baseline: 0,
            last_raw: None,
            state: WheelSpeed::default(),
            filter: LowPassFilter::new(filter),
        }
    }

    /// Process the counter value read this tick
    pub fn update(&mut self, raw_position: i32) {
        // The first reading after construction or reset only establishes the baseline
        let last = self.last_raw.unwrap_or(raw_position);
        let delta = raw_position.wrapping_sub(last);
        self.last_raw = Some(raw_position);

        let rotational_freq = delta as f32 / self.counts_per_rev * self.rate_hz;
        let speed = 2.0 * PI * self.wheel_radius_m * rotational_freq;
        let filtered_speed = self.filter.update(speed);

        self.state = WheelSpeed {
            ticks: raw_position.wrapping_sub(self.baseline),
            rotational_freq,
            rpm: rotational_freq * 60.0,
            speed,
            filtered_speed,
        };
    }

    /// Read the encoder and update
    pub fn update_from<E: Encoder>(&mut self, encoder: &mut E) {
        let raw = encoder.read_raw_position();
        self.update(raw);
    }

    /// Zero the tick count at `raw_position` and clear every derived value and the filter
    pub fn reset(&mut self, raw_position: i32) {
        self.baseline = raw_position;
        self.last_raw = Some(raw_position);
        self.state = WheelSpeed::default();
        self.filter.reset();
    }

    /// Reset at the encoder's current position
    pub fn reset_from<E: Encoder>(&mut self, encoder: &mut E) {
        let raw = encoder.read_raw_position();
        self.reset(raw);
    }

    /// Ticks since the last reset
    pub fn tick_count(&self) -> i32 {
        self.state.ticks
    }

    /// Wheel revolutions per second
    pub fn rotational_freq(&self) -> f32 {
        self.state.rotational_freq
    }

    /// Wheel revolutions per minute
    pub fn rpm(&self) -> f32 {
        self.state.rpm
    }

    /// Unfiltered ground speed (m/s)
    pub fn speed(&self) -> f32 {
        self.state.speed
    }

    /// Low-pass filtered ground speed (m/s), the motor loops run on this
    pub fn filtered_speed(&self) -> f32 {
        self.state.filtered_speed
    }

    /// All estimates of the latest update
    pub fn snapshot(&self) -> WheelSpeed {
        self.state
    }

    /// Coefficients of the speed filter
    pub fn filter_coefficients(&self) -> LowPassCoefficients {
        self.filter.coefficients()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::config::{CONTROL_RATE_HZ, SPEED_FILTER};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    struct Counter(i32);

    impl Encoder for Counter {
        fn read_raw_position(&mut self) -> i32 {
            self.0
        }
    }

    fn estimator() -> SpeedEstimator {
        SpeedEstimator::new(&DriveGeometry::default(), SPEED_FILTER, CONTROL_RATE_HZ)
    }

    #[test]
    fn constant_rate_converges_to_filter_fixed_point() {
        let mut wheel = estimator();
        let mut counter = Counter(0);
        wheel.update_from(&mut counter);
        for _ in 0..500 {
            counter.0 += 10;
            wheel.update_from(&mut counter);
        }

        // 10 ticks per 10 ms tick with 1024 counts per revolution
        let freq = 10.0 / 1024.0 * 100.0;
        let speed = 2.0 * PI * 0.0415 * freq;
        assert_relative_eq!(wheel.rotational_freq(), freq, max_relative = 1e-5);
        assert_relative_eq!(wheel.rpm(), freq * 60.0, max_relative = 1e-5);
        assert_relative_eq!(wheel.speed(), speed, max_relative = 1e-5);
        assert_relative_eq!(
            wheel.filtered_speed(),
            speed * SPEED_FILTER.dc_gain(),
            max_relative = 1e-4
        );
        assert_eq!(wheel.tick_count(), 5000);
    }

    #[test]
    fn delta_survives_counter_wrap() {
        let mut wheel = estimator();
        wheel.update(i32::MAX - 4);
        wheel.update(i32::MIN + 5);
        // 10 counts forward across the wrap
        assert_relative_eq!(wheel.rotational_freq(), 10.0 / 1024.0 * 100.0, max_relative = 1e-5);
    }

    #[test]
    fn reverse_rotation_is_negative() {
        let mut wheel = estimator();
        wheel.update(0);
        wheel.update(-20);
        assert!(wheel.speed() < 0.0);
        assert!(wheel.filtered_speed() < 0.0);
        assert_eq!(wheel.tick_count(), -20);
    }

    #[test]
    fn reset_rebaselines_ticks_and_keeps_coefficients() {
        let mut wheel = estimator();
        let mut counter = Counter(0);
        for _ in 0..20 {
            counter.0 += 7;
            wheel.update_from(&mut counter);
        }
        wheel.reset_from(&mut counter);
        assert_eq!(wheel.snapshot(), WheelSpeed::default());
        assert_eq!(wheel.filter_coefficients(), SPEED_FILTER);

        // Standing still after the reset must not produce a phantom speed
        wheel.update_from(&mut counter);
        assert_eq!(wheel.tick_count(), 0);
        assert_abs_diff_eq!(wheel.filtered_speed(), 0.0);

        counter.0 += 3;
        wheel.update_from(&mut counter);
        assert_eq!(wheel.tick_count(), 3);
    }
}
