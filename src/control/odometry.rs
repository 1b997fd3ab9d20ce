//! Heading and travelled distance from absolute wheel tick counts
//!
//! Both values are recomputed from the cumulative counts on every update instead of being
//! integrated, so they cannot drift from rounding. The price is that they can only be zeroed by
//! re-baselining both wheel counters, which is why the heading tracker is always reset together
//! with the speed estimators.
//!
//! ```text
//! heading  = 360 * R / (2 * S) * (left - right) / (cpp * N)      degrees, clockwise positive
//! distance = (left + right) / (2 * cpp * N) * 2π * R             metres
//! ```

use core::f32::consts::PI;

use crate::system::config::DriveGeometry;

/// Odometry after the latest update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Odometry {
    pub heading_deg: f32,
    pub distance_m: f32,
}

#[derive(Debug, Clone)]
pub struct HeadingTracker {
    /// Degrees per tick of wheel difference
    heading_per_tick: f32,
    /// Metres per tick of wheel sum
    distance_per_tick: f32,
    odometry: Odometry,
}

impl HeadingTracker {
    /// Tracker at zero heading and distance
    pub fn new(geometry: &DriveGeometry) -> Self {
        let counts_per_rev = geometry.counts_per_rev();
        Self {
            heading_per_tick: 360.0 * geometry.wheel_radius_m
                / (2.0 * geometry.wheel_separation_m)
                / counts_per_rev,
            distance_per_tick: 2.0 * PI * geometry.wheel_radius_m / (2.0 * counts_per_rev),
            odometry: Odometry::default(),
        }
    }

    /// Recompute from the wheels' tick counts since their last reset
    pub fn update(&mut self, left_ticks: i32, right_ticks: i32) {
        // Widen before combining so opposite extremes cannot overflow
        let difference = (i64::from(left_ticks) - i64::from(right_ticks)) as f32;
        let sum = (i64::from(left_ticks) + i64::from(right_ticks)) as f32;
        self.odometry = Odometry {
            heading_deg: self.heading_per_tick * difference,
            distance_m: self.distance_per_tick * sum,
        };
    }

    /// Zero heading and distance; the wheel counters must be re-baselined with it
    pub fn reset(&mut self) {
        self.odometry = Odometry::default();
    }

    /// Clockwise heading since the last reset (deg)
    pub fn heading_deg(&self) -> f32 {
        self.odometry.heading_deg
    }

    /// Mean travel of both wheels since the last reset (m)
    pub fn distance_m(&self) -> f32 {
        self.odometry.distance_m
    }

    pub fn odometry(&self) -> Odometry {
        self.odometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::config::SINGLE_EDGE_COUNTS_PER_PULSE;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn tracker() -> HeadingTracker {
        HeadingTracker::new(&DriveGeometry::default())
    }

    #[test]
    fn equal_counts_have_no_heading() {
        let mut odometry = tracker();
        for ticks in [0, 1, 17, -300, 1024, i32::MAX, i32::MIN] {
            odometry.update(ticks, ticks);
            assert_eq!(odometry.heading_deg(), 0.0);
        }
    }

    #[test]
    fn opposite_counts_have_no_distance() {
        let mut odometry = tracker();
        for ticks in [1, 250, -4096, i32::MAX] {
            odometry.update(ticks, -ticks);
            assert_eq!(odometry.distance_m(), 0.0);
            assert!(odometry.heading_deg() != 0.0);
        }
    }

    #[test]
    fn one_wheel_revolution_heading() {
        let mut odometry = tracker();
        odometry.update(1024, 0);
        let expected = 360.0 * 0.0415 / (2.0 * 0.188) * 1024.0 / (4.0 * 256.0);
        assert_abs_diff_eq!(odometry.heading_deg(), expected, epsilon = 1e-3);
        assert_abs_diff_eq!(odometry.heading_deg(), 39.734, epsilon = 1e-3);
    }

    #[test]
    fn straight_travel_distance() {
        let mut odometry = tracker();
        // One revolution on each wheel
        odometry.update(1024, 1024);
        assert_relative_eq!(odometry.distance_m(), 2.0 * PI * 0.0415, max_relative = 1e-5);
    }

    #[test]
    fn single_edge_counting_scales_one_count_per_pulse() {
        let geometry = DriveGeometry {
            counts_per_pulse: SINGLE_EDGE_COUNTS_PER_PULSE,
            ..DriveGeometry::default()
        };
        let mut odometry = HeadingTracker::new(&geometry);
        // One revolution is one count per pulse
        odometry.update(256, 256);
        assert_relative_eq!(odometry.distance_m(), 2.0 * PI * 0.0415, max_relative = 1e-5);
        odometry.update(256, 0);
        assert_abs_diff_eq!(odometry.heading_deg(), 39.734, epsilon = 1e-3);
    }

    #[test]
    fn right_turn_is_positive() {
        let mut odometry = tracker();
        odometry.update(400, -400);
        assert!(odometry.heading_deg() > 0.0);
        odometry.update(-400, 400);
        assert!(odometry.heading_deg() < 0.0);
    }

    #[test]
    fn reset_zeroes_both() {
        let mut odometry = tracker();
        odometry.update(512, 100);
        odometry.reset();
        assert_eq!(odometry.odometry(), Odometry::default());
    }
}
