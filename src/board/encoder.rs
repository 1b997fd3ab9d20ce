//! Wheel encoders on PWM input slices
//!
//! Each slice counts rising edges of one encoder channel in its 16-bit counter. The control tick
//! reads far faster than the counter can wrap, so the wrapping difference between two reads is
//! the number of new edges. The edges are signed with the direction the motor driver last
//! commanded and accumulated into a 32-bit position.
//!
//! That is one count per encoder pulse, so the firmware runs with
//! [`SINGLE_EDGE_COUNTS_PER_PULSE`](buggy_control::system::config::SINGLE_EDGE_COUNTS_PER_PULSE)
//! instead of the x4 quadrature default.

use core::sync::atomic::{AtomicI8, Ordering};

use buggy_control::system::hal::Encoder;
use embassy_rp::gpio::Pull;
use embassy_rp::pwm::{Config, InputMode, Pwm};

use super::motor::{LEFT_DIRECTION, RIGHT_DIRECTION};
use super::resources::EncoderResources;

/// Signed edge count of one wheel
pub struct WheelEncoder {
    counter: Pwm<'static>,
    last_count: u16,
    position: i32,
    direction: &'static AtomicI8,
}

impl WheelEncoder {
    /// Left and right wheel encoders
    pub fn pair(r: EncoderResources) -> (Self, Self) {
        let left = Pwm::new_input(
            r.left_slice,
            r.left_pin,
            Pull::None,
            InputMode::RisingEdge,
            Config::default(),
        );
        let right = Pwm::new_input(
            r.right_slice,
            r.right_pin,
            Pull::None,
            InputMode::RisingEdge,
            Config::default(),
        );
        (Self::new(left, &LEFT_DIRECTION), Self::new(right, &RIGHT_DIRECTION))
    }

    fn new(counter: Pwm<'static>, direction: &'static AtomicI8) -> Self {
        Self {
            last_count: counter.counter(),
            counter,
            position: 0,
            direction,
        }
    }
}

impl Encoder for WheelEncoder {
    fn read_raw_position(&mut self) -> i32 {
        let count = self.counter.counter();
        let edges = count.wrapping_sub(self.last_count);
        self.last_count = count;

        let direction = i32::from(self.direction.load(Ordering::Relaxed));
        self.position = self.position.wrapping_add(direction * i32::from(edges));
        self.position
    }
}
