//! Hardware abstraction consumed by the control core
//!
//! The estimators and the motion controller only ever see these traits. The firmware implements
//! them on top of the RP2350 peripherals; tests implement them with plain structs.

/// Wheel side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Motor {
    Left,
    Right,
}

/// Cumulative wheel position counter
pub trait Encoder {
    /// Absolute count since power-up, wraps at `i32` overflow
    fn read_raw_position(&mut self) -> i32;
}

/// Six-channel IR reflectance array
pub trait LineSensorArray {
    /// Single read of `channel` (0 = leftmost), normalised to roughly [0, 1]
    fn read_raw_channel(&mut self, channel: usize) -> f32;

    /// Switch the IR emitters
    fn set_emitters(&mut self, _on: bool) {}
}

/// Dual H-bridge
pub trait MotorDrive {
    /// Signed duty in [-1, 1], sign selects direction
    fn write_duty(&mut self, motor: Motor, duty: f32);

    /// Driver enable (standby released when `true`)
    fn set_enabled(&mut self, enabled: bool);
}

impl<T: Encoder + ?Sized> Encoder for &mut T {
    fn read_raw_position(&mut self) -> i32 {
        (**self).read_raw_position()
    }
}

impl<T: LineSensorArray + ?Sized> LineSensorArray for &mut T {
    fn read_raw_channel(&mut self, channel: usize) -> f32 {
        (**self).read_raw_channel(channel)
    }

    fn set_emitters(&mut self, on: bool) {
        (**self).set_emitters(on)
    }
}
