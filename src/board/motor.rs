//! TB6612FNG motor driver
//!
//! Maps the signed duties of the control tick onto the driver: the sign selects
//! `Forward`/`Backward`, the magnitude becomes the PWM percentage. Standby is engaged whenever the
//! tick disables the drive.
//!
//! The encoders only count edges, so the driver publishes the direction it last commanded for each
//! wheel and the encoders sign their counts with it.

use core::sync::atomic::{AtomicI8, Ordering};

use buggy_control::system::hal::{Motor, MotorDrive};
use defmt::{info, warn};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::pwm::{self, Pwm, PwmOutput};
use tb6612fng::{DriveCommand, Motor as DriverChannel, Tb6612fng};

use super::resources::MotorDriverResources;

/// PWM frequency, cheap DC motors work better at lower frequencies
const PWM_FREQUENCY_HZ: u32 = 10_000;

/// Direction last commanded to the left motor, +1 or -1
pub static LEFT_DIRECTION: AtomicI8 = AtomicI8::new(1);
/// Direction last commanded to the right motor, +1 or -1
pub static RIGHT_DIRECTION: AtomicI8 = AtomicI8::new(1);

type Driver = Tb6612fng<
    Output<'static>,
    Output<'static>,
    PwmOutput<'static>,
    Output<'static>,
    Output<'static>,
    PwmOutput<'static>,
    Output<'static>,
>;

/// Both motors behind one TB6612FNG
pub struct DriveBoard {
    driver: Driver,
    enabled: bool,
}

impl DriveBoard {
    /// Set up both motors in standby
    pub fn new(r: MotorDriverResources) -> Self {
        let clock_freq_hz = embassy_rp::clocks::clk_sys_freq();

        // Smallest divider that keeps the period within the 16-bit counter
        let divider = ((clock_freq_hz / PWM_FREQUENCY_HZ) / 65535 + 1) as u8;
        let period = (clock_freq_hz / (PWM_FREQUENCY_HZ * divider as u32)) as u16 - 1;

        let mut pwm_config = pwm::Config::default();
        pwm_config.divider = divider.into();
        pwm_config.top = period;

        let (left_pwm, right_pwm) =
            Pwm::new_output_ab(r.pwm_slice, r.left_pwm_pin, r.right_pwm_pin, pwm_config).split();

        // motor A is the left motor
        let left = DriverChannel::new(
            Output::new(r.left_forward_pin, Level::Low),
            Output::new(r.left_backward_pin, Level::Low),
            left_pwm.unwrap(),
        )
        .unwrap();
        let right = DriverChannel::new(
            Output::new(r.right_forward_pin, Level::Low),
            Output::new(r.right_backward_pin, Level::Low),
            right_pwm.unwrap(),
        )
        .unwrap();
        let standby = Output::new(r.standby_pin, Level::Low);

        info!("motor driver up, pwm divider {} top {}", divider, period);
        Self {
            driver: Tb6612fng::new(left, right, standby).unwrap(),
            enabled: false,
        }
    }
}

/// Driver command for a signed duty in [-1, 1]
fn drive_command(duty: f32) -> DriveCommand {
    let percent = (libm::fabsf(duty) * 100.0).clamp(0.0, 100.0) as u8;
    if percent == 0 {
        DriveCommand::Stop
    } else if duty > 0.0 {
        DriveCommand::Forward(percent)
    } else {
        DriveCommand::Backward(percent)
    }
}

impl MotorDrive for DriveBoard {
    fn write_duty(&mut self, motor: Motor, duty: f32) {
        let command = drive_command(duty);
        let direction = match command {
            DriveCommand::Forward(_) => Some(1),
            DriveCommand::Backward(_) => Some(-1),
            // A coasting wheel keeps turning the way it was driven
            _ => None,
        };

        let (channel, published) = match motor {
            Motor::Left => (&mut self.driver.motor_a, &LEFT_DIRECTION),
            Motor::Right => (&mut self.driver.motor_b, &RIGHT_DIRECTION),
        };
        if channel.drive(command).is_err() {
            warn!("{} motor rejected duty {}", motor, duty);
        }
        if let Some(direction) = direction {
            published.store(direction, Ordering::Relaxed);
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        let result = if enabled {
            self.driver.disable_standby()
        } else {
            self.driver.enable_standby()
        };
        match result {
            Ok(()) => self.enabled = enabled,
            Err(_) => warn!("standby pin write failed"),
        }
    }
}
