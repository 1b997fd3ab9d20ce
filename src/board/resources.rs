//! Hardware Resource Management
//!
//! Assigns pins and peripherals to the board drivers. Every group is owned by exactly one driver,
//! so no peripheral is shared between tasks.
//!
//! # Resource Groups
//! - Motor Driver: TB6612FNG direction pins, standby and one PWM slice for both motors
//! - Encoders: one PWM slice per wheel counting rising edges on its B pin
//! - Line Sensor: six ADC pins (GPIO40..45, RP2350B only) and six IR emitter pins
//! - Link: UART0 with two DMA channels

use assign_resources::assign_resources;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::{self, UART0};
use embassy_rp::uart::InterruptHandler as UartInterruptHandler;

assign_resources! {
    /// TB6612FNG dual motor driver pins and PWM channels
    motor_driver: MotorDriverResources {
        standby_pin: PIN_14,
        pwm_slice: PWM_SLICE4,
        left_pwm_pin: PIN_8,
        right_pwm_pin: PIN_9,
        left_forward_pin: PIN_10,
        left_backward_pin: PIN_11,
        right_forward_pin: PIN_12,
        right_backward_pin: PIN_13,
    },
    /// Wheel encoder PWM input channels
    encoders: EncoderResources {
        left_slice: PWM_SLICE2,
        left_pin: PIN_5,
        right_slice: PWM_SLICE3,
        right_pin: PIN_7,
    },
    /// Six-channel IR line sensor, channel 0 is the leftmost
    line_sensor: LineSensorResources {
        adc: ADC,
        sense_0: PIN_40,
        sense_1: PIN_41,
        sense_2: PIN_42,
        sense_3: PIN_43,
        sense_4: PIN_44,
        sense_5: PIN_45,
        emitter_0: PIN_18,
        emitter_1: PIN_19,
        emitter_2: PIN_20,
        emitter_3: PIN_21,
        emitter_4: PIN_22,
        emitter_5: PIN_23,
    },
    /// Serial command link (Bluetooth module)
    link: LinkResources {
        uart: UART0,
        tx_pin: PIN_0,
        rx_pin: PIN_1,
        tx_dma: DMA_CH0,
        rx_dma: DMA_CH1,
    },
}

bind_interrupts!(pub struct Irqs {
    UART0_IRQ => UartInterruptHandler<UART0>;
});
