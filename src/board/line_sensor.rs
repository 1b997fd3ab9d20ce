//! IR line sensor on the ADC
//!
//! Blocking single conversions, scaled from the 12-bit result to [0, 1]. The emitters are plain
//! GPIO outputs driven together.

use buggy_control::system::config::LINE_CHANNELS;
use buggy_control::system::hal::LineSensorArray;
use defmt::warn;
use embassy_rp::adc::{Adc, Blocking, Channel, Config};
use embassy_rp::gpio::{Level, Output, Pull};

use super::resources::LineSensorResources;

/// Largest 12-bit conversion result
const ADC_FULL_SCALE: f32 = 4095.0;

/// Six IR phototransistors on the ADC with their emitters
pub struct IrArray {
    adc: Adc<'static, Blocking>,
    channels: [Channel<'static>; LINE_CHANNELS],
    emitters: [Output<'static>; LINE_CHANNELS],
}

impl IrArray {
    /// Emitters start off, the buggy switches them on at start-up
    pub fn new(r: LineSensorResources) -> Self {
        Self {
            adc: Adc::new_blocking(r.adc, Config::default()),
            channels: [
                Channel::new_pin(r.sense_0, Pull::None),
                Channel::new_pin(r.sense_1, Pull::None),
                Channel::new_pin(r.sense_2, Pull::None),
                Channel::new_pin(r.sense_3, Pull::None),
                Channel::new_pin(r.sense_4, Pull::None),
                Channel::new_pin(r.sense_5, Pull::None),
            ],
            emitters: [
                Output::new(r.emitter_0, Level::Low),
                Output::new(r.emitter_1, Level::Low),
                Output::new(r.emitter_2, Level::Low),
                Output::new(r.emitter_3, Level::Low),
                Output::new(r.emitter_4, Level::Low),
                Output::new(r.emitter_5, Level::Low),
            ],
        }
    }
}

impl LineSensorArray for IrArray {
    fn read_raw_channel(&mut self, channel: usize) -> f32 {
        let Some(input) = self.channels.get_mut(channel) else {
            return 0.0;
        };
        match self.adc.blocking_read(input) {
            Ok(raw) => f32::from(raw) / ADC_FULL_SCALE,
            Err(_) => {
                warn!("adc read failed on channel {}", channel);
                0.0
            }
        }
    }

    fn set_emitters(&mut self, on: bool) {
        let level = if on { Level::High } else { Level::Low };
        for emitter in self.emitters.iter_mut() {
            emitter.set_level(level);
        }
    }
}
