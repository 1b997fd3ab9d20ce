//! Line position from the six-channel IR array
//!
//! # Operation
//! Each update oversamples every channel, normalises it against the per-channel calibration and
//! reduces the six values to one signed offset:
//!
//! ```text
//! value[i] = clamp((mean(raw[i]) - min[i]) / (max[i] - min[i]), 0, 1)
//! offset   = angle_coefficient * Σ weight[i] * value[i]
//! ```
//!
//! Channel 0 is the leftmost sensor, so with the default weights a line under the left half gives
//! a positive offset. Line detection is channel-local: the line is seen when any single channel
//! exceeds the detection threshold, independent of the offset.
//!
//! # Calibration
//! A calibration pass averages a longer burst over the background surface and stores it as the
//! floor of every channel. Ceilings stay at their configured values.

use crate::control::filter::LowPassFilter;
use crate::system::config::{ChannelCalibration, LineSensorConfig, LINE_CHANNELS};
use crate::system::error::CalibrationError;
use crate::system::hal::LineSensorArray;

/// Line sensor state after the latest update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineReading {
    /// Normalised channel values, leftmost first
    pub channels: [f32; LINE_CHANNELS],
    pub offset: f32,
    pub filtered_offset: f32,
    pub detected: bool,
}

#[derive(Debug, Clone)]
pub struct LineSensorEstimator {
    config: LineSensorConfig,
    calibration: ChannelCalibration,
    calibrated: bool,
    reading: LineReading,
    filter: LowPassFilter,
}

impl LineSensorEstimator {
    /// `config` is expected to be validated by the caller
    pub fn new(config: LineSensorConfig) -> Self {
        Self {
            calibration: config.calibration,
            calibrated: config.calibrated,
            reading: LineReading::default(),
            filter: LowPassFilter::new(config.filter),
            config,
        }
    }

    /// Sample the array once and refresh the offset and detection flag
    pub fn update<S: LineSensorArray>(&mut self, sensor: &mut S) {
        let mut channels = [0.0; LINE_CHANNELS];
        for (channel, value) in channels.iter_mut().enumerate() {
            let mean = average(sensor, channel, self.config.sample_count);
            *value = self.normalise(channel, mean);
        }

        let threshold = self.config.detection_threshold;
        let detected = channels.iter().any(|value| *value > threshold);

        // Weights are antisymmetric, so pair mirrored channels; equal readings cancel exactly
        let weighted: f32 = (0..LINE_CHANNELS / 2)
            .map(|i| {
                let mirror = LINE_CHANNELS - 1 - i;
                f32::from(self.config.weights[i]) * (channels[i] - channels[mirror])
            })
            .sum();
        let offset = weighted * self.config.angle_coefficient;

        self.reading = LineReading {
            channels,
            offset,
            filtered_offset: self.filter.update(offset),
            detected,
        };
    }

    /// Measure the background floor of every channel and enable calibration
    ///
    /// On error the previous calibration is kept.
    pub fn calibrate_sensors<S: LineSensorArray>(
        &mut self,
        sensor: &mut S,
    ) -> Result<(), CalibrationError> {
        let mut floor = [0.0; LINE_CHANNELS];
        for (channel, min) in floor.iter_mut().enumerate() {
            *min = average(sensor, channel, self.config.calibration_samples);
        }

        for (channel, min) in floor.iter().enumerate() {
            if !(min.is_finite() && *min < self.calibration.max[channel]) {
                warn!("calibration rejected on channel {}: floor {}", channel, *min);
                return Err(CalibrationError::DegenerateSpan { channel });
            }
        }

        self.calibration.min = floor;
        self.calibrated = true;
        info!("line sensor calibrated, floors {:?}", floor);
        Ok(())
    }

    /// Clear the offset filter, calibration is kept
    pub fn reset(&mut self) {
        self.filter.reset();
        self.reading.filtered_offset = 0.0;
    }

    /// Whether any channel saw the line in the latest update
    pub fn is_line_detected(&self) -> bool {
        self.reading.detected
    }

    /// Unfiltered line offset, positive = line to the left
    pub fn offset(&self) -> f32 {
        self.reading.offset
    }

    /// Low-pass filtered line offset, input of the line loop
    pub fn filtered_offset(&self) -> f32 {
        self.reading.filtered_offset
    }

    /// Everything measured in the latest update
    pub fn reading(&self) -> LineReading {
        self.reading
    }

    /// Active calibration, `None` until a pass succeeded
    pub fn calibration(&self) -> Option<ChannelCalibration> {
        self.calibrated.then_some(self.calibration)
    }

    fn normalise(&self, channel: usize, raw: f32) -> f32 {
        let value = if self.calibrated {
            let (min, max) = (self.calibration.min[channel], self.calibration.max[channel]);
            (raw - min) / (max - min)
        } else {
            raw
        };
        value.clamp(0.0, 1.0)
    }
}

fn average<S: LineSensorArray>(sensor: &mut S, channel: usize, samples: u32) -> f32 {
    let sum: f32 = (0..samples).map(|_| sensor.read_raw_channel(channel)).sum();
    sum / samples as f32
}
