//! Scripted maneuvers layered on the motion controller
//!
//! A maneuver is a fixed list of legs. Each leg is gated on odometry and, once complete, the
//! next leg's set-points are handed back to the caller as a [`SequencerAction`]. The sequencer
//! never touches the controller itself.
//!
//! # Square path
//! One clockwise square, a turnaround and one counter-clockwise square:
//!
//! ```text
//! D R90 D R90 D R90 D R180 D L90 D L90 D L90 D stop
//! ```
//!
//! Targets accumulate: the n-th drive leg ends at `n * leg_distance` metres of total travel and
//! turns end when the heading crosses the running heading target.
//!
//! # PID test
//! Holds the test heading at zero forward velocity until the buggy has travelled the test
//! distance.

use crate::control::odometry::Odometry;
use crate::system::config::ManeuverConfig;

/// Scripted maneuver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Maneuver {
    Square,
    PidTest,
}

/// Set-points requested by the sequencer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerAction {
    /// Hold `heading_deg` while driving at `velocity`
    Track { velocity: f32, heading_deg: f32 },
    /// Maneuver complete, stop the buggy
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Leg {
    /// Drive straight for one leg distance
    Drive,
    /// Turn on the spot, positive = clockwise
    Turn(f32),
    /// Hold the PID test heading until the test distance is reached
    Hold,
    Stop,
}

const SQUARE: [Leg; 16] = [
    Leg::Drive,
    Leg::Turn(90.0),
    Leg::Drive,
    Leg::Turn(90.0),
    Leg::Drive,
    Leg::Turn(90.0),
    Leg::Drive,
    Leg::Turn(180.0),
    Leg::Drive,
    Leg::Turn(-90.0),
    Leg::Drive,
    Leg::Turn(-90.0),
    Leg::Drive,
    Leg::Turn(-90.0),
    Leg::Drive,
    Leg::Stop,
];

const PID_TEST: [Leg; 2] = [Leg::Hold, Leg::Stop];

#[derive(Debug, Clone)]
pub struct Sequencer {
    config: ManeuverConfig,
    maneuver: Option<Maneuver>,
    leg: usize,
    target_distance_m: f32,
    target_heading_deg: f32,
}

impl Sequencer {
    /// Idle sequencer
    pub fn new(config: ManeuverConfig) -> Self {
        Self {
            config,
            maneuver: None,
            leg: 0,
            target_distance_m: 0.0,
            target_heading_deg: 0.0,
        }
    }

    /// Begin `maneuver` from a freshly reset odometry baseline
    pub fn start(&mut self, maneuver: Maneuver) -> SequencerAction {
        info!("starting {:?}", maneuver);
        self.maneuver = Some(maneuver);
        self.leg = 0;
        self.target_distance_m = 0.0;
        self.target_heading_deg = 0.0;
        self.enter_leg()
    }

    /// Drop the running maneuver without emitting an action
    pub fn cancel(&mut self) {
        if let Some(maneuver) = self.maneuver.take() {
            debug!("{:?} cancelled at leg {}", maneuver, self.leg);
        }
    }

    /// Advance on the latest odometry, returns the new set-points when a leg completes
    pub fn step(&mut self, odometry: &Odometry) -> Option<SequencerAction> {
        let legs = legs(self.maneuver?);
        let done = match legs[self.leg] {
            Leg::Drive | Leg::Hold => odometry.distance_m >= self.target_distance_m,
            Leg::Turn(degrees) if degrees >= 0.0 => odometry.heading_deg >= self.target_heading_deg,
            Leg::Turn(_) => odometry.heading_deg <= self.target_heading_deg,
            Leg::Stop => true,
        };
        if !done {
            return None;
        }

        self.leg += 1;
        debug!(
            "leg {} at {} m, {} deg",
            self.leg, odometry.distance_m, odometry.heading_deg
        );
        Some(self.enter_leg())
    }

    fn enter_leg(&mut self) -> SequencerAction {
        let Some(maneuver) = self.maneuver else {
            return SequencerAction::Finish;
        };
        let leg = legs(maneuver).get(self.leg).copied().unwrap_or(Leg::Stop);
        match leg {
            Leg::Drive => {
                self.target_distance_m += self.config.square_leg_distance_m;
                SequencerAction::Track {
                    velocity: self.config.square_velocity,
                    heading_deg: self.target_heading_deg,
                }
            }
            Leg::Turn(degrees) => {
                self.target_heading_deg += degrees;
                SequencerAction::Track {
                    velocity: 0.0,
                    heading_deg: self.target_heading_deg,
                }
            }
            Leg::Hold => {
                self.target_distance_m = self.config.pid_test_distance_m;
                self.target_heading_deg = self.config.pid_test_heading_deg;
                SequencerAction::Track {
                    velocity: 0.0,
                    heading_deg: self.target_heading_deg,
                }
            }
            Leg::Stop => {
                info!("{:?} complete", maneuver);
                self.maneuver = None;
                SequencerAction::Finish
            }
        }
    }

    /// Maneuver in progress, if any
    pub fn maneuver(&self) -> Option<Maneuver> {
        self.maneuver
    }

    /// Whether a maneuver is in progress
    pub fn is_running(&self) -> bool {
        self.maneuver.is_some()
    }

    /// Index of the leg being executed
    pub fn leg(&self) -> usize {
        self.leg
    }

    /// Total travel at which the current distance-gated leg ends (m)
    pub fn target_distance_m(&self) -> f32 {
        self.target_distance_m
    }

    /// Heading the current leg steers to (deg)
    pub fn target_heading_deg(&self) -> f32 {
        self.target_heading_deg
    }
}

fn legs(maneuver: Maneuver) -> &'static [Leg] {
    match maneuver {
        Maneuver::Square => &SQUARE,
        Maneuver::PidTest => &PID_TEST,
    }
}
