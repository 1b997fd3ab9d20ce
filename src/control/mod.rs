//! Estimation and control pipeline
pub mod filter;
pub mod line_sensor;
pub mod motion;
pub mod odometry;
pub mod pid;
pub mod sequencer;
pub mod speed;
