//! RP2350B board support: pin assignment and the hardware trait implementations
pub mod encoder;
pub mod line_sensor;
pub mod motor;
pub mod resources;
