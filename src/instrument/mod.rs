//! Luxmeter drivers and the capabilities they share.

pub mod capabilities;
pub mod cct;
pub mod cl200a;
pub mod discovery;
pub mod ut382;

pub use capabilities::{ChromaMeter, LuxMeter, MeasurementSource};
pub use cl200a::Cl200aSession;
pub use ut382::Ut382;
