//! Core library for the luxmeter_daq application.
//!
//! This library contains the serial transports, protocol codecs and
//! instrument sessions for the Konica Minolta CL-200A chroma meter and the
//! UNI-T UT382 luxmeter, plus the RGB light controller used as a stimulus.
//! Both meters produce [`core::MeasurementSample`]s through the
//! [`instrument::MeasurementSource`] capability.

pub mod actuator;
pub mod adapters;
pub mod config;
pub mod core;
pub mod error;
pub mod error_recovery;
pub mod instrument;
