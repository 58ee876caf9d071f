use crate::core::{Cct, MeasurementSample};
use crate::error::AppResult;

/// Capability for instruments that report illuminance.
///
/// `Ok(None)` means the instrument had no reading yet; callers may ask again.
pub trait LuxMeter {
    fn get_lux(&mut self) -> AppResult<Option<f64>>;
}

/// Capability for instruments that also report tristimulus values.
pub trait ChromaMeter: LuxMeter {
    /// X, Y, Z tristimulus values.
    fn get_xyz(&mut self) -> AppResult<Option<(f64, f64, f64)>>;

    /// Illuminance, correlated color temperature and Δuv.
    fn get_delta_uv(&mut self) -> AppResult<Option<(f64, f64, f64)>>;

    /// CCT for each named method; `Ok(None)` for an unknown method name.
    fn get_cct(&mut self, methods: &[&str]) -> AppResult<Option<Cct>>;
}

/// Uniform sample producer consumed by the test harness.
pub trait MeasurementSource {
    fn id(&self) -> &str;

    /// Acquires one normalized sample.
    fn sample(&mut self) -> AppResult<Option<MeasurementSample>>;
}
