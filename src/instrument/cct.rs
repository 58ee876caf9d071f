//! Correlated color temperature from tristimulus values.
//!
//! `me_mccamy` is evaluated in place with a closed-form polynomial. Every
//! other method name goes through a [`ChromaticityToCct`] routine.

use crate::core::Cct;
use log::{debug, error};

/// Name of the built-in polynomial method.
pub const FAST_METHOD: &str = "me_mccamy";

/// External chromaticity → CCT routine.
pub trait ChromaticityToCct: Send {
    /// Method names this routine understands.
    fn methods(&self) -> Vec<&'static str>;

    /// CCT in Kelvin for CIE 1931 `(x, y)`, `None` for an unknown method.
    fn xy_to_cct(&self, xy: (f64, f64), method: &str) -> Option<f64>;
}

/// Published closed-form approximations.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCct;

impl ChromaticityToCct for StandardCct {
    fn methods(&self) -> Vec<&'static str> {
        vec!["Hernandez 1999", "McCamy 1992"]
    }

    fn xy_to_cct(&self, xy: (f64, f64), method: &str) -> Option<f64> {
        match method {
            "Hernandez 1999" => Some(hernandez_1999(xy)),
            "McCamy 1992" => Some(mccamy_1992(xy)),
            _ => None,
        }
    }
}

/// CIE XYZ → xy.
pub fn xyz_to_xy(x: f64, y: f64, z: f64) -> (f64, f64) {
    let sum = x + y + z;
    (x / sum, y / sum)
}

/// Polynomial over normalized chromaticity. Undefined when any input is zero.
pub fn fast_cct(x: f64, y: f64, z: f64) -> f64 {
    let (small_x, small_y) = xyz_to_xy(x, y, z);
    let n = (small_x - 0.3320) / (0.1858 - small_y);
    437.0 * n.powi(3) + 3601.0 * n.powi(2) + 6861.0 * n + 5517.0
}

/// Hernández-Andrés, Lee & Romero (1999), with the high-temperature range above 50 000 K.
pub fn hernandez_1999((x, y): (f64, f64)) -> f64 {
    let n = (x - 0.3366) / (y - 0.1735);
    let cct = -949.86315
        + 6253.80338 * (-n / 0.92159).exp()
        + 28.70599 * (-n / 0.20039).exp()
        + 0.00004 * (-n / 0.07125).exp();
    if cct <= 50_000.0 {
        return cct;
    }
    let n = (x - 0.3356) / (y - 0.1691);
    36284.48953 + 0.00228 * (-n / 0.07861).exp() + 5.4535e-36 * (-n / 0.01543).exp()
}

/// McCamy (1992).
pub fn mccamy_1992((x, y): (f64, f64)) -> f64 {
    let n = (x - 0.3320) / (y - 0.1858);
    -449.0 * n.powi(3) + 3525.0 * n.powi(2) - 6823.3 * n + 5520.33
}

/// Every method name accepted by [`cct_for_methods`].
pub fn valid_methods(converter: &dyn ChromaticityToCct) -> Vec<&'static str> {
    let mut names = vec![FAST_METHOD];
    names.extend(converter.methods());
    names
}

/// CCT for each requested method, truncated to whole Kelvin.
///
/// Returns `Some(Cct::Single(0.0))` when any tristimulus value is zero and
/// `None` (after logging the valid names) when a method is unknown.
pub fn cct_for_methods(
    instrument_id: &str,
    (x, y, z): (f64, f64, f64),
    methods: &[&str],
    converter: &dyn ChromaticityToCct,
) -> Option<Cct> {
    if x == 0.0 || y == 0.0 || z == 0.0 {
        return Some(Cct::Single(0.0));
    }
    debug!("[{}] x = {}, y = {}, z = {}", instrument_id, x, y, z);

    let mut values = Vec::with_capacity(methods.len());
    for &method in methods {
        let cct = if method == FAST_METHOD {
            fast_cct(x, y, z)
        } else if let Some(cct) = converter.xy_to_cct(xyz_to_xy(x, y, z), method) {
            cct
        } else {
            error!(
                "[{}] {} Not found! CCT calculation methods: {:?}",
                instrument_id,
                method,
                valid_methods(converter)
            );
            return None;
        };
        debug!("[{}] [{}] CCT = {} K", instrument_id, method, cct);
        values.push(cct.trunc());
    }
    Some(Cct::from_values(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    // CIE D65 white point
    const D65_XYZ: (f64, f64, f64) = (95.047, 100.0, 108.883);
    const D65_XY: (f64, f64) = (0.3127, 0.3290);

    #[test]
    fn test_fast_method_near_d65() {
        let (x, y, z) = D65_XYZ;
        let cct = fast_cct(x, y, z);
        assert!((cct - 6508.0).abs() < 15.0, "got {cct}");
    }

    #[test]
    fn test_hernandez_near_d65() {
        let cct = hernandez_1999(D65_XY);
        assert!((cct - 6500.0).abs() < 30.0, "got {cct}");
    }

    #[test]
    fn test_mccamy_near_d65() {
        let cct = mccamy_1992(D65_XY);
        assert!((cct - 6505.0).abs() < 15.0, "got {cct}");
    }

    #[test]
    fn test_zero_guard() {
        let result = cct_for_methods("test", (0.0, 100.0, 108.0), &["Hernandez 1999"], &StandardCct);
        assert_eq!(result, Some(Cct::Single(0.0)));
    }

    #[test]
    fn test_multiple_methods_truncated() {
        let result = cct_for_methods("test", D65_XYZ, &[FAST_METHOD, "McCamy 1992"], &StandardCct);
        let Some(Cct::PerMethod(values)) = result else {
            panic!("expected one value per method");
        };
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.fract() == 0.0));
    }

    #[test]
    fn test_unknown_method_yields_nothing() {
        assert_eq!(cct_for_methods("test", D65_XYZ, &["Robertson 1968"], &StandardCct), None);
        assert!(valid_methods(&StandardCct).contains(&FAST_METHOD));
    }
}
