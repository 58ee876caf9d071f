//! Core data types shared by both luxmeter adapters.
//!
//! Every acquisition produces a [`MeasurementSample`]. The streaming UT382 adapter
//! additionally yields lightweight [`LuxSample`]s at its native 8 Hz rate; those
//! convert into a `MeasurementSample` when the harness wants a uniform record.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Illuminance unit shown by the instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LuxUnit {
    Lux,
    Footcandle,
}

impl LuxUnit {
    /// Short label used in TSV output.
    pub fn label(&self) -> &'static str {
        match self {
            LuxUnit::Lux => "lux",
            LuxUnit::Footcandle => "fc",
        }
    }
}

impl fmt::Display for LuxUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Correlated color temperature for one or several methods, in Kelvin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cct {
    Single(f64),
    PerMethod(Vec<f64>),
}

impl Cct {
    /// Collapses a list of results the way callers expect: one method, one value.
    pub fn from_values(mut values: Vec<f64>) -> Self {
        if values.len() == 1 {
            Cct::Single(values.remove(0))
        } else {
            Cct::PerMethod(values)
        }
    }

    pub fn values(&self) -> Vec<f64> {
        match self {
            Cct::Single(v) => vec![*v],
            Cct::PerMethod(vs) => vs.clone(),
        }
    }
}

/// One normalized photometric sample.
///
/// Produced by exactly one adapter per acquisition call and owned by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSample {
    pub timestamp: DateTime<Utc>,
    pub instrument_id: String,
    pub lux: Option<f64>,
    pub unit: LuxUnit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cct: Option<Cct>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xyz: Option<(f64, f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_uv: Option<f64>,
}

impl MeasurementSample {
    /// A sample carrying only illuminance.
    pub fn illuminance(instrument_id: &str, lux: Option<f64>, unit: LuxUnit) -> Self {
        Self {
            timestamp: Utc::now(),
            instrument_id: instrument_id.to_string(),
            lux,
            unit,
            cct: None,
            xyz: None,
            tcp: None,
            delta_uv: None,
        }
    }
}

/// One reading from the streaming luxmeter.
#[derive(Clone, Debug, PartialEq)]
pub struct LuxSample {
    pub time: DateTime<Local>,
    /// `None` when the display shows the over-range sentinel or no digits.
    pub lux: Option<f64>,
    /// True when a decimal point was lit (or the value is an average).
    pub fractional: bool,
    pub unit: LuxUnit,
}

impl LuxSample {
    /// Value as it is printed: `%i` for integer readings, `%.2f` otherwise.
    pub fn formatted(&self) -> Option<String> {
        self.lux.map(|v| format_lux(v, self.fractional))
    }

    pub fn to_measurement(&self, instrument_id: &str) -> MeasurementSample {
        MeasurementSample {
            timestamp: self.time.with_timezone(&Utc),
            ..MeasurementSample::illuminance(instrument_id, self.lux, self.unit)
        }
    }
}

pub fn format_lux(value: f64, fractional: bool) -> String {
    if fractional {
        format!("{:.2}", value)
    } else {
        format!("{}", value.trunc() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(lux: Option<f64>, fractional: bool) -> LuxSample {
        LuxSample {
            time: Local::now(),
            lux,
            fractional,
            unit: LuxUnit::Lux,
        }
    }

    #[test]
    fn test_formatting_follows_precision() {
        assert_eq!(sample(Some(10.0), true).formatted().as_deref(), Some("10.00"));
        assert_eq!(sample(Some(1234.0), false).formatted().as_deref(), Some("1234"));
        assert_eq!(sample(Some(3.14159), true).formatted().as_deref(), Some("3.14"));
        assert_eq!(sample(None, false).formatted(), None);
    }

    #[test]
    fn test_cct_collapse() {
        assert_eq!(Cct::from_values(vec![6500.0]), Cct::Single(6500.0));
        assert_eq!(
            Cct::from_values(vec![6500.0, 6480.0]),
            Cct::PerMethod(vec![6500.0, 6480.0])
        );
    }

    #[test]
    fn test_lux_sample_to_measurement() {
        let s = sample(Some(250.0), false).to_measurement("ut382");
        assert_eq!(s.instrument_id, "ut382");
        assert_eq!(s.lux, Some(250.0));
        assert!(s.xyz.is_none());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["unit"], "lux");
        assert!(json.get("cct").is_none());
    }
}
