//! Stream stages layered over [`Monitor`](super::Monitor).

use crate::core::LuxSample;
use crate::error::AppResult;

/// Nominal sample rate of the meter.
pub const SAMPLES_PER_SECOND: u32 = 8;

/// Drops samples whose printed value repeats the previous one.
///
/// Samples without a reading pass through and are not remembered, so an
/// over-range blip does not let the next repeated value through.
pub struct Delta<I> {
    inner: I,
    last: Option<String>,
}

impl<I> Iterator for Delta<I>
where
    I: Iterator<Item = AppResult<LuxSample>>,
{
    type Item = AppResult<LuxSample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let sample = match self.inner.next()? {
                Ok(sample) => sample,
                Err(err) => return Some(Err(err)),
            };
            let Some(shown) = sample.formatted() else {
                return Some(Ok(sample));
            };
            if self.last.as_ref() == Some(&shown) {
                continue;
            }
            self.last = Some(shown);
            return Some(Ok(sample));
        }
    }
}

/// Tumbling-window mean over samples that carry a reading.
pub struct MovingAverage<I> {
    inner: I,
    window: usize,
    history: Vec<f64>,
}

impl<I> MovingAverage<I> {
    pub fn window(&self) -> usize {
        self.window
    }
}

impl<I> Iterator for MovingAverage<I>
where
    I: Iterator<Item = AppResult<LuxSample>>,
{
    type Item = AppResult<LuxSample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let sample = match self.inner.next()? {
                Ok(sample) => sample,
                Err(err) => return Some(Err(err)),
            };
            let Some(lux) = sample.lux else {
                continue;
            };
            self.history.push(lux);
            if self.history.len() < self.window {
                continue;
            }
            let mean = self.history.iter().sum::<f64>() / self.history.len() as f64;
            self.history.clear();
            return Some(Ok(LuxSample {
                lux: Some(mean),
                fractional: true,
                ..sample
            }));
        }
    }
}

pub trait SampleStreamExt: Iterator<Item = AppResult<LuxSample>> + Sized {
    fn delta(self) -> Delta<Self> {
        Delta {
            inner: self,
            last: None,
        }
    }

    /// Averages every `seconds × 8` readings into one sample.
    fn moving_average(self, seconds: u32) -> MovingAverage<Self> {
        let window = (seconds.saturating_mul(SAMPLES_PER_SECOND)).max(1) as usize;
        MovingAverage {
            inner: self,
            window,
            history: Vec::with_capacity(window),
        }
    }
}

impl<I: Iterator<Item = AppResult<LuxSample>>> SampleStreamExt for I {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LuxUnit;
    use crate::error::DaqError;
    use chrono::Local;

    fn reading(lux: Option<f64>, fractional: bool) -> AppResult<LuxSample> {
        Ok(LuxSample {
            time: Local::now(),
            lux,
            fractional,
            unit: LuxUnit::Lux,
        })
    }

    fn shown(stream: impl Iterator<Item = AppResult<LuxSample>>) -> Vec<Option<String>> {
        stream.map(|s| s.unwrap().formatted()).collect()
    }

    #[test]
    fn test_delta_suppresses_repeats() {
        let input = vec![
            reading(Some(10.0), true),
            reading(Some(10.0), true),
            reading(Some(10.01), true),
        ];
        assert_eq!(
            shown(input.into_iter().delta()),
            vec![Some("10.00".to_string()), Some("10.01".to_string())]
        );
    }

    #[test]
    fn test_delta_compares_printed_text() {
        // 10.001 prints as 10.00
        let input = vec![
            reading(Some(10.0), true),
            reading(Some(10.001), true),
            reading(None, false),
            reading(None, false),
            reading(Some(10.0), false),
        ];
        assert_eq!(
            shown(input.into_iter().delta()),
            vec![
                Some("10.00".to_string()),
                None,
                None,
                Some("10".to_string())
            ]
        );
    }

    #[test]
    fn test_delta_ignores_missing_readings() {
        let input = vec![
            reading(Some(10.0), false),
            reading(None, false),
            reading(Some(10.0), false),
            reading(Some(11.0), false),
        ];
        assert_eq!(
            shown(input.into_iter().delta()),
            vec![Some("10".to_string()), None, Some("11".to_string())]
        );
    }

    #[test]
    fn test_moving_average_tumbles() {
        let input: Vec<_> = (1..=9).map(|v| reading(Some(f64::from(v)), false)).collect();
        let mut stream = input.into_iter().moving_average(1);
        assert_eq!(stream.window(), 8);
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.lux, Some(4.5));
        assert!(first.fractional);
        // The ninth value starts a new window that never fills
        assert!(stream.next().is_none());
        assert_eq!(stream.history, vec![9.0]);
    }

    #[test]
    fn test_moving_average_skips_missing_readings() {
        let mut input = vec![reading(None, false)];
        input.extend((0..8).map(|_| reading(Some(2.0), false)));
        let averaged: Vec<_> = input.into_iter().moving_average(1).collect();
        assert_eq!(averaged.len(), 1);
        assert_eq!(averaged[0].as_ref().unwrap().lux, Some(2.0));
    }

    #[test]
    fn test_errors_pass_through() {
        let input = vec![
            reading(Some(1.0), false),
            Err(DaqError::ConnectionLost("unplugged".into())),
        ];
        let out: Vec<_> = input.into_iter().delta().collect();
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(DaqError::ConnectionLost(_))));
    }
}
