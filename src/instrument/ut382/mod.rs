//! UNI-T UT382 streaming luxmeter.
//!
//! The meter pushes a display image over its USB serial bridge eight times a
//! second at 19200 8N1. Nothing is ever written to it.
//!
//! ```no_run
//! use luxmeter_daq::config::Ut382Config;
//! use luxmeter_daq::instrument::ut382::{SampleStreamExt, Ut382};
//!
//! let mut meter = Ut382::open("ut382", "/dev/ttyUSB0", &Ut382Config::default())?;
//! for sample in meter.monitor().delta() {
//!     let sample = sample?;
//!     println!("{:?} {}", sample.formatted(), sample.unit);
//! }
//! # Ok::<(), luxmeter_daq::error::DaqError>(())
//! ```

pub mod decoder;
pub mod filters;
pub mod simulator;
pub mod sync;
pub mod table;

pub use decoder::{decode_lux, decode_raw, decode_summary, DecodedFrame, LuxReading, RawFrame};
pub use filters::{Delta, MovingAverage, SampleStreamExt};
pub use sync::{FrameSync, SyncMode};

use crate::adapters::{SerialAdapter, SerialLink, SerialSettings};
use crate::config::Ut382Config;
use crate::core::{LuxSample, MeasurementSample};
use crate::error::{AppResult, DaqError};
use crate::instrument::capabilities::{LuxMeter, MeasurementSource};
use chrono::Local;
use log::{debug, info, warn};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub struct Ut382<L: SerialLink = SerialAdapter> {
    id: String,
    link: L,
    sync: FrameSync,
    stop: Arc<AtomicBool>,
    battery_warned: bool,
}

impl Ut382<SerialAdapter> {
    pub fn open(id: &str, port: &str, config: &Ut382Config) -> AppResult<Self> {
        let settings = SerialSettings::eight_n_one(port, config.baud_rate, config.seek_timeout());
        info!("[{}] Opening UT382 on {}", id, port);
        let link = SerialAdapter::open(&settings)?;
        Ok(Self::new(id, link, config))
    }
}

impl<L: SerialLink> Ut382<L> {
    pub fn new(id: &str, link: L, config: &Ut382Config) -> Self {
        Self {
            id: id.to_string(),
            link,
            sync: FrameSync::new(
                id,
                config.seek_timeout(),
                config.synced_timeout(),
                config.not_ready_warnings,
            ),
            stop: Arc::new(AtomicBool::new(false)),
            battery_warned: false,
        }
    }

    /// Shares a flag that ends the stream once set.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync.mode()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Blocks until the next measurement frame; `Ok(None)` once stopped.
    ///
    /// Menu pages and frames without a recognizable unit are skipped.
    pub fn next_sample(&mut self) -> AppResult<Option<LuxSample>> {
        loop {
            let frame = self
                .sync
                .next_frame(&mut self.link, &self.stop)
                .map_err(|err| DaqError::ConnectionLost(err.to_string()))?;
            let Some(frame) = frame else {
                return Ok(None);
            };
            let time = Local::now();
            let display = DecodedFrame::decode(&frame.data);

            if display.battery_low && !self.battery_warned {
                warn!("[{}] Warning: battery low", self.id);
            }
            self.battery_warned = display.battery_low;

            if let Some(page) = display.menu {
                debug!("[{}] skipping menu page {:?}", self.id, page);
                continue;
            }
            let reading = decode_lux(&display);
            let Some(unit) = reading.unit else {
                debug!("[{}] skipping frame without a unit", self.id);
                continue;
            };
            return Ok(Some(LuxSample {
                time,
                lux: reading.lux,
                fractional: reading.fractional,
                unit,
            }));
        }
    }

    /// Endless sample stream. A read failure is yielded once, then the stream ends.
    pub fn monitor(&mut self) -> Monitor<'_, L> {
        Monitor {
            meter: self,
            done: false,
        }
    }
}

pub struct Monitor<'a, L: SerialLink> {
    meter: &'a mut Ut382<L>,
    done: bool,
}

impl<L: SerialLink> Iterator for Monitor<'_, L> {
    type Item = AppResult<LuxSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.meter.next_sample() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<L: SerialLink> LuxMeter for Ut382<L> {
    fn get_lux(&mut self) -> AppResult<Option<f64>> {
        Ok(self.next_sample()?.and_then(|sample| sample.lux))
    }
}

impl<L: SerialLink> MeasurementSource for Ut382<L> {
    fn id(&self) -> &str {
        &self.id
    }

    fn sample(&mut self) -> AppResult<Option<MeasurementSample>> {
        Ok(self
            .next_sample()?
            .map(|sample| sample.to_measurement(&self.id)))
    }
}

impl<L: SerialLink> Drop for Ut382<L> {
    fn drop(&mut self) {
        debug!("[{}] closing UT382 on {}", self.id, self.link.name());
    }
}
