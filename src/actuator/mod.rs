//! Line-oriented RGB light controller used as the stimulus during calibration.
//!
//! Commands are plain text terminated by `\n`. Queries are answered with
//! `Topic = <JSON>`, for example `RESULT = {"Dimmer":40}`.

use crate::adapters::{SerialAdapter, SerialLink, SerialSettings};
use crate::config::ActuatorConfig;
use crate::error::{AppResult, DaqError};
use crate::error_recovery::{retry_bounded, Attempt, RetryPolicy};
use log::{debug, info, warn};
use serde_json::Value;
use std::time::Duration;

/// Last known controller state.
///
/// Only query replies and set commands update it. A reply that lacks the
/// queried key leaves the previous value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActuatorCache {
    version: u64,
    pub pixels: Option<u64>,
    pub dimmer: Option<u64>,
    pub color: Option<String>,
}

impl ActuatorCache {
    /// Incremented on every update.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn record_pixels(&mut self, pixels: u64) {
        self.pixels = Some(pixels);
        self.version += 1;
    }

    fn record_dimmer(&mut self, dimmer: u64) {
        self.dimmer = Some(dimmer);
        self.version += 1;
    }

    fn record_color(&mut self, color: String) {
        self.color = Some(color);
        self.version += 1;
    }
}

/// Splits `Topic = <JSON>` and returns `key` from it.
///
/// The outer `None` marks a malformed reply, the inner one a reply without `key`.
pub fn parse_reply(line: &str, key: &str) -> Option<Option<Value>> {
    let (topic, payload) = line.trim().split_once(" = ")?;
    let value: Value = serde_json::from_str(payload.trim()).ok()?;
    Some(match value {
        Value::Object(mut map) => map.remove(key),
        scalar if topic.trim() == key => Some(scalar),
        _ => None,
    })
}

pub struct NeoLights<L: SerialLink = SerialAdapter> {
    id: String,
    link: L,
    reply_delay: Duration,
    cache: ActuatorCache,
}

impl NeoLights<SerialAdapter> {
    /// Opens the port, waits for the controller to boot and reads its state.
    pub fn open(id: &str, config: &ActuatorConfig) -> AppResult<Self> {
        let reply_delay = Duration::from_millis(config.reply_delay_ms);
        let settings = SerialSettings::eight_n_one(&config.port, config.baud_rate, reply_delay);
        let link = SerialAdapter::open(&settings)?;
        info!("[{}] Waiting {} ms while initializing...", id, config.settle_ms);
        std::thread::sleep(Duration::from_millis(config.settle_ms));
        let mut lights = Self::new(id, link, reply_delay);
        lights.initialize()?;
        Ok(lights)
    }
}

impl<L: SerialLink> NeoLights<L> {
    pub fn new(id: &str, link: L, reply_delay: Duration) -> Self {
        Self {
            id: id.to_string(),
            link,
            reply_delay,
            cache: ActuatorCache::default(),
        }
    }

    pub fn cache(&self) -> &ActuatorCache {
        &self.cache
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Queries pixel count, brightness and color.
    pub fn initialize(&mut self) -> AppResult<()> {
        let pixels = self.get_pixels_count()?;
        info!("[{}] Init pixels count = {:?}", self.id, pixels);
        let dimmer = self.get_brightness()?;
        info!("[{}] Init dimmer = {:?}", self.id, dimmer);
        let color = self.get_color()?;
        info!("[{}] Init color = {:?}", self.id, color);
        Ok(())
    }

    pub fn send_cmd(&mut self, cmd: &str) -> AppResult<()> {
        debug!("[{}] -> {}", self.id, cmd);
        self.link
            .write_all(format!("{}\n", cmd).as_bytes())
            .map_err(|err| DaqError::Actuator(format!("write failed: {}", err)))
    }

    fn read_reply(&mut self) -> AppResult<String> {
        let line = self
            .link
            .read_line()
            .map_err(|err| DaqError::Actuator(format!("read failed: {}", err)))?;
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Sends `key` and returns its value; a malformed reply is read once more.
    fn query(&mut self, key: &str) -> AppResult<Option<Value>> {
        self.link
            .clear_buffers()
            .map_err(|err| DaqError::Actuator(format!("clear failed: {}", err)))?;
        self.send_cmd(key)?;
        if !self.reply_delay.is_zero() {
            std::thread::sleep(self.reply_delay);
        }
        let id = self.id.clone();
        retry_bounded(
            &id,
            &RetryPolicy::default(),
            |_| {
                let line = self.read_reply()?;
                match parse_reply(&line, key) {
                    Some(value) => Ok(Attempt::Done(value)),
                    None => Ok(Attempt::Retry(format!("Got: {}", line.trim()))),
                }
            },
            DaqError::Actuator,
        )
    }

    pub fn get_pixels_count(&mut self) -> AppResult<Option<u64>> {
        if let Some(pixels) = self.query("Pixels")?.and_then(|v| v.as_u64()) {
            self.cache.record_pixels(pixels);
        }
        Ok(self.cache.pixels)
    }

    pub fn get_brightness(&mut self) -> AppResult<Option<u64>> {
        if let Some(dimmer) = self.query("Dimmer")?.and_then(|v| v.as_u64()) {
            self.cache.record_dimmer(dimmer);
        }
        Ok(self.cache.dimmer)
    }

    pub fn get_color(&mut self) -> AppResult<Option<String>> {
        let color = self.query("Color")?.map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });
        if let Some(color) = color {
            self.cache.record_color(color);
        }
        Ok(self.cache.color.clone())
    }

    pub fn set_brightness(&mut self, brightness: u8) -> AppResult<()> {
        self.send_cmd(&format!("Dimmer {}", brightness))?;
        self.cache.record_dimmer(u64::from(brightness));
        Ok(())
    }

    /// `color` is a hex RGB string such as `FF8000`.
    pub fn set_color(&mut self, color: &str) -> AppResult<()> {
        self.send_cmd(&format!("Color {}", color))?;
        self.cache.record_color(color.to_string());
        Ok(())
    }

    pub fn set_led(&mut self, led: u32, color: &str) -> AppResult<()> {
        self.send_cmd(&format!("Led{} {}", led, color))
    }
}

impl<L: SerialLink> Drop for NeoLights<L> {
    fn drop(&mut self) {
        if let Err(err) = self.send_cmd("Dimmer 0") {
            warn!("[{}] could not switch the light off: {}", self.id, err);
        }
    }
}
