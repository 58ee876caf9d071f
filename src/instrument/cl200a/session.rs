//! CL-200A connection handshake and measurement session.
//!
//! ```text
//! Disconnected -> Connecting -> PcMode -> Held -> ExtMode -> Ready <-> Measuring
//!                                   any fatal error -> Faulted(reason)
//! ```
//!
//! Commands and responses are strictly paired: a new frame is only written
//! after the previous reply (or its read timeout) has been consumed.

use super::codec::{
    decode, encode, Command, CommandCode, ResponseFault, ResponseFields, DATA1_DIGITS,
    DATA2_DIGITS, DATA3_DIGITS, ERR_INDEX,
};
use crate::adapters::{SerialAdapter, SerialLink, SerialSettings};
use crate::config::Cl200aConfig;
use crate::core::{Cct, LuxUnit, MeasurementSample};
use crate::error::{AppResult, DaqError};
use crate::error_recovery::{retry_bounded, Attempt, RetryPolicy};
use crate::instrument::capabilities::{ChromaMeter, LuxMeter, MeasurementSource};
use crate::instrument::cct::{cct_for_methods, ChromaticityToCct, StandardCct};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::io;
use std::time::Duration;

/// Remedy the instrument manual gives for error codes 1 to 3.
pub const POWER_CYCLE: &str = "Switch off the CL-200A and then switch it back on";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    PcMode,
    Held,
    ExtMode,
    Ready,
    Measuring,
    Faulted(String),
}

/// Timing and validation policy of one session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub command_delay: Duration,
    pub ext_mode_delay: Duration,
    pub read_timeout: Duration,
    pub verify_handshake: bool,
    pub verify_checksum: bool,
    pub retry: RetryPolicy,
    pub cct_methods: Vec<String>,
}

impl From<&Cl200aConfig> for SessionOptions {
    fn from(config: &Cl200aConfig) -> Self {
        Self {
            command_delay: config.command_delay(),
            ext_mode_delay: config.ext_mode_delay(),
            read_timeout: config.read_timeout(),
            verify_handshake: config.verify_handshake,
            verify_checksum: config.verify_checksum,
            retry: RetryPolicy::default(),
            cct_methods: config.cct_methods.clone(),
        }
    }
}

impl SessionOptions {
    /// Default policy without inter-command pauses, for scripted links.
    pub fn immediate() -> Self {
        Self {
            command_delay: Duration::ZERO,
            ext_mode_delay: Duration::ZERO,
            ..Self::from(&Cl200aConfig::default())
        }
    }
}

/// An open CL-200A in EXT mode.
pub struct Cl200aSession<L: SerialLink = SerialAdapter> {
    id: String,
    link: L,
    state: SessionState,
    options: SessionOptions,
    converter: Box<dyn ChromaticityToCct>,
}

impl Cl200aSession<SerialAdapter> {
    /// Opens `port` at 7E1 and runs the full handshake.
    pub fn open(id: &str, port: &str, config: &Cl200aConfig) -> AppResult<Self> {
        let settings = SerialSettings::seven_e_one(port, config.baud_rate, config.read_timeout());
        info!("[{}] Opening CL-200A on {}", id, port);
        let link = SerialAdapter::open(&settings)?;
        Self::connect(id, link, SessionOptions::from(config))
    }
}

impl<L: SerialLink> Cl200aSession<L> {
    /// Takes ownership of `link` and brings the instrument into EXT mode.
    ///
    /// On failure the link is dropped, releasing the port.
    pub fn connect(id: &str, link: L, options: SessionOptions) -> AppResult<Self> {
        let mut session = Self {
            id: id.to_string(),
            link,
            state: SessionState::Disconnected,
            options,
            converter: Box::new(StandardCct),
        };
        session.state = SessionState::Connecting;
        let result = session.handshake();
        session.track(result)?;
        info!("[{}] CL-200A ready on {}", session.id, session.link.name());
        Ok(session)
    }

    /// Replaces the routine used for CCT methods other than `me_mccamy`.
    pub fn with_converter(mut self, converter: Box<dyn ChromaticityToCct>) -> Self {
        self.converter = converter;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn handshake(&mut self) -> AppResult<()> {
        self.link
            .set_timeout(self.options.read_timeout)
            .map_err(connection_lost)?;
        self.enter_pc_mode()?;
        self.hold()?;
        self.ext_mode()?;
        self.state = SessionState::Ready;
        Ok(())
    }

    fn send(&mut self, code: CommandCode, delay: Duration) -> AppResult<()> {
        let frame = encode(&Command::new(code))?;
        self.link.write_all(&frame).map_err(connection_lost)?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    fn clear(&mut self) -> AppResult<()> {
        self.link.clear_buffers().map_err(connection_lost)
    }

    fn instrument_fault(&self, code: u8) -> DaqError {
        info!("[{}] {}", self.id, POWER_CYCLE);
        DaqError::InstrumentFault {
            code,
            message: POWER_CYCLE.to_string(),
        }
    }

    /// Records fatal errors as the terminal state.
    fn track<T>(&mut self, result: AppResult<T>) -> AppResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                error!("[{}] session faulted: {}", self.id, err);
                self.state = SessionState::Faulted(err.to_string());
            }
        }
        result
    }

    fn ensure_usable(&self) -> AppResult<()> {
        match &self.state {
            SessionState::Faulted(reason) => Err(DaqError::SessionFaulted(reason.clone())),
            _ => Ok(()),
        }
    }

    /// Command 54. Without handshake verification the first reply is accepted.
    fn enter_pc_mode(&mut self) -> AppResult<()> {
        let id = self.id.clone();
        let policy = self.options.retry.clone();
        retry_bounded(
            &id,
            &policy,
            |_| {
                self.send(CommandCode::PcConnect, self.options.command_delay)?;
                let reply = self.link.read_line().map_err(connection_lost)?;
                self.clear()?;
                if !self.options.verify_handshake {
                    return Ok(Attempt::Done(()));
                }
                match decode(&reply, CommandCode::PcConnect, self.options.verify_checksum) {
                    Ok(_) => Ok(Attempt::Done(())),
                    Err(ResponseFault::ErrorCode(code)) => Err(self.instrument_fault(code)),
                    Err(fault) => Ok(Attempt::Retry(fault)),
                }
            },
            |fault| {
                DaqError::Handshake(format!(
                    "CL-200A did not acknowledge PC connection mode ({fault}). Please verify USB cable."
                ))
            },
        )?;
        debug!("[{}] PC connection mode", id);
        self.state = SessionState::PcMode;
        Ok(())
    }

    /// Command 55. Sent unconditionally; the instrument does not answer.
    fn hold(&mut self) -> AppResult<()> {
        self.clear()?;
        self.send(CommandCode::Hold, self.options.command_delay)?;
        self.state = SessionState::Held;
        Ok(())
    }

    /// Command 40. ERR `4` means the hold did not take: hold again and retry.
    fn ext_mode(&mut self) -> AppResult<()> {
        self.clear()?;
        let id = self.id.clone();
        let policy = self.options.retry.clone();
        let max_attempts = policy.max_attempts.max(1);
        retry_bounded(
            &id,
            &policy,
            |attempt| {
                self.send(CommandCode::SetExtMode, self.options.ext_mode_delay)?;
                let reply = self.link.read_line().map_err(connection_lost)?;
                match reply.get(ERR_INDEX).copied() {
                    Some(b'4') => {
                        if attempt + 1 < max_attempts {
                            self.hold()?;
                        }
                        Ok(Attempt::Retry("hold status was not set (ERR 4)"))
                    }
                    Some(code @ b'1'..=b'3') => {
                        error!("[{}] Set hold mode error", id);
                        Err(self.instrument_fault(code - b'0'))
                    }
                    _ => Ok(Attempt::Done(())),
                }
            },
            |reason| DaqError::Handshake(format!("CL-200A refused EXT mode: {reason}")),
        )?;
        debug!("[{}] EXT mode", id);
        self.state = SessionState::ExtMode;
        Ok(())
    }

    /// One EXT measurement followed by `read`, validated and passed to `extract`.
    ///
    /// A malformed reply (including an unparsable field) is retried under the
    /// session retry policy; an empty read is `Ok(None)`.
    fn measure<T, F>(&mut self, read: CommandCode, extract: F) -> AppResult<Option<T>>
    where
        F: Fn(&ResponseFields) -> Result<T, ResponseFault>,
    {
        self.ensure_usable()?;
        self.state = SessionState::Measuring;
        let id = self.id.clone();
        let policy = self.options.retry.clone();
        let result = retry_bounded(
            &id,
            &policy,
            |_| {
                self.clear()?;
                self.send(CommandCode::ExtMeasure, self.options.command_delay)?;
                self.send(read, Duration::ZERO)?;
                let reply = self.link.read_line().map_err(connection_lost)?;
                if reply.is_empty() {
                    debug!("[{}] Serial got: nothing", id);
                    return Ok(Attempt::Done(None));
                }
                debug!(
                    "[{}] Got raw data: {}",
                    id,
                    String::from_utf8_lossy(&reply).trim_end()
                );
                let parsed = decode(&reply, read, self.options.verify_checksum).and_then(|fields| {
                    for warning in fields.warnings() {
                        warn!("[{}] {}", id, warning);
                    }
                    extract(&fields)
                });
                match parsed {
                    Ok(value) => Ok(Attempt::Done(Some(value))),
                    Err(ResponseFault::ErrorCode(code)) => Err(self.instrument_fault(code)),
                    Err(fault) => Ok(Attempt::Retry(fault)),
                }
            },
            DaqError::Frame,
        );
        self.state = SessionState::Ready;
        self.track(result)
    }

    /// Triggers a measurement and returns the validated `read` response.
    pub fn perform_measurement(&mut self, read: CommandCode) -> AppResult<Option<ResponseFields>> {
        self.measure(read, |fields| Ok(fields.clone()))
    }
}

impl<L: SerialLink> LuxMeter for Cl200aSession<L> {
    fn get_lux(&mut self) -> AppResult<Option<f64>> {
        let lux = self.measure(CommandCode::ReadEvXy, ResponseFields::illuminance)?;
        if let Some(lux) = lux {
            debug!("[{}] Returning {} luxes", self.id, lux);
        }
        Ok(lux)
    }
}

impl<L: SerialLink> ChromaMeter for Cl200aSession<L> {
    fn get_xyz(&mut self) -> AppResult<Option<(f64, f64, f64)>> {
        let xyz = self.measure(CommandCode::ReadXyz, |fields| {
            Ok((
                fields.scaled(DATA1_DIGITS)?,
                fields.scaled(DATA2_DIGITS)?,
                fields.scaled(DATA3_DIGITS)?,
            ))
        })?;
        if let Some((x, y, z)) = xyz {
            debug!("[{}] X: {}, Y: {}, Z: {}", self.id, x, y, z);
        }
        Ok(xyz)
    }

    fn get_delta_uv(&mut self) -> AppResult<Option<(f64, f64, f64)>> {
        let reading = self.measure(CommandCode::ReadEvTcpDeltaUv, |fields| {
            Ok((
                fields.illuminance()?,
                fields.scaled(DATA2_DIGITS)?,
                fields.scaled(DATA3_DIGITS)?,
            ))
        })?;
        if let Some((lux, tcp, delta_uv)) = reading {
            debug!(
                "[{}] Illuminance: {} lux, TCP: {}, DeltaUV: {}",
                self.id, lux, tcp, delta_uv
            );
        }
        Ok(reading)
    }

    fn get_cct(&mut self, methods: &[&str]) -> AppResult<Option<Cct>> {
        let Some(xyz) = self.get_xyz()? else {
            return Ok(None);
        };
        Ok(cct_for_methods(&self.id, xyz, methods, self.converter.as_ref()))
    }
}

impl<L: SerialLink> MeasurementSource for Cl200aSession<L> {
    fn id(&self) -> &str {
        &self.id
    }

    /// Illuminance, TCP and Δuv from one reading, XYZ and CCT from another.
    fn sample(&mut self) -> AppResult<Option<MeasurementSample>> {
        let Some((lux, tcp, delta_uv)) = self.get_delta_uv()? else {
            return Ok(None);
        };
        let xyz = self.get_xyz()?;
        let methods = self.options.cct_methods.clone();
        let methods: Vec<&str> = methods.iter().map(String::as_str).collect();
        let cct = match xyz {
            Some(xyz) => cct_for_methods(&self.id, xyz, &methods, self.converter.as_ref()),
            None => None,
        };
        Ok(Some(MeasurementSample {
            timestamp: Utc::now(),
            instrument_id: self.id.clone(),
            lux: Some(lux),
            unit: LuxUnit::Lux,
            cct,
            xyz,
            tcp: Some(tcp),
            delta_uv: Some(delta_uv),
        }))
    }
}

impl<L: SerialLink> Drop for Cl200aSession<L> {
    fn drop(&mut self) {
        debug!("[{}] closing CL-200A session ({:?})", self.id, self.state);
    }
}

fn connection_lost(err: io::Error) -> DaqError {
    DaqError::ConnectionLost(err.to_string())
}
