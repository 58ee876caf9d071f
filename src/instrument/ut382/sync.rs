//! Frame alignment for the UT382 byte stream.
//!
//! The stream has no start-of-frame marker. While `Seeking`, bytes are read
//! one at a time into a 33 byte window until the window holds a structurally
//! valid frame. Once `Synced`, whole 33 byte blocks are read and the first bad
//! block drops back to seeking.

use super::decoder::{decode_raw, RawFrame, FRAME_LEN};
use crate::adapters::SerialLink;
use log::{debug, warn};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    Seeking,
    Synced,
}

pub struct FrameSync {
    id: String,
    mode: SyncMode,
    window: VecDeque<u8>,
    seek_timeout: Duration,
    synced_timeout: Duration,
    /// "Waiting for device" warnings still to print.
    not_ready_warnings: u32,
    timeout_applied: Option<SyncMode>,
}

impl FrameSync {
    pub fn new(
        id: &str,
        seek_timeout: Duration,
        synced_timeout: Duration,
        not_ready_warnings: u32,
    ) -> Self {
        Self {
            id: id.to_string(),
            mode: SyncMode::Seeking,
            window: VecDeque::with_capacity(FRAME_LEN),
            seek_timeout,
            synced_timeout,
            not_ready_warnings,
            timeout_applied: None,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    fn apply_timeout<L: SerialLink>(&mut self, link: &mut L) -> io::Result<()> {
        if self.timeout_applied != Some(self.mode) {
            let timeout = match self.mode {
                SyncMode::Seeking => self.seek_timeout,
                SyncMode::Synced => self.synced_timeout,
            };
            link.set_timeout(timeout)?;
            self.timeout_applied = Some(self.mode);
        }
        Ok(())
    }

    fn lose_sync(&mut self, reason: &str) {
        debug!("[{}] lost frame alignment: {}", self.id, reason);
        self.mode = SyncMode::Seeking;
        self.window.clear();
    }

    /// Blocks until the next valid frame, or returns `Ok(None)` once `stop` is set.
    pub fn next_frame<L: SerialLink>(
        &mut self,
        link: &mut L,
        stop: &AtomicBool,
    ) -> io::Result<Option<RawFrame>> {
        while !stop.load(Ordering::Relaxed) {
            self.apply_timeout(link)?;
            match self.mode {
                SyncMode::Seeking => {
                    if let Some(frame) = self.seek_step(link)? {
                        debug!("[{}] frame alignment found", self.id);
                        self.mode = SyncMode::Synced;
                        self.window.clear();
                        return Ok(Some(frame));
                    }
                }
                SyncMode::Synced => {
                    let block = link.read_up_to(FRAME_LEN)?;
                    if block.len() != FRAME_LEN {
                        self.lose_sync(&format!("short block of {} bytes", block.len()));
                        continue;
                    }
                    let frame = decode_raw(&block);
                    if frame.is_weird() {
                        let reasons: Vec<String> =
                            frame.anomalies.iter().map(ToString::to_string).collect();
                        self.lose_sync(&reasons.join(", "));
                        continue;
                    }
                    return Ok(Some(frame));
                }
            }
        }
        Ok(None)
    }

    /// Reads one byte into the window; a valid full window is a frame.
    fn seek_step<L: SerialLink>(&mut self, link: &mut L) -> io::Result<Option<RawFrame>> {
        let mut byte = [0u8; 1];
        if link.read(&mut byte)? == 0 {
            if self.window.is_empty() {
                if self.not_ready_warnings > 0 {
                    warn!("[{}] Waiting for device...", self.id);
                    self.not_ready_warnings -= 1;
                }
            } else {
                // A pause never falls inside a frame
                self.window.clear();
            }
            return Ok(None);
        }

        self.window.push_back(byte[0]);
        if self.window.len() > FRAME_LEN {
            self.window.pop_front();
        }
        if self.window.len() < FRAME_LEN {
            return Ok(None);
        }
        let frame = decode_raw(self.window.make_contiguous());
        Ok((!frame.is_weird()).then_some(frame))
    }
}
