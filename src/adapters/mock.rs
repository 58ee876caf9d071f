//! Scripted in-memory serial link.
//!
//! Input is a queue of bytes interleaved with gaps; reading a gap behaves like
//! a read timeout. Replies can be attached to writes so a command/response
//! device can be simulated frame by frame. Clones share the same state, so a
//! test can keep a handle while the session owns the link.

use super::SerialLink;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Chunk {
    Byte(u8),
    Gap,
}

#[derive(Debug)]
struct ReplyRule {
    trigger: Vec<u8>,
    reply: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockState {
    input: VecDeque<Chunk>,
    rules: VecDeque<ReplyRule>,
    writes: Vec<Vec<u8>>,
    timeouts: Vec<Duration>,
    clears: usize,
    fail_when_drained: bool,
}

/// Mock link for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues bytes that become readable immediately.
    pub fn push_input(&self, bytes: &[u8]) -> &Self {
        self.state()
            .input
            .extend(bytes.iter().copied().map(Chunk::Byte));
        self
    }

    /// Queues a read timeout.
    pub fn push_gap(&self) -> &Self {
        self.state().input.push_back(Chunk::Gap);
        self
    }

    /// When the next write contains `trigger`, `reply` followed by a gap is
    /// queued as input. Rules are consumed strictly in order.
    pub fn reply_to(&self, trigger: &[u8], reply: &[u8]) -> &Self {
        self.state().rules.push_back(ReplyRule {
            trigger: trigger.to_vec(),
            reply: Some(reply.to_vec()),
        });
        self
    }

    /// Like [`MockAdapter::reply_to`] but the device stays silent.
    pub fn silent_on(&self, trigger: &[u8]) -> &Self {
        self.state().rules.push_back(ReplyRule {
            trigger: trigger.to_vec(),
            reply: None,
        });
        self
    }

    /// Once all input is consumed, reads fail instead of timing out.
    pub fn fail_when_drained(&self) -> &Self {
        self.state().fail_when_drained = true;
        self
    }

    /// Every buffer written so far.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    /// Number of writes containing `needle`.
    pub fn count_writes(&self, needle: &[u8]) -> usize {
        self.state()
            .writes
            .iter()
            .filter(|w| contains(w, needle))
            .count()
    }

    /// Timeouts requested through [`SerialLink::set_timeout`].
    pub fn timeouts(&self) -> Vec<Duration> {
        self.state().timeouts.clone()
    }

    pub fn clear_count(&self) -> usize {
        self.state().clears
    }

    /// Reply rules not consumed yet.
    pub fn pending_rules(&self) -> usize {
        self.state().rules.len()
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

impl SerialLink for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        state.writes.push(bytes.to_vec());
        let matches = state
            .rules
            .front()
            .is_some_and(|rule| contains(bytes, &rule.trigger));
        if matches {
            if let Some(rule) = state.rules.pop_front() {
                if let Some(reply) = rule.reply {
                    state.input.extend(reply.into_iter().map(Chunk::Byte));
                    state.input.push_back(Chunk::Gap);
                }
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.input.is_empty() {
            if state.fail_when_drained {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link drained"));
            }
            return Ok(0);
        }
        let mut n = 0;
        while n < buf.len() {
            match state.input.front().copied() {
                Some(Chunk::Byte(b)) => {
                    buf[n] = b;
                    n += 1;
                    state.input.pop_front();
                }
                Some(Chunk::Gap) => {
                    if n == 0 {
                        state.input.pop_front();
                    }
                    break;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        let mut state = self.state();
        state.clears += 1;
        state.input.clear();
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.state().timeouts.push(timeout);
        Ok(())
    }
}
