//! Response line parser
//!
//! Turns one line received from the repeater into a [`LipMessage`]. Lines
//! that carry no data (blank lines, bare prompts, echoes of our own `#`/`?`
//! commands) yield `Ok(None)`.
//!
//! Response grammar:
//! ```text
//! ~<MODE>,<integration_id>,<field>[,<field>][,<field>]
//! ~SYSTEM...          keep-alive answer
//! ~ERROR,<code>       protocol error
//! ```

use crate::message::{LipMessage, LipValue};
use crate::types::{FieldError, LipMode, LipOperation, ProtocolError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Prefix of keep-alive answers
pub const KEEPALIVE_PREFIX: &str = "~SYSTEM";

/// Leading NULs and `GNET>`/`QNET>` style prompts
static PROMPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\x00|[A-Z]NET>\s*)+").expect("prompt pattern"));

static ERROR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^~ERROR,\d+").expect("error pattern"));

static MESSAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^~(\w+),(\d+),(\d+)(?:,([0-9.]+))?(?:,([0-9.]+))?").expect("message pattern")
});

/// Time of the most recent keep-alive answer, shareable across tasks
#[derive(Debug, Clone, Default)]
pub struct KeepAliveClock {
    inner: Arc<KeepAliveInner>,
}

#[derive(Debug, Default)]
struct KeepAliveInner {
    /// Milliseconds since the Unix epoch, 0 until the first answer
    last_ms: AtomicU64,
    /// Number of answers seen
    count: AtomicU64,
}

impl KeepAliveClock {
    fn record(&self) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        self.inner.last_ms.store(now_ms, Ordering::Release);
        self.inner.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Wall-clock time of the last keep-alive answer
    #[must_use]
    pub fn last(&self) -> Option<SystemTime> {
        match self.inner.last_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    /// Number of keep-alive answers seen so far
    #[must_use]
    pub fn count(&self) -> u64 {
        self.inner.count.load(Ordering::Acquire)
    }
}

/// LIP response parser
#[derive(Debug, Default)]
pub struct LipParser {
    keepalive: KeepAliveClock,
}

impl LipParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time the last keep-alive answer was parsed
    #[must_use]
    pub fn last_keepalive(&self) -> Option<SystemTime> {
        self.keepalive.last()
    }

    /// Handle for reading keep-alive liveness from another task
    #[must_use]
    pub fn keepalive_clock(&self) -> KeepAliveClock {
        self.keepalive.clone()
    }

    /// Parse one line
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidMessage`] when a `~` line does not fit
    /// the response grammar or one of its fields fails to convert.
    pub fn parse(&self, line: &str) -> Result<Option<LipMessage>, ProtocolError> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let line = PROMPT_RE.replace(line, "");
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }

        if line.starts_with(KEEPALIVE_PREFIX) {
            self.keepalive.record();
            return Ok(Some(LipMessage::bare(LipMode::KeepAlive, line)));
        }

        if ERROR_RE.is_match(line) {
            return Ok(Some(LipMessage::bare(LipMode::Error, line)));
        }

        // Echoed `#`/`?` commands and free text carry no state
        if line.chars().next().and_then(LipOperation::from_prefix) != Some(LipOperation::Response) {
            return Ok(None);
        }

        Self::parse_response(line)
            .map(Some)
            .map_err(|source| ProtocolError::InvalidMessage {
                line: line.to_string(),
                source,
            })
    }

    fn parse_response(line: &str) -> Result<LipMessage, FieldError> {
        let caps = MESSAGE_RE.captures(line).ok_or(FieldError::NoMatch)?;

        let mode = LipMode::from_wire(&caps[1]);
        if mode == LipMode::Unknown {
            return Ok(LipMessage::bare(LipMode::Unknown, line));
        }

        let integration_id = Some(int_field(&caps, 2, "integration_id")?);

        let (component_number, action_number, value) = match mode {
            LipMode::Output => (
                None,
                int_field(&caps, 3, "action_number")?,
                Some(LipValue::Level(level_field(&caps, 4, "value")?)),
            ),
            LipMode::Device => (
                Some(int_field(&caps, 3, "component_number")?),
                int_field(&caps, 4, "action_number")?,
                Some(LipValue::Level(level_field(&caps, 5, "value")?)),
            ),
            LipMode::Group | LipMode::Sysvar => (
                None,
                int_field(&caps, 3, "action_number")?,
                Some(LipValue::State(state_field(&caps, 4, "value")?)),
            ),
            LipMode::Monitoring => (None, int_field(&caps, 3, "action_number")?, None),
            LipMode::KeepAlive | LipMode::Error | LipMode::Unknown => {
                return Ok(LipMessage::bare(mode, line));
            }
        };

        Ok(LipMessage {
            mode,
            integration_id,
            component_number,
            action_number: Some(action_number),
            value,
            raw: line.to_string(),
        })
    }
}

fn group<'a>(caps: &'a Captures<'_>, idx: usize, field: &'static str) -> Result<&'a str, FieldError> {
    caps.get(idx)
        .map(|m| m.as_str())
        .ok_or(FieldError::Missing(field))
}

fn int_field(caps: &Captures<'_>, idx: usize, field: &'static str) -> Result<u32, FieldError> {
    group(caps, idx, field)?
        .parse()
        .map_err(|source| FieldError::Int { field, source })
}

fn state_field(caps: &Captures<'_>, idx: usize, field: &'static str) -> Result<i64, FieldError> {
    group(caps, idx, field)?
        .parse()
        .map_err(|source| FieldError::Int { field, source })
}

/// Float field that reads as 0.0 when absent
fn level_field(caps: &Captures<'_>, idx: usize, field: &'static str) -> Result<f64, FieldError> {
    match caps.get(idx) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|source| FieldError::Float { field, source }),
        None => Ok(0.0),
    }
}
