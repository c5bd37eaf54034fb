//! Parsed LIP message record

use crate::action::LipAction;
use crate::types::LipMode;
use serde::Serialize;

/// Numeric payload, typed by mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LipValue {
    /// OUTPUT / DEVICE: light level (0.0-100.0) or sensor reading
    Level(f64),
    /// GROUP / SYSVAR: integer state code
    State(i64),
}

impl LipValue {
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            LipValue::Level(v) => *v,
            #[allow(clippy::cast_precision_loss)]
            LipValue::State(v) => *v as f64,
        }
    }
}

/// A single response line, classified
///
/// Constructed fresh for each parsed line and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LipMessage {
    pub mode: LipMode,
    /// Present for every data mode
    pub integration_id: Option<u32>,
    /// Keypad component (button/LED); DEVICE only
    pub component_number: Option<u32>,
    pub action_number: Option<u32>,
    pub value: Option<LipValue>,
    /// The received line without prompt or line ending
    pub raw: String,
}

impl LipMessage {
    /// A message carrying only its mode and raw line
    /// (keep-alive, error, and unknown modes)
    #[must_use]
    pub fn bare(mode: LipMode, raw: impl Into<String>) -> Self {
        Self {
            mode,
            integration_id: None,
            component_number: None,
            action_number: None,
            value: None,
            raw: raw.into(),
        }
    }

    /// Action resolved under this message's mode
    #[must_use]
    pub fn action(&self) -> Option<LipAction> {
        self.action_number
            .map(|code| LipAction::from_code(self.mode, code))
    }

    /// Value as a float, if any
    #[must_use]
    pub fn value_f64(&self) -> Option<f64> {
        self.value.as_ref().map(LipValue::as_f64)
    }

    /// Integer state code, if this mode carries one
    #[must_use]
    pub fn state_code(&self) -> Option<i64> {
        match self.value {
            Some(LipValue::State(code)) => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::OutputAction;

    #[test]
    fn test_action_uses_message_mode() {
        let msg = LipMessage {
            mode: LipMode::Output,
            integration_id: Some(4),
            component_number: None,
            action_number: Some(1),
            value: Some(LipValue::Level(75.0)),
            raw: "~OUTPUT,4,1,75.00".into(),
        };
        assert_eq!(msg.action(), Some(LipAction::Output(OutputAction::Level)));
        assert_eq!(msg.value_f64(), Some(75.0));
        assert_eq!(msg.state_code(), None);
    }

    #[test]
    fn test_bare_message_has_no_fields() {
        let msg = LipMessage::bare(LipMode::Error, "~ERROR,6");
        assert_eq!(msg.integration_id, None);
        assert_eq!(msg.action(), None);
        assert_eq!(msg.raw, "~ERROR,6");
    }
}
