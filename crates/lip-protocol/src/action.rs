//! Action codes
//!
//! LIP reuses one numeric code space across modes: `1` is "set level" for an
//! OUTPUT but "enable" for a DEVICE. Codes are therefore only ever resolved
//! together with the mode they arrived under.

use crate::types::LipMode;
use serde::{Deserialize, Serialize};

/// Actions for `OUTPUT` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum OutputAction {
    Level = 1,
    StartRaising = 2,
    StartLowering = 3,
    Stop = 4,
    Flash = 5,
    PulseTime = 6,
    TiltLevel = 9,
    LiftTiltLevel = 10,
    StartRaisingTilt = 11,
    StartLoweringTilt = 12,
    StopTilt = 13,
    StartRaisingLift = 14,
    StartLoweringLift = 15,
    StopLift = 16,
}

impl OutputAction {
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(OutputAction::Level),
            2 => Some(OutputAction::StartRaising),
            3 => Some(OutputAction::StartLowering),
            4 => Some(OutputAction::Stop),
            5 => Some(OutputAction::Flash),
            6 => Some(OutputAction::PulseTime),
            9 => Some(OutputAction::TiltLevel),
            10 => Some(OutputAction::LiftTiltLevel),
            11 => Some(OutputAction::StartRaisingTilt),
            12 => Some(OutputAction::StartLoweringTilt),
            13 => Some(OutputAction::StopTilt),
            14 => Some(OutputAction::StartRaisingLift),
            15 => Some(OutputAction::StartLoweringLift),
            16 => Some(OutputAction::StopLift),
            _ => None,
        }
    }
}

/// Actions for `DEVICE` messages (keypad buttons, LEDs, sensors)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum DeviceAction {
    Enable = 1,
    Disable = 2,
    /// Button press, contact closure, or occupancy
    Press = 3,
    /// Button release, contact open, or vacancy
    Release = 4,
    Hold = 5,
    DoubleTap = 6,
    LedState = 9,
    LightLevel = 14,
    HoldRelease = 32,
}

impl DeviceAction {
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(DeviceAction::Enable),
            2 => Some(DeviceAction::Disable),
            3 => Some(DeviceAction::Press),
            4 => Some(DeviceAction::Release),
            5 => Some(DeviceAction::Hold),
            6 => Some(DeviceAction::DoubleTap),
            9 => Some(DeviceAction::LedState),
            14 => Some(DeviceAction::LightLevel),
            32 => Some(DeviceAction::HoldRelease),
            _ => None,
        }
    }
}

/// Actions for `GROUP` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum GroupAction {
    OccupancyState = 3,
}

/// Actions for `SYSVAR` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum SysvarAction {
    State = 1,
}

/// Monitoring states carried in the action slot of `MONITORING` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum MonitoringAction {
    Enabled = 1,
    Disabled = 2,
}

/// An action code resolved under its mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "action", rename_all = "snake_case")]
pub enum LipAction {
    Output(OutputAction),
    Device(DeviceAction),
    Group(GroupAction),
    Sysvar(SysvarAction),
    Monitoring(MonitoringAction),
    Unrecognized { mode: LipMode, code: u32 },
}

impl LipAction {
    /// Classify `code` as it is understood under `mode`
    #[must_use]
    pub fn from_code(mode: LipMode, code: u32) -> Self {
        let resolved = match mode {
            LipMode::Output => OutputAction::from_code(code).map(LipAction::Output),
            LipMode::Device => DeviceAction::from_code(code).map(LipAction::Device),
            LipMode::Group if code == GroupAction::OccupancyState as u32 => {
                Some(LipAction::Group(GroupAction::OccupancyState))
            }
            LipMode::Sysvar if code == SysvarAction::State as u32 => {
                Some(LipAction::Sysvar(SysvarAction::State))
            }
            LipMode::Monitoring => match code {
                1 => Some(LipAction::Monitoring(MonitoringAction::Enabled)),
                2 => Some(LipAction::Monitoring(MonitoringAction::Disabled)),
                _ => None,
            },
            _ => None,
        };
        resolved.unwrap_or(LipAction::Unrecognized { mode, code })
    }

    /// The mode this action belongs to
    #[must_use]
    pub fn mode(&self) -> LipMode {
        match self {
            LipAction::Output(_) => LipMode::Output,
            LipAction::Device(_) => LipMode::Device,
            LipAction::Group(_) => LipMode::Group,
            LipAction::Sysvar(_) => LipMode::Sysvar,
            LipAction::Monitoring(_) => LipMode::Monitoring,
            LipAction::Unrecognized { mode, .. } => *mode,
        }
    }

    /// Numeric wire code
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            LipAction::Output(a) => *a as u32,
            LipAction::Device(a) => *a as u32,
            LipAction::Group(a) => *a as u32,
            LipAction::Sysvar(a) => *a as u32,
            LipAction::Monitoring(a) => *a as u32,
            LipAction::Unrecognized { code, .. } => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_code_differs_by_mode() {
        assert_eq!(
            LipAction::from_code(LipMode::Output, 1),
            LipAction::Output(OutputAction::Level)
        );
        assert_eq!(
            LipAction::from_code(LipMode::Device, 1),
            LipAction::Device(DeviceAction::Enable)
        );
    }

    #[test]
    fn test_unrecognized_keeps_mode_and_code() {
        let action = LipAction::from_code(LipMode::Group, 7);
        assert_eq!(
            action,
            LipAction::Unrecognized {
                mode: LipMode::Group,
                code: 7
            }
        );
        assert_eq!(action.mode(), LipMode::Group);
        assert_eq!(action.code(), 7);
    }

    #[test]
    fn test_code_maps_back() {
        let action = LipAction::from_code(LipMode::Device, 32);
        assert_eq!(action, LipAction::Device(DeviceAction::HoldRelease));
        assert_eq!(action.code(), 32);
        assert_eq!(action.mode(), LipMode::Device);
    }
}
