//! Abstraction layer over the vessel's instruments and controls
//!
//! The alignment core never touches screen capture, input injection or game
//! state files directly. It talks to these traits, which can be backed by the
//! simulated vessel (for testing) or a live client (for production).

pub mod locator;
pub mod mock;

use crate::image_proc::detection::AABB;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub use locator::ColorRingLocator;

/// Errors raised by instrument collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentError {
    #[error("capture of {region} failed: {reason}")]
    Capture { region: Region, reason: String },
    #[error("no binding configured for action '{0}'")]
    UnmappedAction(String),
    #[error("actuation of {action} failed: {reason}")]
    Actuation { action: Action, reason: String },
    #[error("telemetry unavailable: {0}")]
    Telemetry(String),
}

/// Result type for instrument operations
pub type InstrumentResult<T> = Result<T, InstrumentError>;

/// Pre-calibrated screen regions that can be captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// Area of the cockpit panel holding the navigation compass
    Compass,
    /// Centre of the viewport where the target reticle appears
    Target,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Compass => write!(f, "compass"),
            Region::Target => write!(f, "target"),
        }
    }
}

/// Named directional and mode commands understood by an [`Actuator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    PitchUp,
    PitchDown,
    YawLeft,
    YawRight,
    RollLeft,
    RollRight,
    ThrottleZero,
    Throttle25,
    Throttle50,
    Throttle100,
    Boost,
    EngageSupercruise,
}

impl Action {
    pub const ALL: [Action; 12] = [
        Action::PitchUp,
        Action::PitchDown,
        Action::YawLeft,
        Action::YawRight,
        Action::RollLeft,
        Action::RollRight,
        Action::ThrottleZero,
        Action::Throttle25,
        Action::Throttle50,
        Action::Throttle100,
        Action::Boost,
        Action::EngageSupercruise,
    ];

    /// Binding name as used in key mapping files
    pub fn name(&self) -> &'static str {
        match self {
            Action::PitchUp => "PitchUpButton",
            Action::PitchDown => "PitchDownButton",
            Action::YawLeft => "YawLeftButton",
            Action::YawRight => "YawRightButton",
            Action::RollLeft => "RollLeftButton",
            Action::RollRight => "RollRightButton",
            Action::ThrottleZero => "SetSpeedZero",
            Action::Throttle25 => "SetSpeed25",
            Action::Throttle50 => "SetSpeed50",
            Action::Throttle100 => "SetSpeed100",
            Action::Boost => "UseBoostJuice",
            Action::EngageSupercruise => "Supercruise",
        }
    }

    /// The action that undoes this one, for the directional commands
    pub fn opposite(&self) -> Option<Action> {
        match self {
            Action::PitchUp => Some(Action::PitchDown),
            Action::PitchDown => Some(Action::PitchUp),
            Action::YawLeft => Some(Action::YawRight),
            Action::YawRight => Some(Action::YawLeft),
            Action::RollLeft => Some(Action::RollRight),
            Action::RollRight => Some(Action::RollLeft),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.name() == s)
            .ok_or_else(|| InstrumentError::UnmappedAction(s.to_string()))
    }
}

/// Boolean telemetry flags published by the game client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// Vessel is in supercruise travel mode
    Supercruise,
    /// Supercruise overcharge (the secondary high-speed mode) is active
    ScoActive,
    OverHeating,
    LowFuel,
    /// Another vessel is pulling us out of supercruise
    BeingInterdicted,
    /// Interdiction completed, we have been dropped to normal space
    Interdicted,
    FsdCharging,
    FsdCooldown,
    /// The "disengage" prompt is showing near the destination
    DisengagePrompt,
}

/// Point-in-time read of the vessel state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub supercruise: bool,
    pub sco_active: bool,
    pub over_heating: bool,
    pub low_fuel: bool,
    pub being_interdicted: bool,
    pub interdicted: bool,
    pub fsd_charging: bool,
    pub fsd_cooldown: bool,
    pub disengage_prompt: bool,
    /// Remaining main fuel as a percentage of capacity
    pub fuel_percent: f64,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            supercruise: false,
            sco_active: false,
            over_heating: false,
            low_fuel: false,
            being_interdicted: false,
            interdicted: false,
            fsd_charging: false,
            fsd_cooldown: false,
            disengage_prompt: false,
            fuel_percent: 100.0,
        }
    }
}

impl TelemetrySnapshot {
    pub fn flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::Supercruise => self.supercruise,
            Flag::ScoActive => self.sco_active,
            Flag::OverHeating => self.over_heating,
            Flag::LowFuel => self.low_fuel,
            Flag::BeingInterdicted => self.being_interdicted,
            Flag::Interdicted => self.interdicted,
            Flag::FsdCharging => self.fsd_charging,
            Flag::FsdCooldown => self.fsd_cooldown,
            Flag::DisengagePrompt => self.disengage_prompt,
        }
    }

    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        let slot = match flag {
            Flag::Supercruise => &mut self.supercruise,
            Flag::ScoActive => &mut self.sco_active,
            Flag::OverHeating => &mut self.over_heating,
            Flag::LowFuel => &mut self.low_fuel,
            Flag::BeingInterdicted => &mut self.being_interdicted,
            Flag::Interdicted => &mut self.interdicted,
            Flag::FsdCharging => &mut self.fsd_charging,
            Flag::FsdCooldown => &mut self.fsd_cooldown,
            Flag::DisengagePrompt => &mut self.disengage_prompt,
        };
        *slot = value;
    }
}

/// Located instrument widget within a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding region of the widget in frame coordinates
    pub region: AABB,
    /// Locator score in [0, 1]
    pub confidence: f64,
}

/// Captures named screen regions
pub trait FrameSource: Send + Sync {
    /// Capture one frame of `region`
    fn capture(&self, region: Region) -> InstrumentResult<RgbImage>;
}

/// Finds the compass widget inside a captured frame
///
/// May be a trained model or a classical detector; the alignment core only
/// needs the region and a confidence.
pub trait InstrumentLocator: Send + Sync {
    fn locate(&self, frame: &RgbImage) -> Option<Detection>;
}

/// Executes named commands held for a duration
pub trait Actuator: Send + Sync {
    /// Press `action` for `hold`, then release it.
    ///
    /// Implementations must release the input before returning, even on error.
    fn actuate(&self, action: Action, hold: Duration) -> InstrumentResult<()>;

    /// Resolve a binding name and actuate it.
    ///
    /// Fails with [`InstrumentError::UnmappedAction`] when the name has no mapping.
    fn actuate_named(&self, name: &str, hold: Duration) -> InstrumentResult<()> {
        let action: Action = name.parse()?;
        self.actuate(action, hold)
    }
}

/// Reads game state
pub trait Telemetry: Send + Sync {
    fn snapshot(&self) -> InstrumentResult<TelemetrySnapshot>;

    fn read_flag(&self, flag: Flag) -> InstrumentResult<bool> {
        Ok(self.snapshot()?.flag(flag))
    }
}
