use core::fmt;

use hal::ModeCommand;

/// Cyclic assist level, cycled by [`ModeCommand::ToggleCyclic`].
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclicMode {
    #[default]
    Off,
    /// Attitude hold in forward flight, stick blended on top
    Auto,
    /// Position and velocity hold
    Hover,
}

impl CyclicMode {
    pub fn next(self) -> Self {
        match self {
            CyclicMode::Off => CyclicMode::Auto,
            CyclicMode::Auto => CyclicMode::Hover,
            CyclicMode::Hover => CyclicMode::Off,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != CyclicMode::Off
    }

    pub fn is_hovering(self) -> bool {
        self == CyclicMode::Hover
    }
}

impl fmt::Display for CyclicMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclicMode::Off => write!(f, "OFF"),
            CyclicMode::Auto => write!(f, "ON (manual/auto)"),
            CyclicMode::Hover => write!(f, "HOVERING"),
        }
    }
}

/// What changed when a command was applied, so the owner can reset the
/// affected law.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    Cyclic(CyclicMode),
    YawHold(bool),
    Blocked(bool),
    Unchanged,
}

/// Operator-selected modes. Never persisted.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeState {
    pub cyclic: CyclicMode,
    pub yaw_hold: bool,
    pub blocked: bool,
}

impl ModeState {
    pub fn apply(&mut self, command: ModeCommand) -> ModeChange {
        match command {
            ModeCommand::ToggleCyclic => {
                self.cyclic = self.cyclic.next();
                ModeChange::Cyclic(self.cyclic)
            }
            ModeCommand::ToggleYawHold => {
                self.yaw_hold = !self.yaw_hold;
                ModeChange::YawHold(self.yaw_hold)
            }
            ModeCommand::Freeze if !self.blocked => {
                self.blocked = true;
                ModeChange::Blocked(true)
            }
            ModeCommand::Unfreeze if self.blocked => {
                self.blocked = false;
                ModeChange::Blocked(false)
            }
            ModeCommand::Freeze | ModeCommand::Unfreeze => ModeChange::Unchanged,
        }
    }
}
