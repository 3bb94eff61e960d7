//! Command frame codec.
//!
//! ```text
//! ['C']['M'][type: u8][version: u8][steer_pct: i8][throttle_pct: i8][buttons: u8]
//! ```
//!
//! Only the joystick command (type 1) exists today. Bytes after the joystick
//! payload are ignored so later versions can append fields.

/// Two magic bytes opening every command frame.
pub const CMD_MAGIC: [u8; 2] = [b'C', b'M'];

/// Command protocol version.
pub const CMD_VERSION: u8 = 1;

/// Joystick command type.
pub const TYPE_JOYSTICK: u8 = 1;

/// Command header length (magic, type, version).
pub const CMD_HEADER_SIZE: usize = 4;

/// Encoded length of a joystick command.
pub const JOYSTICK_FRAME_LEN: usize = CMD_HEADER_SIZE + 3;

/// Largest magnitude of a percentage axis.
pub const MAX_PCT: i8 = 100;

/// Button bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Buttons(pub u8);

impl Buttons {
    /// Stick push switch.
    pub const SWITCH: Self = Self(1 << 0);

    /// No buttons pressed.
    pub const NONE: Self = Self(0);

    /// Check if the given button(s) are pressed.
    #[inline]
    #[must_use]
    pub const fn contains(self, button: Buttons) -> bool {
        (self.0 & button.0) == button.0
    }

    /// Set or clear button(s).
    #[inline]
    pub fn set(&mut self, button: Buttons, pressed: bool) {
        if pressed {
            self.0 |= button.0;
        } else {
            self.0 &= !button.0;
        }
    }
}

/// Steering, throttle and buttons of one joystick sample.
///
/// `steer_pct < 0` is left, `throttle_pct > 0` is forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoystickCommand {
    /// Steering in percent, -100..=100.
    pub steer_pct: i8,
    /// Throttle in percent, -100..=100.
    pub throttle_pct: i8,
    /// Pressed buttons.
    pub buttons: Buttons,
}

impl JoystickCommand {
    /// Build a command, clamping both axes to -100..=100.
    pub fn new(steer_pct: i8, throttle_pct: i8, buttons: Buttons) -> Self {
        Self {
            steer_pct: steer_pct.clamp(-MAX_PCT, MAX_PCT),
            throttle_pct: throttle_pct.clamp(-MAX_PCT, MAX_PCT),
            buttons,
        }
    }

    /// Centered stick, nothing pressed.
    pub const fn neutral() -> Self {
        Self {
            steer_pct: 0,
            throttle_pct: 0,
            buttons: Buttons::NONE,
        }
    }

    /// Serialize to a joystick command frame.
    pub fn encode(&self) -> [u8; JOYSTICK_FRAME_LEN] {
        [
            CMD_MAGIC[0],
            CMD_MAGIC[1],
            TYPE_JOYSTICK,
            CMD_VERSION,
            self.steer_pct as u8,
            self.throttle_pct as u8,
            self.buttons.0,
        ]
    }
}

/// A decoded command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFrame {
    /// Joystick sample from the controller.
    Joystick(JoystickCommand),
}

impl CommandFrame {
    /// Check for the command magic without decoding.
    pub fn has_magic(bytes: &[u8]) -> bool {
        bytes.starts_with(&CMD_MAGIC)
    }

    /// Parse a command frame.
    ///
    /// Out-of-range percentages are clamped rather than rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, CommandError> {
        if bytes.len() < CMD_HEADER_SIZE {
            return Err(CommandError::TooShort(bytes.len()));
        }
        if !Self::has_magic(bytes) {
            return Err(CommandError::BadMagic);
        }
        if bytes[3] != CMD_VERSION {
            return Err(CommandError::UnsupportedVersion(bytes[3]));
        }
        match bytes[2] {
            TYPE_JOYSTICK => {
                if bytes.len() < JOYSTICK_FRAME_LEN {
                    return Err(CommandError::TooShort(bytes.len()));
                }
                Ok(Self::Joystick(JoystickCommand::new(
                    bytes[4] as i8,
                    bytes[5] as i8,
                    Buttons(bytes[6]),
                )))
            }
            other => Err(CommandError::UnknownType(other)),
        }
    }
}

/// Command decode errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Frame shorter than its type requires.
    TooShort(usize),
    /// First two bytes are not `CM`.
    BadMagic,
    /// Unknown command type.
    UnknownType(u8),
    /// Version other than [`CMD_VERSION`].
    UnsupportedVersion(u8),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "command frame too short ({} bytes)", len),
            Self::BadMagic => write!(f, "bad command magic"),
            Self::UnknownType(t) => write!(f, "unknown command type {}", t),
            Self::UnsupportedVersion(v) => write!(f, "unsupported command version {}", v),
        }
    }
}

impl std::error::Error for CommandError {}
