//! Command protocol and role layer.
//!
//! Completed messages starting with `CM` are command frames. The joystick
//! command carries steering, throttle and a button mask; receiving one
//! drives the motors and, if the role is still open, makes this node the
//! car. A controller sends its local joystick every sampling tick.

mod frame;
mod handler;
mod role;

pub use frame::{
    Buttons, CommandError, CommandFrame, JoystickCommand, CMD_HEADER_SIZE, CMD_MAGIC, CMD_VERSION,
    JOYSTICK_FRAME_LEN, MAX_PCT, TYPE_JOYSTICK,
};
pub use handler::{
    send_command, CommandHandler, JoystickInput, LoggingMotor, MotorSink, NeutralInput, TickReport,
};
pub use role::{Role, RoleCell, RoleResolver};
