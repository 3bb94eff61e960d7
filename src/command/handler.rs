//! Applying received commands and sending local ones.

use super::frame::{CommandError, CommandFrame, JoystickCommand};
use super::role::{Role, RoleCell};
use crate::link::{Endpoint, MacAddress};
use log::{info, warn};
use std::sync::Arc;

/// Motor output collaborator.
pub trait MotorSink: Send + Sync {
    /// Drive the motors according to `cmd`.
    fn apply(&self, cmd: &JoystickCommand);
}

/// Motor sink that only logs each command.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMotor;

impl MotorSink for LoggingMotor {
    fn apply(&self, cmd: &JoystickCommand) {
        info!(
            "Cmd: steer={}%, throttle={}%, btn={}",
            cmd.steer_pct, cmd.throttle_pct, cmd.buttons.0
        );
    }
}

/// Local joystick collaborator (sampling and calibration live behind it).
pub trait JoystickInput: Send {
    /// Read the current stick position and buttons.
    fn sample(&mut self) -> JoystickCommand;
}

/// Input that always reads a centered stick.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralInput;

impl JoystickInput for NeutralInput {
    fn sample(&mut self) -> JoystickCommand {
        JoystickCommand::neutral()
    }
}

/// Decodes received command frames, settles the role and drives the motors.
pub struct CommandHandler {
    role: Arc<RoleCell>,
    motor: Arc<dyn MotorSink>,
}

impl CommandHandler {
    /// Create a handler sharing `role` with the sampling loop.
    pub fn new(role: Arc<RoleCell>, motor: Arc<dyn MotorSink>) -> Self {
        Self { role, motor }
    }

    /// Handle one completed message starting with the command magic.
    ///
    /// A valid joystick command decides the role as [`Role::Car`] if it is
    /// still undecided, then reaches the motors whatever the role.
    pub fn handle(&self, src: MacAddress, data: &[u8]) -> Result<JoystickCommand, CommandError> {
        let CommandFrame::Joystick(cmd) = CommandFrame::decode(data)?;
        if self.role.decide(Role::Car) {
            info!("Command from {} before role decided, role is car", src);
        }
        self.motor.apply(&cmd);
        Ok(cmd)
    }
}

/// Outcome of one controller transmission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Broadcast copy went out.
    pub broadcast: bool,
    /// Peers reached by unicast.
    pub unicast_ok: usize,
    /// Peers whose unicast failed.
    pub unicast_failed: usize,
}

/// Send `cmd` as a broadcast and as a unicast to every known peer.
///
/// Failures are logged; one failing peer does not stop the others.
pub fn send_command(endpoint: &Endpoint, cmd: &JoystickCommand) -> TickReport {
    let frame = cmd.encode();
    let mut report = TickReport::default();

    match endpoint.send(MacAddress::BROADCAST, &frame) {
        Ok(()) => report.broadcast = true,
        Err(e) => warn!("Command broadcast failed: {}", e),
    }
    for peer in endpoint.peers() {
        match endpoint.send(peer, &frame) {
            Ok(()) => report.unicast_ok += 1,
            Err(e) => {
                report.unicast_failed += 1;
                warn!("Command to {} failed: {}", peer, e);
            }
        }
    }
    report
}
