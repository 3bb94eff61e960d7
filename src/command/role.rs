//! Controller/car role negotiation.
//!
//! A node starts [`Role::Unknown`]. During the decision window after boot
//! the local joystick is watched: any axis change larger than the activity
//! threshold, or any button change, marks the node as handled by a person.
//! When the window closes the node becomes [`Role::Controller`] if activity
//! was seen and [`Role::Car`] otherwise. A joystick command arriving while
//! the role is still undecided makes the node a car at once. Once decided,
//! the role never changes.

use super::frame::JoystickCommand;
use crate::config::RoleConfig;
use log::info;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Node role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Not yet decided.
    Unknown,
    /// Hand controller: samples the joystick and sends commands.
    Controller,
    /// Vehicle: applies received commands to its motors.
    Car,
}

impl Role {
    fn to_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Controller => 1,
            Self::Car => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Controller,
            2 => Self::Car,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Controller => write!(f, "controller"),
            Self::Car => write!(f, "car"),
        }
    }
}

/// Set-once role shared between the receive path and the sampling loop.
#[derive(Debug, Default)]
pub struct RoleCell(AtomicU8);

impl RoleCell {
    /// Create an undecided cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current role.
    pub fn get(&self) -> Role {
        Role::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Decide the role if it is still [`Role::Unknown`].
    ///
    /// Returns `true` if this call made the decision.
    pub fn decide(&self, role: Role) -> bool {
        if role == Role::Unknown {
            return false;
        }
        self.0
            .compare_exchange(
                Role::Unknown.to_u8(),
                role.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Watches local input during the decision window.
///
/// Owned by the sampling loop; the shared decision lives in a [`RoleCell`].
#[derive(Debug)]
pub struct RoleResolver {
    deadline: Instant,
    threshold: u8,
    last: Option<JoystickCommand>,
    activity: bool,
}

impl RoleResolver {
    /// Start a decision window at `boot`.
    pub fn new(config: &RoleConfig, boot: Instant) -> Self {
        Self::with_window(config.decision_window, config.activity_threshold, boot)
    }

    /// Start a window of explicit length.
    pub fn with_window(window: Duration, threshold: u8, boot: Instant) -> Self {
        Self {
            deadline: boot + window,
            threshold,
            last: None,
            activity: false,
        }
    }

    /// Activity seen so far.
    pub fn activity_observed(&self) -> bool {
        self.activity
    }

    /// Feed one local sample taken at `now` and return the current role.
    pub fn observe(&mut self, cell: &RoleCell, sample: JoystickCommand, now: Instant) -> Role {
        let current = cell.get();
        if current != Role::Unknown {
            return current;
        }

        if let Some(prev) = self.last {
            let steer = (sample.steer_pct as i16 - prev.steer_pct as i16).unsigned_abs();
            let throttle = (sample.throttle_pct as i16 - prev.throttle_pct as i16).unsigned_abs();
            let threshold = self.threshold as u16;
            if !self.activity
                && (steer > threshold || throttle > threshold || sample.buttons != prev.buttons)
            {
                info!("Local joystick activity observed");
                self.activity = true;
            }
        }
        self.last = Some(sample);

        if now >= self.deadline {
            let role = if self.activity {
                Role::Controller
            } else {
                Role::Car
            };
            if cell.decide(role) {
                info!("Decision window closed, role is {}", role);
            }
        }
        cell.get()
    }
}
