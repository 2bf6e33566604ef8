//! # Actuator Drivers
//!
//! The scheduler talks to hardware through [`ActuatorDriver`], an opaque
//! capability with five operations. Every driver is owned by exactly one
//! scheduler thread; nothing else ever touches it.
//!
//! ## Implementations
//! - [`SimulatedDriver`] - In-memory arm that records every call
//! - [`DobotDriver`] - Dobot Magician over its serial protocol
//! - [`ClampedDriver`] - Wraps any driver and forces poses into the safety box
//!
//! Drivers are built per track by a [`DriverFactory`] so the manager can spawn
//! schedulers without knowing which hardware is attached.

mod dobot;
mod simulated;

pub use dobot::{protocol, DobotDriver, DobotFactory};
pub use simulated::{CallLog, DriverCall, SimulatedDriver, SimulatedFactory};

use crate::error::DrumbotError;
use crate::pose::{Pose, SafetyBox};
use crate::score::TrackName;

pub trait ActuatorDriver: Send {
    fn connect(&mut self, port: &str) -> Result<(), DrumbotError>;

    fn set_speed(&mut self, velocity: f64, acceleration: f64) -> Result<(), DrumbotError>;

    /// Queue a point-to-point move. With `blocking` the call returns only once
    /// the arm has arrived.
    fn move_to(&mut self, pose: Pose, blocking: bool) -> Result<(), DrumbotError>;

    fn current_pose(&mut self) -> Result<Pose, DrumbotError>;

    fn disconnect(&mut self) -> Result<(), DrumbotError>;

    fn is_connected(&self) -> bool;
}

impl<D: ActuatorDriver + ?Sized> ActuatorDriver for Box<D> {
    fn connect(&mut self, port: &str) -> Result<(), DrumbotError> {
        (**self).connect(port)
    }

    fn set_speed(&mut self, velocity: f64, acceleration: f64) -> Result<(), DrumbotError> {
        (**self).set_speed(velocity, acceleration)
    }

    fn move_to(&mut self, pose: Pose, blocking: bool) -> Result<(), DrumbotError> {
        (**self).move_to(pose, blocking)
    }

    fn current_pose(&mut self) -> Result<Pose, DrumbotError> {
        (**self).current_pose()
    }

    fn disconnect(&mut self) -> Result<(), DrumbotError> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Forwards to `inner` with every pose clamped into `safety`.
pub struct ClampedDriver<D> {
    inner: D,
    safety: SafetyBox,
}

impl<D: ActuatorDriver> ClampedDriver<D> {
    pub fn new(inner: D, safety: SafetyBox) -> Self {
        Self { inner, safety }
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: ActuatorDriver> ActuatorDriver for ClampedDriver<D> {
    fn connect(&mut self, port: &str) -> Result<(), DrumbotError> {
        self.inner.connect(port)
    }

    fn set_speed(&mut self, velocity: f64, acceleration: f64) -> Result<(), DrumbotError> {
        self.inner.set_speed(velocity, acceleration)
    }

    fn move_to(&mut self, pose: Pose, blocking: bool) -> Result<(), DrumbotError> {
        self.inner.move_to(self.safety.clamp(pose), blocking)
    }

    fn current_pose(&mut self) -> Result<Pose, DrumbotError> {
        self.inner.current_pose()
    }

    fn disconnect(&mut self) -> Result<(), DrumbotError> {
        self.inner.disconnect()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

/// Builds one driver per track.
pub trait DriverFactory: Send + Sync {
    fn create(&self, track: TrackName) -> Box<dyn ActuatorDriver>;
}
