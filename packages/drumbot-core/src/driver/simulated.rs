//! In-memory actuator used by tests and `--simulate` sessions.
//!
//! Arrival is instantaneous unless a blocking delay is configured. Every call
//! is appended to a [`CallLog`] that outlives the driver, so a test can inspect
//! exactly what a scheduler sent after its thread has finished.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{ActuatorDriver, DriverFactory};
use crate::error::DrumbotError;
use crate::pose::Pose;
use crate::score::TrackName;

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Connect { port: String },
    SetSpeed { velocity: f64, acceleration: f64 },
    MoveTo { pose: Pose, blocking: bool },
    CurrentPose,
    Disconnect,
}

/// Shared record of driver calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<DriverCall>>>,
}

impl CallLog {
    fn push(&self, call: DriverCall) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    /// Every `move_to` as `(pose, blocking)`, in call order.
    pub fn moves(&self) -> Vec<(Pose, bool)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DriverCall::MoveTo { pose, blocking } => Some((*pose, *blocking)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&DriverCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn disconnects(&self) -> usize {
        self.count(|c| matches!(c, DriverCall::Disconnect))
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

type MoveHook = Box<dyn FnMut(usize, &Pose) + Send>;

pub struct SimulatedDriver {
    track: TrackName,
    log: CallLog,
    pose: Pose,
    connected: bool,
    fail_connect: bool,
    failing_moves: BTreeSet<usize>,
    moves: usize,
    blocking_delay: Duration,
    on_move: Option<MoveHook>,
}

impl SimulatedDriver {
    pub fn new(track: TrackName) -> Self {
        Self {
            track,
            log: CallLog::default(),
            pose: Pose::new(230.0, 0.0, 60.0, 0.0),
            connected: false,
            fail_connect: false,
            failing_moves: BTreeSet::new(),
            moves: 0,
            blocking_delay: Duration::ZERO,
            on_move: None,
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Make the `n`-th `move_to` (1-based, blocking or not) fail after it
    /// has been recorded.
    pub fn failing_move(mut self, n: usize) -> Self {
        self.failing_moves.insert(n);
        self
    }

    pub fn with_blocking_delay(mut self, delay: Duration) -> Self {
        self.blocking_delay = delay;
        self
    }

    /// Called with the 1-based move number after each recorded `move_to`.
    pub fn on_move(mut self, hook: impl FnMut(usize, &Pose) + Send + 'static) -> Self {
        self.on_move = Some(Box::new(hook));
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn hardware(&self, message: impl Into<String>) -> DrumbotError {
        DrumbotError::Hardware {
            track: self.track,
            message: message.into(),
        }
    }
}

impl ActuatorDriver for SimulatedDriver {
    fn connect(&mut self, port: &str) -> Result<(), DrumbotError> {
        self.log.push(DriverCall::Connect { port: port.to_string() });
        if self.fail_connect {
            return Err(DrumbotError::Connection {
                port: port.to_string(),
                message: "simulated connection failure".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn set_speed(&mut self, velocity: f64, acceleration: f64) -> Result<(), DrumbotError> {
        self.log.push(DriverCall::SetSpeed { velocity, acceleration });
        if !self.connected {
            return Err(self.hardware("not connected"));
        }
        Ok(())
    }

    fn move_to(&mut self, pose: Pose, blocking: bool) -> Result<(), DrumbotError> {
        self.log.push(DriverCall::MoveTo { pose, blocking });
        self.moves += 1;
        let number = self.moves;
        if let Some(hook) = self.on_move.as_mut() {
            hook(number, &pose);
        }
        if !self.connected {
            return Err(self.hardware("not connected"));
        }
        if self.failing_moves.contains(&number) {
            return Err(self.hardware(format!("simulated failure on move {}", number)));
        }
        if blocking && !self.blocking_delay.is_zero() {
            thread::sleep(self.blocking_delay);
        }
        self.pose = pose;
        Ok(())
    }

    fn current_pose(&mut self) -> Result<Pose, DrumbotError> {
        self.log.push(DriverCall::CurrentPose);
        Ok(self.pose)
    }

    fn disconnect(&mut self) -> Result<(), DrumbotError> {
        self.log.push(DriverCall::Disconnect);
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Hands out simulated drivers whose logs stay readable through the factory.
#[derive(Debug, Default)]
pub struct SimulatedFactory {
    logs: BTreeMap<TrackName, CallLog>,
    failing_connect: BTreeSet<TrackName>,
    failing_moves: BTreeMap<TrackName, usize>,
    blocking_delay: Duration,
}

impl SimulatedFactory {
    pub fn new() -> Self {
        let logs = TrackName::ALL.iter().map(|&t| (t, CallLog::default())).collect();
        Self {
            logs,
            ..Self::default()
        }
    }

    pub fn fail_connect(mut self, track: TrackName) -> Self {
        self.failing_connect.insert(track);
        self
    }

    pub fn fail_move(mut self, track: TrackName, n: usize) -> Self {
        self.failing_moves.insert(track, n);
        self
    }

    /// Blocking moves (ready and safe pose) sleep this long.
    pub fn with_blocking_delay(mut self, delay: Duration) -> Self {
        self.blocking_delay = delay;
        self
    }

    pub fn log(&self, track: TrackName) -> CallLog {
        self.logs.get(&track).cloned().unwrap_or_default()
    }
}

impl DriverFactory for SimulatedFactory {
    fn create(&self, track: TrackName) -> Box<dyn ActuatorDriver> {
        let mut driver = SimulatedDriver::new(track)
            .with_log(self.log(track))
            .with_blocking_delay(self.blocking_delay);
        if self.failing_connect.contains(&track) {
            driver = driver.failing_connect();
        }
        if let Some(&n) = self.failing_moves.get(&track) {
            driver = driver.failing_move(n);
        }
        Box::new(driver)
    }
}
