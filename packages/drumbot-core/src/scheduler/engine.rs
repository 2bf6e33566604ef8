//! Real-time execution of one actuator's motion plan
//!
//! Every loop starts at `master_start + loop_index * loop_duration`. For each
//! step the scheduler asks the controller for the guided time, works back to
//! the instant the command has to leave the host, waits for it and sends a
//! non-blocking move.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use super::types::{ActuatorState, SchedulerSettings, StatusBoard};
use crate::calibration::CalibrationTable;
use crate::deadline::{wait_until, CancellationToken, SessionClock, WaitOutcome, WaitPolicy};
use crate::driver::{ActuatorDriver, ClampedDriver};
use crate::entrainment::ControllerHandle;
use crate::error::DrumbotError;
use crate::events::{CueSender, EventSink, SchedulerEvent};
use crate::motion::{MotionAction, MotionPlan, MotionStep};
use crate::pose::Pose;
use crate::score::TrackName;

/// Where the arm was last sent and at which speed.
struct ArmState {
    pose: Pose,
    speed: (f64, f64),
}

pub struct ActuatorScheduler {
    track: TrackName,
    plan: MotionPlan,
    settings: SchedulerSettings,
    policy: WaitPolicy,
    loop_duration_s: f64,
    calibration: Arc<CalibrationTable>,
    controller: ControllerHandle,
    token: CancellationToken,
    events: EventSink,
    cues: Option<CueSender>,
    status: StatusBoard,
    max_loops: Option<usize>,
}

impl ActuatorScheduler {
    pub fn new(
        plan: MotionPlan,
        settings: SchedulerSettings,
        calibration: Arc<CalibrationTable>,
        controller: ControllerHandle,
        token: CancellationToken,
    ) -> Self {
        Self {
            track: plan.track,
            loop_duration_s: plan.loop_duration_s,
            plan,
            settings,
            policy: WaitPolicy::default(),
            calibration,
            controller,
            token,
            events: EventSink::none(),
            cues: None,
            status: StatusBoard::new(),
            max_loops: None,
        }
    }

    /// Loop length shared with the other actuators of the session.
    pub fn with_loop_duration(mut self, seconds: f64) -> Self {
        self.loop_duration_s = seconds;
        self
    }

    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cues(mut self, cues: Option<CueSender>) -> Self {
        self.cues = cues;
        self
    }

    pub fn with_status(mut self, status: StatusBoard) -> Self {
        self.status = status;
        self
    }

    /// Stop on its own after this many loops.
    pub fn with_max_loops(mut self, loops: Option<usize>) -> Self {
        self.max_loops = loops;
        self
    }

    pub fn track(&self) -> TrackName {
        self.track
    }

    pub fn plan(&self) -> &MotionPlan {
        &self.plan
    }

    /// Run until cancelled (or `max_loops`), then park and disconnect.
    ///
    /// An empty plan returns before the driver is touched. Errors end this
    /// actuator only; cleanup runs whenever the connection was opened.
    pub fn run<D: ActuatorDriver>(&self, driver: D, master_start: Instant) -> Result<(), DrumbotError> {
        if self.plan.is_empty() {
            info!(track = %self.track, "motion plan is empty; not connecting");
            self.set_state(ActuatorState::Terminated);
            return Ok(());
        }

        let mut driver = ClampedDriver::new(driver, self.settings.safety);
        let mut connected = false;
        let result = self.perform(&mut driver, master_start, &mut connected);

        if connected {
            self.set_state(ActuatorState::CleaningUp);
            self.cleanup(&mut driver);
        }

        match &result {
            Ok(()) => {
                info!(track = %self.track, "actuator stopped");
                self.set_state(ActuatorState::Terminated);
            }
            Err(e) => {
                error!(track = %self.track, error = %e, "actuator failed");
                self.set_state(ActuatorState::Failed(e.to_string()));
            }
        }
        result
    }

    fn perform<D: ActuatorDriver>(
        &self,
        driver: &mut D,
        master_start: Instant,
        connected: &mut bool,
    ) -> Result<(), DrumbotError> {
        self.set_state(ActuatorState::Connecting);
        driver.connect(&self.settings.port)?;
        *connected = true;
        info!(track = %self.track, port = %self.settings.port, "actuator connected");

        let ready_speed = (self.settings.ready_velocity, self.settings.ready_acceleration);
        driver.set_speed(ready_speed.0, ready_speed.1)?;
        let ready = self.settings.safety.clamp(self.settings.ready_pose);
        driver.move_to(ready, true)?;
        self.set_state(ActuatorState::Ready);

        let clock = SessionClock::new(master_start);
        let mut arm = ArmState {
            pose: ready,
            speed: ready_speed,
        };
        self.set_state(ActuatorState::WaitingForStart);

        let mut loop_index = 0;
        while !self.token.is_cancelled() {
            if self.max_loops.map_or(false, |max| loop_index >= max) {
                break;
            }
            self.set_state(ActuatorState::Looping { loop_index });
            let loop_start_s = loop_index as f64 * self.loop_duration_s;
            debug!(track = %self.track, loop_index, loop_start_s, "loop started");

            for step in self.plan.steps() {
                if self.token.is_cancelled() {
                    return Ok(());
                }
                if !self.execute_step(driver, &clock, loop_index, loop_start_s, step, &mut arm)? {
                    return Ok(());
                }
            }
            loop_index += 1;
        }
        Ok(())
    }

    /// Returns `Ok(false)` when cancelled while waiting.
    fn execute_step<D: ActuatorDriver>(
        &self,
        driver: &mut D,
        clock: &SessionClock,
        loop_index: usize,
        loop_start_s: f64,
        step: &MotionStep,
        arm: &mut ArmState,
    ) -> Result<bool, DrumbotError> {
        let latency = self.settings.communication_latency_s;

        let guided = self.controller.guided_timing(self.track, step.target_time_s * 1000.0);
        if let Some(message) = guided.log {
            debug!(track = %self.track, "{}", message);
            self.events.emit(SchedulerEvent::ControllerLog {
                track: self.track,
                message,
            });
        }

        let target_s = loop_start_s + guided.time_ms / 1000.0 - self.settings.first_hit_compensation_s;
        let move_duration_s = if step.is_compensated {
            0.0
        } else {
            self.calibration
                .duration_from_distance(arm.pose.distance_to(&step.pose))
        };
        let send_s = target_s - move_duration_s - latency;

        let late_s = clock.now_s() - send_s;
        if late_s > 0.0 {
            trace!(track = %self.track, late_ms = late_s * 1000.0, "step already due");
        }
        if wait_until(clock.instant_at(send_s), &self.token, &self.policy) == WaitOutcome::Cancelled {
            return Ok(false);
        }

        self.events.emit(SchedulerEvent::CommandIssued {
            track: self.track,
            loop_index,
            step: step.clone(),
        });

        let speed = (step.velocity, step.acceleration);
        if arm.speed != speed {
            driver.set_speed(speed.0, speed.1)?;
            arm.speed = speed;
        }
        driver.move_to(step.pose, false)?;
        arm.pose = step.pose;

        if !step.is_compensated {
            let arrival_s = send_s + latency + move_duration_s;
            self.events.emit(SchedulerEvent::EstimatedArrival {
                track: self.track,
                time_s: arrival_s,
                pose_height: step.pose.z,
            });
            if let (Some(cues), MotionAction::Strike) = (&self.cues, step.action) {
                cues.schedule(self.track, clock.instant_at(arrival_s + self.settings.hit_cue_offset_s));
            }
        }
        Ok(true)
    }

    /// Park and disconnect. Each half is attempted regardless of the other.
    fn cleanup<D: ActuatorDriver>(&self, driver: &mut D) {
        let safe = self.settings.safety.clamp(self.settings.safe_pose);
        if let Err(e) = driver.move_to(safe, true) {
            warn!(track = %self.track, error = %e, "could not move to safe pose");
        }
        if let Err(e) = driver.disconnect() {
            warn!(track = %self.track, error = %e, "disconnect failed");
        }
    }

    fn set_state(&self, state: ActuatorState) {
        self.status.set(self.track, state.clone());
        self.events.emit(SchedulerEvent::StateChanged {
            track: self.track,
            state,
        });
    }
}
