//! Dobot Magician serial driver
//!
//! Frames on the wire:
//!
//! ```text
//! AA AA | len | id | ctrl | params ... | checksum
//! ```
//!
//! `len` counts `id + ctrl + params`. The checksum is the two's complement of
//! the byte sum of `id`, `ctrl` and `params`. Bit 0 of `ctrl` marks a write,
//! bit 1 a queued command; queued commands answer with their 64-bit queue
//! index, which blocking moves poll for.

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use self::protocol::{Message, HEADER};
use super::{ActuatorDriver, DriverFactory};
use crate::error::DrumbotError;
use crate::pose::Pose;
use crate::score::TrackName;

pub mod protocol {
    use crate::error::DrumbotError;
    use crate::pose::Pose;

    pub const HEADER: [u8; 2] = [0xAA, 0xAA];
    pub const BAUD_RATE: u32 = 115_200;

    pub const CTRL_READ: u8 = 0x00;
    pub const CTRL_WRITE: u8 = 0x01;
    pub const CTRL_QUEUED: u8 = 0x02;

    /// Point-to-point joint-interpolated move to Cartesian coordinates.
    pub const PTP_MOVJ_XYZ: u8 = 0x01;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(u8)]
    pub enum CommandId {
        GetPose = 10,
        SetPtpCoordinateParams = 81,
        SetPtpCommonParams = 83,
        SetPtpCmd = 84,
        SetQueuedCmdStartExec = 240,
        SetQueuedCmdClear = 245,
        GetQueuedCmdCurrentIndex = 246,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Message {
        pub id: u8,
        pub ctrl: u8,
        pub params: Vec<u8>,
    }

    impl Message {
        pub fn new(id: CommandId, ctrl: u8, params: Vec<u8>) -> Self {
            Self {
                id: id as u8,
                ctrl,
                params,
            }
        }

        pub fn get_pose() -> Self {
            Self::new(CommandId::GetPose, CTRL_READ, Vec::new())
        }

        pub fn get_queued_index() -> Self {
            Self::new(CommandId::GetQueuedCmdCurrentIndex, CTRL_READ, Vec::new())
        }

        pub fn start_queue() -> Self {
            Self::new(CommandId::SetQueuedCmdStartExec, CTRL_WRITE, Vec::new())
        }

        pub fn clear_queue() -> Self {
            Self::new(CommandId::SetQueuedCmdClear, CTRL_WRITE, Vec::new())
        }

        pub fn coordinate_params(velocity: f64, acceleration: f64) -> Self {
            let params = floats(&[velocity, velocity, acceleration, acceleration]);
            Self::new(CommandId::SetPtpCoordinateParams, CTRL_WRITE | CTRL_QUEUED, params)
        }

        pub fn common_params(velocity_ratio: f64, acceleration_ratio: f64) -> Self {
            let params = floats(&[velocity_ratio, acceleration_ratio]);
            Self::new(CommandId::SetPtpCommonParams, CTRL_WRITE | CTRL_QUEUED, params)
        }

        pub fn ptp_move(pose: Pose) -> Self {
            let mut params = vec![PTP_MOVJ_XYZ];
            params.extend(floats(&[pose.x, pose.y, pose.z, pose.r]));
            Self::new(CommandId::SetPtpCmd, CTRL_WRITE | CTRL_QUEUED, params)
        }

        pub fn checksum(&self) -> u8 {
            let sum = self
                .params
                .iter()
                .fold(self.id.wrapping_add(self.ctrl), |acc, b| acc.wrapping_add(*b));
            sum.wrapping_neg()
        }

        pub fn encode(&self) -> Vec<u8> {
            let mut frame = Vec::with_capacity(6 + self.params.len());
            frame.extend_from_slice(&HEADER);
            frame.push((2 + self.params.len()) as u8);
            frame.push(self.id);
            frame.push(self.ctrl);
            frame.extend_from_slice(&self.params);
            frame.push(self.checksum());
            frame
        }

        /// Decode the bytes following the header: `len`, payload and checksum.
        pub fn decode_body(body: &[u8]) -> Result<Self, DrumbotError> {
            let (&len, rest) = body
                .split_first()
                .ok_or_else(|| DrumbotError::Protocol("empty frame".to_string()))?;
            let len = len as usize;
            if len < 2 || rest.len() != len + 1 {
                return Err(DrumbotError::Protocol(format!(
                    "length byte {} does not match {} payload bytes",
                    len,
                    rest.len().saturating_sub(1)
                )));
            }
            let message = Message {
                id: rest[0],
                ctrl: rest[1],
                params: rest[2..len].to_vec(),
            };
            let expected = message.checksum();
            if rest[len] != expected {
                return Err(DrumbotError::Protocol(format!(
                    "checksum mismatch: got {:#04x}, expected {:#04x}",
                    rest[len], expected
                )));
            }
            Ok(message)
        }

        pub fn decode(frame: &[u8]) -> Result<Self, DrumbotError> {
            match frame.strip_prefix(&HEADER[..]) {
                Some(body) => Self::decode_body(body),
                None => Err(DrumbotError::Protocol("missing AA AA header".to_string())),
            }
        }

        /// Queue index answered by a queued command.
        pub fn queued_index(&self) -> Result<u64, DrumbotError> {
            let bytes: [u8; 8] = self
                .params
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| DrumbotError::Protocol(format!("expected queue index, got {} bytes", self.params.len())))?;
            Ok(u64::from_le_bytes(bytes))
        }

        /// Cartesian pose from a GetPose answer (x, y, z, r then joint angles).
        pub fn pose(&self) -> Result<Pose, DrumbotError> {
            if self.params.len() < 16 {
                return Err(DrumbotError::Protocol(format!(
                    "expected pose, got {} bytes",
                    self.params.len()
                )));
            }
            let f = |i: usize| {
                let mut b = [0u8; 4];
                b.copy_from_slice(&self.params[i * 4..i * 4 + 4]);
                f32::from_le_bytes(b) as f64
            };
            Ok(Pose::new(f(0), f(1), f(2), f(3)))
        }
    }

    fn floats(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| (*v as f32).to_le_bytes()).collect()
    }
}

/// Request/response exchange over any byte stream.
pub(crate) struct DobotLink<T> {
    io: T,
}

impl<T: Read + Write> DobotLink<T> {
    pub(crate) fn new(io: T) -> Self {
        Self { io }
    }

    pub(crate) fn send(&mut self, message: &Message) -> Result<Message, DrumbotError> {
        self.io.write_all(&message.encode())?;
        self.io.flush()?;
        let reply = self.read_frame()?;
        if reply.id != message.id {
            return Err(DrumbotError::Protocol(format!(
                "reply to command {} carried id {}",
                message.id, reply.id
            )));
        }
        Ok(reply)
    }

    fn read_frame(&mut self) -> Result<Message, DrumbotError> {
        let mut byte = [0u8; 1];
        // Resynchronise on the header: the first byte after a run of at least
        // two 0xAA is the length.
        let mut header_run = 0usize;
        let len_byte = loop {
            self.io.read_exact(&mut byte)?;
            match byte[0] {
                b if b == HEADER[0] => header_run += 1,
                b if header_run >= 2 => break b,
                _ => header_run = 0,
            }
        };
        let len = len_byte as usize;
        let mut body = vec![0u8; len + 2];
        body[0] = len_byte;
        self.io.read_exact(&mut body[1..])?;
        Message::decode_body(&body)
    }
}

const QUEUE_POLL: Duration = Duration::from_millis(10);
const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_secs(10);
const SERIAL_TIMEOUT: Duration = Duration::from_millis(500);

pub struct DobotDriver {
    track: TrackName,
    link: Option<DobotLink<Box<dyn serialport::SerialPort>>>,
    move_timeout: Duration,
}

impl DobotDriver {
    pub fn new(track: TrackName) -> Self {
        Self {
            track,
            link: None,
            move_timeout: DEFAULT_MOVE_TIMEOUT,
        }
    }

    pub fn with_move_timeout(mut self, timeout: Duration) -> Self {
        self.move_timeout = timeout;
        self
    }

    fn link(&mut self) -> Result<&mut DobotLink<Box<dyn serialport::SerialPort>>, DrumbotError> {
        let track = self.track;
        self.link.as_mut().ok_or_else(|| DrumbotError::Hardware {
            track,
            message: "not connected".to_string(),
        })
    }

    fn send(&mut self, message: Message) -> Result<Message, DrumbotError> {
        let track = self.track;
        self.link()?.send(&message).map_err(|e| match e {
            DrumbotError::Io(io) => DrumbotError::Hardware {
                track,
                message: io.to_string(),
            },
            other => other,
        })
    }

    fn wait_for_index(&mut self, target: u64) -> Result<(), DrumbotError> {
        let started = Instant::now();
        loop {
            let current = self.send(Message::get_queued_index())?.queued_index()?;
            if current >= target {
                return Ok(());
            }
            if started.elapsed() > self.move_timeout {
                return Err(DrumbotError::Hardware {
                    track: self.track,
                    message: format!("move {} not reached after {:?} (queue at {})", target, self.move_timeout, current),
                });
            }
            thread::sleep(QUEUE_POLL);
        }
    }
}

impl ActuatorDriver for DobotDriver {
    fn connect(&mut self, port: &str) -> Result<(), DrumbotError> {
        let serial = serialport::new(port, protocol::BAUD_RATE)
            .timeout(SERIAL_TIMEOUT)
            .open()
            .map_err(|e| DrumbotError::Connection {
                port: port.to_string(),
                message: e.to_string(),
            })?;
        self.link = Some(DobotLink::new(serial));
        self.send(Message::clear_queue())?;
        self.send(Message::start_queue())?;
        let pose = self.current_pose()?;
        info!(track = %self.track, port, x = pose.x, y = pose.y, z = pose.z, "dobot connected");
        Ok(())
    }

    fn set_speed(&mut self, velocity: f64, acceleration: f64) -> Result<(), DrumbotError> {
        self.send(Message::common_params(velocity, acceleration))?;
        self.send(Message::coordinate_params(velocity, acceleration))?;
        Ok(())
    }

    fn move_to(&mut self, pose: Pose, blocking: bool) -> Result<(), DrumbotError> {
        let index = self.send(Message::ptp_move(pose))?.queued_index()?;
        debug!(track = %self.track, index, blocking, "dobot move queued");
        if blocking {
            self.wait_for_index(index)?;
        }
        Ok(())
    }

    fn current_pose(&mut self) -> Result<Pose, DrumbotError> {
        self.send(Message::get_pose())?.pose()
    }

    fn disconnect(&mut self) -> Result<(), DrumbotError> {
        // Dropping the port closes it.
        if self.link.take().is_some() {
            info!(track = %self.track, "dobot disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DobotFactory {
    move_timeout: Option<Duration>,
}

impl DobotFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_move_timeout(mut self, timeout: Duration) -> Self {
        self.move_timeout = Some(timeout);
        self
    }
}

impl DriverFactory for DobotFactory {
    fn create(&self, track: TrackName) -> Box<dyn ActuatorDriver> {
        let driver = DobotDriver::new(track);
        Box::new(match self.move_timeout {
            Some(timeout) => driver.with_move_timeout(timeout),
            None => driver,
        })
    }
}
