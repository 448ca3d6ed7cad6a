//! Command round trips
//!
//! Every request follows the same pattern: transmit, then poll until a
//! frame answers it or the deadline passes. Frames that do not answer the
//! request are logged and skipped. There are no retries at this layer.

use std::io;
use std::time::Duration;

use tiny485_hal::BusTransport;
use tiny485_protocol::{
    Command, Reply, ReplyKind, ServoReport, ServoSettings, StepperReport,
};
use tracing::{debug, warn};

use crate::bus::Bus;
use crate::deadline::Deadline;
use crate::error::ClientError;

/// Default time a node gets to answer a command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// Send `command` to `node` and wait for its reply
///
/// Returns `Ok(None)` for commands that have no reply.
pub fn request<T>(
    bus: &mut Bus<T>,
    node: u8,
    command: &Command,
    timeout: Duration,
) -> Result<Option<Reply>, ClientError>
where
    T: BusTransport<Error = io::Error>,
{
    bus.send(node, command)?;
    if command.expected_reply() == ReplyKind::None {
        return Ok(None);
    }

    let deadline = Deadline::after(timeout);
    while !deadline.expired() {
        let Some(frame) = bus.poll()? else {
            continue;
        };
        match command.match_reply(node, &frame) {
            Ok(reply) => {
                debug!(node, ?reply, elapsed_ms = deadline.elapsed().as_millis(), "reply");
                return Ok(Some(reply));
            }
            Err(e) => {
                warn!(node, error = ?e, "invalid answer {}", hex::encode(frame.as_bytes()));
            }
        }
    }

    Err(ClientError::Timeout {
        node,
        opcode: command.opcode(),
        timeout_ms: timeout.as_millis(),
    })
}

/// Typed commands for one node
pub struct NodeClient<'a, T> {
    bus: &'a mut Bus<T>,
    node: u8,
    timeout: Duration,
}

impl<'a, T> NodeClient<'a, T>
where
    T: BusTransport<Error = io::Error>,
{
    pub fn new(bus: &'a mut Bus<T>, node: u8) -> Self {
        Self {
            bus,
            node,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Address commands are sent to
    pub fn node(&self) -> u8 {
        self.node
    }

    fn call(&mut self, command: Command) -> Result<Option<Reply>, ClientError> {
        request(self.bus, self.node, &command, self.timeout)
    }

    fn expect_ack(&mut self, command: Command) -> Result<(), ClientError> {
        match self.call(command)? {
            Some(Reply::Ack { .. }) => Ok(()),
            _ => Err(ClientError::UnexpectedReply { node: self.node }),
        }
    }

    /// Check the node is alive
    pub fn ping(&mut self) -> Result<(), ClientError> {
        match self.call(Command::Ping { node: self.node })? {
            Some(Reply::Pong { .. }) => Ok(()),
            _ => Err(ClientError::UnexpectedReply { node: self.node }),
        }
    }

    /// Move the node to `new`; later commands go to the new address
    pub fn set_address(&mut self, new: u8) -> Result<(), ClientError> {
        self.expect_ack(Command::SetAddress {
            old: self.node,
            new,
        })?;
        self.node = new;
        Ok(())
    }

    /// Persist the node's configuration
    pub fn save_config(&mut self) -> Result<(), ClientError> {
        self.expect_ack(Command::SaveConfig)
    }

    /// Set servo outputs from `[servo1, servo2, period]` (1 to 3 values, µs)
    pub fn set_servo(&mut self, values: &[u16]) -> Result<ServoSettings, ClientError> {
        let settings = ServoSettings::from_values(values)?;
        self.call(Command::SetServo(settings))?;
        Ok(settings)
    }

    /// Read back the servo configuration
    pub fn get_servo(&mut self) -> Result<ServoReport, ClientError> {
        match self.call(Command::QueryServo)? {
            Some(Reply::Servo(report)) => Ok(report),
            _ => Err(ClientError::UnexpectedReply { node: self.node }),
        }
    }

    pub fn stepper_goto(&mut self, position: u16) -> Result<(), ClientError> {
        self.call(Command::StepperGoto { position })?;
        Ok(())
    }

    pub fn stepper_zero(&mut self, steps: u16) -> Result<(), ClientError> {
        self.expect_ack(Command::StepperZero { steps })
    }

    pub fn stepper_off(&mut self) -> Result<(), ClientError> {
        self.expect_ack(Command::StepperOff)
    }

    pub fn stepper_get(&mut self) -> Result<StepperReport, ClientError> {
        match self.call(Command::StepperGet)? {
            Some(Reply::Stepper(report)) => Ok(report),
            _ => Err(ClientError::UnexpectedReply { node: self.node }),
        }
    }
}
