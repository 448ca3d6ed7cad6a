//! Request dispatch
//!
//! A [`Node`] owns its receiver, configuration and actuators. Bytes from
//! the bus go in through [`Node::receive`]; when they complete a request
//! for this node, the wire form of the reply (if the command has one)
//! comes out.

use heapless::Vec;
use tiny485_hal::ConfigStorage;
use tiny485_protocol::frame::MAX_REPLY_WIRE_SIZE;
use tiny485_protocol::{
    encode_reply, opcode, Command, CommandError, Reply, RequestDecoder, ServoReport,
    StepperReport, MAX_REQUEST_SIZE,
};

use crate::config::NodeConfig;
use crate::stepper::Stepper;

/// Reply payload buffer (large enough for a loopback echo)
pub type ReplyPayload = Vec<u8, MAX_REQUEST_SIZE>;

/// One servo/stepper node
#[derive(Debug, Clone)]
pub struct Node<S: ConfigStorage> {
    config: NodeConfig,
    rx: RequestDecoder,
    stepper: Stepper,
    storage: S,
    loopback: bool,
}

impl<S: ConfigStorage> Node<S> {
    /// Boot a node from its stored configuration
    ///
    /// Missing or corrupt images fall back to the default configuration.
    /// The stepper starts homing immediately, as on power-up.
    pub fn new(mut storage: S) -> Self {
        let config = NodeConfig::load_or_default(&mut storage);
        Self::with_config(config, storage)
    }

    /// Boot a node with an explicit configuration
    pub fn with_config(config: NodeConfig, storage: S) -> Self {
        let mut stepper = Stepper::new();
        stepper.start(&config.stepper);
        Self {
            rx: RequestDecoder::new(config.node_addr),
            config,
            stepper,
            storage,
            loopback: false,
        }
    }

    /// Echo payloads with unknown opcodes back verbatim
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    pub fn address(&self) -> u8 {
        self.config.node_addr
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn stepper(&self) -> &Stepper {
        &self.stepper
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Advance the stepper by one timer period
    pub fn tick(&mut self) {
        self.stepper.tick(&self.config.stepper);
    }

    /// Feed one byte from the bus
    ///
    /// Returns the framed reply once a request for this node completes.
    pub fn receive(&mut self, byte: u8) -> Option<Vec<u8, MAX_REPLY_WIRE_SIZE>> {
        let request = self.rx.feed(byte)?;
        let reply = self.handle(&request)?;
        encode_reply(&reply).ok()
    }

    /// Execute one request payload and build the reply payload
    pub fn handle(&mut self, payload: &[u8]) -> Option<ReplyPayload> {
        let command = match Command::parse(payload) {
            Ok(command) => command,
            Err(CommandError::UnknownOpcode(_)) if self.loopback => {
                return Vec::from_slice(payload).ok();
            }
            Err(_) => return None,
        };

        let me = self.config.node_addr;
        match command {
            Command::Ping { node } => {
                if node != me {
                    return None;
                }
                respond(Reply::Pong { node: me })
            }
            Command::SetAddress { old, new } => {
                if old != me {
                    return None;
                }
                self.config.node_addr = new;
                self.rx.set_address(new);
                respond(ack(me, opcode::SET_ADDRESS))
            }
            Command::SaveConfig => {
                self.config.save(&mut self.storage).ok()?;
                respond(ack(me, opcode::SAVE_CONFIG))
            }
            Command::SetServo(settings) => {
                self.config.servo.pwm1 = settings.servo1_us;
                if let Some(pwm2) = settings.servo2_us {
                    self.config.servo.pwm2 = pwm2;
                }
                if let Some(period) = settings.period_minus_one {
                    self.config.servo.period_minus_one = period;
                }
                None
            }
            Command::QueryServo => respond(Reply::Servo(ServoReport {
                node: me,
                servo1_us: self.config.servo.pwm1,
                servo2_us: self.config.servo.pwm2,
                period_minus_one: self.config.servo.period_minus_one,
            })),
            Command::StepperGoto { position } => {
                self.stepper.goto(position, &self.config.stepper);
                None
            }
            Command::StepperZero { steps } => {
                self.stepper.zero(steps);
                respond(ack(me, opcode::STEPPER_ZERO))
            }
            Command::StepperOff => {
                self.stepper.off();
                respond(ack(me, opcode::STEPPER_OFF))
            }
            Command::StepperGet => respond(Reply::Stepper(StepperReport {
                node: me,
                position: self.stepper.position(),
                target: self.stepper.target(),
            })),
        }
    }
}

fn ack(node: u8, opcode: u8) -> Reply {
    Reply::Ack { node, opcode }
}

fn respond(reply: Reply) -> Option<ReplyPayload> {
    let payload = reply.to_payload().ok()?;
    Vec::from_slice(&payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServoConfig, DEFAULT_NODE_ADDRESS};
    use crate::stepper::StepperState;
    use crate::storage::RamStorage;
    use tiny485_protocol::{encode_request, ReplyDecoder, ServoSettings};

    fn node() -> Node<RamStorage> {
        Node::new(RamStorage::new())
    }

    fn payload(cmd: Command) -> std::vec::Vec<u8> {
        cmd.to_payload().unwrap().to_vec()
    }

    #[test]
    fn test_boots_with_defaults() {
        let node = node();
        assert_eq!(node.address(), DEFAULT_NODE_ADDRESS);
        assert_eq!(node.stepper().state(), StepperState::Zeroing);
    }

    #[test]
    fn test_boots_from_stored_config() {
        let mut storage = RamStorage::new();
        NodeConfig::with_address(0x07).save(&mut storage).unwrap();
        assert_eq!(Node::new(storage).address(), 0x07);
    }

    #[test]
    fn test_ping() {
        let mut node = node();
        let reply = node.handle(&payload(Command::Ping { node: 0x40 })).unwrap();
        assert_eq!(&reply[..], &[b'P', 0x40, 0xBF]);
        assert!(node.handle(&payload(Command::Ping { node: 0x41 })).is_none());
    }

    #[test]
    fn test_set_address_acks_from_old_address() {
        let mut node = node();
        let reply = node
            .handle(&payload(Command::SetAddress { old: 0x40, new: 0x22 }))
            .unwrap();
        assert_eq!(&reply[..], &[0x40, b'A']);
        assert_eq!(node.address(), 0x22);

        // stale old address no longer matches
        assert!(node
            .handle(&payload(Command::SetAddress { old: 0x40, new: 0x30 }))
            .is_none());
        assert_eq!(node.address(), 0x22);
    }

    #[test]
    fn test_save_config_persists() {
        let mut node = node();
        node.handle(&payload(Command::SetServo(
            ServoSettings::from_values(&[1100, 1900, 10000]).unwrap(),
        )));
        let reply = node.handle(&payload(Command::SaveConfig)).unwrap();
        assert_eq!(&reply[..], &[0x40, b'C']);
        assert_eq!(node.storage().writes(), 1);

        let stored = NodeConfig::from_image(node.storage().image().unwrap()).unwrap();
        assert_eq!(
            stored.servo,
            ServoConfig {
                pwm1: 1100,
                pwm2: 1900,
                period_minus_one: 9999,
            }
        );
    }

    #[test]
    fn test_set_servo_partial_keeps_other_fields() {
        let mut node = node();
        let reply = node.handle(&payload(Command::SetServo(
            ServoSettings::from_values(&[1234]).unwrap(),
        )));
        assert!(reply.is_none());
        assert_eq!(node.config().servo.pwm1, 1234);
        assert_eq!(node.config().servo.pwm2, ServoConfig::default().pwm2);

        let reply = node.handle(&payload(Command::QueryServo)).unwrap();
        assert_eq!(
            Command::QueryServo.match_reply(0x40, &reply),
            Ok(Reply::Servo(ServoReport {
                node: 0x40,
                servo1_us: 1234,
                servo2_us: 1500,
                period_minus_one: 19_999,
            }))
        );
    }

    #[test]
    fn test_stepper_commands() {
        let mut node = node();
        let reply = node
            .handle(&payload(Command::StepperZero { steps: 50 }))
            .unwrap();
        assert_eq!(&reply[..], &[0x40, b'Z']);
        for _ in 0..1000 {
            node.tick();
        }
        assert_eq!(node.stepper().position(), 0);

        assert!(node
            .handle(&payload(Command::StepperGoto { position: 400 }))
            .is_none());
        for _ in 0..1000 {
            node.tick();
        }

        let reply = node.handle(&payload(Command::StepperGet)).unwrap();
        assert_eq!(
            Command::StepperGet.match_reply(0x40, &reply),
            Ok(Reply::Stepper(StepperReport {
                node: 0x40,
                position: 400,
                target: 400,
            }))
        );

        let reply = node.handle(&payload(Command::StepperOff)).unwrap();
        assert_eq!(&reply[..], &[0x40, b'O']);
        assert_eq!(node.stepper().state(), StepperState::Off);
    }

    #[test]
    fn test_loopback_echo() {
        let mut plain = node();
        assert!(plain.handle(&[0x01, 0xAA, 0x02]).is_none());

        let mut echo = node().with_loopback(true);
        let reply = echo.handle(&[0x01, 0xAA, 0x02]).unwrap();
        assert_eq!(&reply[..], &[0x01, 0xAA, 0x02]);

        // malformed known opcodes are still dropped
        assert!(echo.handle(b"Cx").is_none());
    }

    #[test]
    fn test_receive_over_the_wire() {
        let mut node = node();
        let wire = encode_request(0x40, &payload(Command::Ping { node: 0x40 })).unwrap();

        let mut replies = std::vec::Vec::new();
        for &b in wire.iter() {
            replies.extend(node.receive(b));
        }
        assert_eq!(replies.len(), 1);

        let mut decoder = ReplyDecoder::new();
        let frame = replies[0]
            .iter()
            .find_map(|&b| decoder.feed(b).frame)
            .unwrap();
        assert_eq!(frame, [b'P', 0x40, 0xBF]);
    }
}
