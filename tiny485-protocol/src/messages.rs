//! Command and reply types
//!
//! A request payload starts with a one-byte ASCII opcode followed by
//! fixed-width little-endian fields. Reply shapes depend on the opcode:
//! - Ping: `['P', node, !node]`
//! - Acknowledgement: `[node, opcode]`
//! - Servo query: `[node, 'Q', servo1:u16, servo2:u16, period-1:u16]`
//! - Stepper position: `[node, 'E', position:u16, target:u16]`

use heapless::Vec;

use crate::frame::FrameError;
use crate::request::MAX_REQUEST_SIZE;

/// Opcode bytes
pub mod opcode {
    /// Ping: address echo + complement
    pub const PING: u8 = b'P';
    /// Set node address
    pub const SET_ADDRESS: u8 = b'A';
    /// Save configuration to non-volatile storage
    pub const SAVE_CONFIG: u8 = b'C';
    /// Set servo outputs
    pub const SET_SERVO: u8 = b'S';
    /// Query servo configuration
    pub const QUERY_SERVO: u8 = b'Q';
    /// Stepper: go to absolute position
    pub const STEPPER_GOTO: u8 = b'G';
    /// Stepper: zero against the end stop
    pub const STEPPER_ZERO: u8 = b'Z';
    /// Stepper: coils off
    pub const STEPPER_OFF: u8 = b'O';
    /// Stepper: get encoder position
    pub const STEPPER_GET: u8 = b'E';
}

/// Largest reply payload defined by the command set
pub const MAX_REPLY_SIZE: usize = 8;

/// Errors decoding or building a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Empty payload
    Empty,
    /// Opcode not part of the command set
    UnknownOpcode(u8),
    /// Payload length does not fit the opcode
    BadLength { opcode: u8, len: usize },
    /// Complement field does not match its value
    ComplementMismatch,
    /// Servo command needs one to three fields
    ServoFieldCount(usize),
    /// Servo period must be at least 1 µs
    ZeroPeriod,
}

/// Servo output settings as sent with `S`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoSettings {
    /// Pulse width of output 1 in µs
    pub servo1_us: u16,
    /// Pulse width of output 2 in µs
    pub servo2_us: Option<u16>,
    /// PWM period minus one, in µs (only sent together with `servo2_us`)
    pub period_minus_one: Option<u16>,
}

impl ServoSettings {
    /// Build settings from user values `[servo1, servo2, period]`
    ///
    /// The period is given in µs and stored as `period - 1`.
    pub fn from_values(values: &[u16]) -> Result<Self, CommandError> {
        match *values {
            [servo1_us] => Ok(Self {
                servo1_us,
                servo2_us: None,
                period_minus_one: None,
            }),
            [servo1_us, servo2_us] => Ok(Self {
                servo1_us,
                servo2_us: Some(servo2_us),
                period_minus_one: None,
            }),
            [servo1_us, servo2_us, period] => {
                let period_minus_one = period.checked_sub(1).ok_or(CommandError::ZeroPeriod)?;
                Ok(Self {
                    servo1_us,
                    servo2_us: Some(servo2_us),
                    period_minus_one: Some(period_minus_one),
                })
            }
            _ => Err(CommandError::ServoFieldCount(values.len())),
        }
    }
}

/// Commands understood by the nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Liveness check; the node echoes its address and the complement
    Ping { node: u8 },
    /// Move a node from `old` to `new` address
    SetAddress { old: u8, new: u8 },
    /// Persist the current configuration
    SaveConfig,
    /// Set servo outputs
    SetServo(ServoSettings),
    /// Report servo configuration
    QueryServo,
    /// Move the stepper to an absolute position
    StepperGoto { position: u16 },
    /// Home the stepper, driving up to `steps` towards the end stop
    StepperZero { steps: u16 },
    /// Switch stepper coils off
    StepperOff,
    /// Report stepper position and target
    StepperGet,
}

/// Reply shape expected for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyKind {
    /// Fire and forget
    None,
    /// `['P', node, !node]`
    Pong,
    /// `[node, opcode]`
    Ack,
    /// Servo query reply
    Servo,
    /// Stepper position reply
    Stepper,
}

struct PayloadWriter {
    buf: [u8; MAX_REQUEST_SIZE],
    len: usize,
}

impl PayloadWriter {
    fn new(first: u8) -> Self {
        let mut buf = [0u8; MAX_REQUEST_SIZE];
        buf[0] = first;
        Self { buf, len: 1 }
    }

    fn u8(&mut self, v: u8) -> &mut Self {
        self.buf[self.len] = v;
        self.len += 1;
        self
    }

    fn u16(&mut self, v: u16) -> &mut Self {
        let [lo, hi] = v.to_le_bytes();
        self.u8(lo).u8(hi)
    }

    fn finish<const N: usize>(&self) -> Result<Vec<u8, N>, FrameError> {
        Vec::from_slice(&self.buf[..self.len]).map_err(|_| FrameError::PayloadTooLarge)
    }
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

impl Command {
    /// Opcode byte
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Ping { .. } => opcode::PING,
            Command::SetAddress { .. } => opcode::SET_ADDRESS,
            Command::SaveConfig => opcode::SAVE_CONFIG,
            Command::SetServo(_) => opcode::SET_SERVO,
            Command::QueryServo => opcode::QUERY_SERVO,
            Command::StepperGoto { .. } => opcode::STEPPER_GOTO,
            Command::StepperZero { .. } => opcode::STEPPER_ZERO,
            Command::StepperOff => opcode::STEPPER_OFF,
            Command::StepperGet => opcode::STEPPER_GET,
        }
    }

    /// Reply the addressed node sends back
    pub fn expected_reply(&self) -> ReplyKind {
        match self {
            Command::Ping { .. } => ReplyKind::Pong,
            Command::SetAddress { .. }
            | Command::SaveConfig
            | Command::StepperZero { .. }
            | Command::StepperOff => ReplyKind::Ack,
            Command::QueryServo => ReplyKind::Servo,
            Command::StepperGet => ReplyKind::Stepper,
            Command::SetServo(_) | Command::StepperGoto { .. } => ReplyKind::None,
        }
    }

    /// Encode into a request payload (before escaping)
    pub fn to_payload(&self) -> Result<Vec<u8, MAX_REQUEST_SIZE>, FrameError> {
        let mut w = PayloadWriter::new(self.opcode());
        match *self {
            Command::Ping { node } => {
                w.u8(node).u8(!node);
            }
            Command::SetAddress { old, new } => {
                w.u8(old ^ 0xFF).u8(new).u8(new ^ 0xFF);
            }
            Command::SetServo(s) => {
                w.u16(s.servo1_us);
                if let Some(servo2) = s.servo2_us {
                    w.u16(servo2);
                    if let Some(period) = s.period_minus_one {
                        w.u16(period);
                    }
                }
            }
            Command::StepperGoto { position } => {
                w.u16(position);
            }
            Command::StepperZero { steps } => {
                w.u16(steps);
            }
            Command::SaveConfig
            | Command::QueryServo
            | Command::StepperOff
            | Command::StepperGet => {}
        }
        w.finish()
    }

    /// Parse a request payload
    ///
    /// Field consistency (complements) is checked; whether the request
    /// applies to a particular node is left to the node.
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        let (&op, fields) = payload.split_first().ok_or(CommandError::Empty)?;
        let bad_length = CommandError::BadLength {
            opcode: op,
            len: payload.len(),
        };

        match op {
            opcode::PING => match *fields {
                [node, complement] if complement == !node => Ok(Command::Ping { node }),
                [_, _] => Err(CommandError::ComplementMismatch),
                _ => Err(bad_length),
            },
            opcode::SET_ADDRESS => match *fields {
                [old_complement, new, new_complement] if new_complement == new ^ 0xFF => {
                    Ok(Command::SetAddress {
                        old: old_complement ^ 0xFF,
                        new,
                    })
                }
                [_, _, _] => Err(CommandError::ComplementMismatch),
                _ => Err(bad_length),
            },
            opcode::SET_SERVO => {
                let values: Vec<u16, 3> = match fields.len() {
                    2 | 4 | 6 => fields
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .collect(),
                    _ => return Err(bad_length),
                };
                Ok(Command::SetServo(ServoSettings {
                    servo1_us: values[0],
                    servo2_us: values.get(1).copied(),
                    period_minus_one: values.get(2).copied(),
                }))
            }
            opcode::STEPPER_GOTO | opcode::STEPPER_ZERO => {
                if fields.len() != 2 {
                    return Err(bad_length);
                }
                let value = le16(fields, 0);
                Ok(if op == opcode::STEPPER_GOTO {
                    Command::StepperGoto { position: value }
                } else {
                    Command::StepperZero { steps: value }
                })
            }
            opcode::SAVE_CONFIG | opcode::QUERY_SERVO | opcode::STEPPER_OFF | opcode::STEPPER_GET => {
                if !fields.is_empty() {
                    return Err(bad_length);
                }
                Ok(match op {
                    opcode::SAVE_CONFIG => Command::SaveConfig,
                    opcode::QUERY_SERVO => Command::QueryServo,
                    opcode::STEPPER_OFF => Command::StepperOff,
                    _ => Command::StepperGet,
                })
            }
            other => Err(CommandError::UnknownOpcode(other)),
        }
    }

    /// Check a received frame against this command sent to `node`
    ///
    /// Returns the decoded reply when the frame has the expected shape and
    /// echoes the right identifiers.
    pub fn match_reply(&self, node: u8, frame: &[u8]) -> Result<Reply, ReplyError> {
        match self.expected_reply() {
            ReplyKind::None => Err(ReplyError::Unexpected),
            ReplyKind::Pong => {
                expect_len(frame, 3)?;
                if frame[0] != opcode::PING {
                    return Err(ReplyError::WrongOpcode(frame[0]));
                }
                if frame[1] != node {
                    return Err(ReplyError::WrongNode(frame[1]));
                }
                if frame[2] != !node {
                    return Err(ReplyError::BadComplement(frame[2]));
                }
                Ok(Reply::Pong { node })
            }
            ReplyKind::Ack => {
                expect_len(frame, 2)?;
                check_header(frame, node, self.opcode())?;
                Ok(Reply::Ack {
                    node,
                    opcode: self.opcode(),
                })
            }
            ReplyKind::Servo => {
                expect_len(frame, 8)?;
                check_header(frame, node, self.opcode())?;
                Ok(Reply::Servo(ServoReport {
                    node,
                    servo1_us: le16(frame, 2),
                    servo2_us: le16(frame, 4),
                    period_minus_one: le16(frame, 6),
                }))
            }
            ReplyKind::Stepper => {
                expect_len(frame, 6)?;
                check_header(frame, node, self.opcode())?;
                Ok(Reply::Stepper(StepperReport {
                    node,
                    position: le16(frame, 2),
                    target: le16(frame, 4),
                }))
            }
        }
    }
}

fn expect_len(frame: &[u8], expected: usize) -> Result<(), ReplyError> {
    if frame.len() != expected {
        return Err(ReplyError::WrongLength {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

fn check_header(frame: &[u8], node: u8, op: u8) -> Result<(), ReplyError> {
    if frame[0] != node {
        return Err(ReplyError::WrongNode(frame[0]));
    }
    if frame[1] != op {
        return Err(ReplyError::WrongOpcode(frame[1]));
    }
    Ok(())
}

/// Returns true if `frame` is the ping reply of node `addr`
pub fn validate_ping_reply(addr: u8, frame: &[u8]) -> bool {
    Command::Ping { node: addr }.match_reply(addr, frame).is_ok()
}

/// Why a received frame does not answer the outstanding request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyError {
    /// Frame length does not match the reply shape
    WrongLength { expected: usize, actual: usize },
    /// Echoed opcode differs
    WrongOpcode(u8),
    /// Echoed node address differs
    WrongNode(u8),
    /// Ping complement differs
    BadComplement(u8),
    /// The command does not produce a reply
    Unexpected,
}

/// Servo configuration as reported by `Q`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoReport {
    pub node: u8,
    pub servo1_us: u16,
    pub servo2_us: u16,
    pub period_minus_one: u16,
}

impl ServoReport {
    /// PWM period in µs
    pub fn period_us(&self) -> u32 {
        u32::from(self.period_minus_one) + 1
    }
}

/// Stepper state as reported by `E`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepperReport {
    pub node: u8,
    pub position: u16,
    pub target: u16,
}

/// Decoded replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    Pong { node: u8 },
    Ack { node: u8, opcode: u8 },
    Servo(ServoReport),
    Stepper(StepperReport),
}

impl Reply {
    /// Encode into a reply payload (before escaping)
    pub fn to_payload(&self) -> Result<Vec<u8, MAX_REPLY_SIZE>, FrameError> {
        match *self {
            Reply::Pong { node } => Vec::from_slice(&[opcode::PING, node, !node])
                .map_err(|_| FrameError::PayloadTooLarge),
            Reply::Ack { node, opcode } => {
                Vec::from_slice(&[node, opcode]).map_err(|_| FrameError::PayloadTooLarge)
            }
            Reply::Servo(r) => {
                let mut w = PayloadWriter::new(r.node);
                w.u8(opcode::QUERY_SERVO)
                    .u16(r.servo1_us)
                    .u16(r.servo2_us)
                    .u16(r.period_minus_one);
                w.finish()
            }
            Reply::Stepper(r) => {
                let mut w = PayloadWriter::new(r.node);
                w.u8(opcode::STEPPER_GET).u16(r.position).u16(r.target);
                w.finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_payload() {
        let payload = Command::Ping { node: 0x40 }.to_payload().unwrap();
        assert_eq!(&payload[..], &[b'P', 0x40, 0xBF]);
    }

    #[test]
    fn test_set_address_payload() {
        let payload = Command::SetAddress { old: 0x40, new: 0x22 }
            .to_payload()
            .unwrap();
        assert_eq!(&payload[..], &[b'A', 0xBF, 0x22, 0xDD]);
    }

    #[test]
    fn test_set_servo_full_payload() {
        let settings = ServoSettings::from_values(&[1500, 1500, 20000]).unwrap();
        let payload = Command::SetServo(settings).to_payload().unwrap();
        let mut expected = std::vec![b'S'];
        expected.extend_from_slice(&1500u16.to_le_bytes());
        expected.extend_from_slice(&1500u16.to_le_bytes());
        expected.extend_from_slice(&19999u16.to_le_bytes());
        assert_eq!(&payload[..], &expected[..]);
    }

    #[test]
    fn test_set_servo_partial_payloads() {
        let one = ServoSettings::from_values(&[1000]).unwrap();
        assert_eq!(
            &Command::SetServo(one).to_payload().unwrap()[..],
            &[b'S', 0xE8, 0x03]
        );

        let two = ServoSettings::from_values(&[1000, 2000]).unwrap();
        assert_eq!(
            &Command::SetServo(two).to_payload().unwrap()[..],
            &[b'S', 0xE8, 0x03, 0xD0, 0x07]
        );
    }

    #[test]
    fn test_servo_settings_rejects_bad_input() {
        assert_eq!(
            ServoSettings::from_values(&[]),
            Err(CommandError::ServoFieldCount(0))
        );
        assert_eq!(
            ServoSettings::from_values(&[1, 2, 3, 4]),
            Err(CommandError::ServoFieldCount(4))
        );
        assert_eq!(
            ServoSettings::from_values(&[1500, 1500, 0]),
            Err(CommandError::ZeroPeriod)
        );
    }

    #[test]
    fn test_parse_commands() {
        let commands = [
            Command::Ping { node: 7 },
            Command::SetAddress { old: 0x40, new: 0x41 },
            Command::SaveConfig,
            Command::SetServo(ServoSettings::from_values(&[1200, 1800, 20000]).unwrap()),
            Command::QueryServo,
            Command::StepperGoto { position: 300 },
            Command::StepperZero { steps: 1200 },
            Command::StepperOff,
            Command::StepperGet,
        ];
        for cmd in commands {
            let payload = cmd.to_payload().unwrap();
            assert_eq!(Command::parse(&payload), Ok(cmd));
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(Command::parse(&[]), Err(CommandError::Empty));
        assert_eq!(Command::parse(&[0x01]), Err(CommandError::UnknownOpcode(0x01)));
        assert_eq!(
            Command::parse(&[b'P', 0x40, 0x40]),
            Err(CommandError::ComplementMismatch)
        );
        assert_eq!(
            Command::parse(&[b'A', 0xBF, 0x22, 0x22]),
            Err(CommandError::ComplementMismatch)
        );
        assert_eq!(
            Command::parse(&[b'S', 0x01]),
            Err(CommandError::BadLength { opcode: b'S', len: 2 })
        );
        assert_eq!(
            Command::parse(b"Cx"),
            Err(CommandError::BadLength { opcode: b'C', len: 2 })
        );
    }

    #[test]
    fn test_validate_ping_reply_all_addresses() {
        for addr in 0..=255u8 {
            assert!(validate_ping_reply(addr, &[0x50, addr, !addr]));
            assert!(!validate_ping_reply(addr, &[0x50, addr, addr]));
            assert!(!validate_ping_reply(addr, &[0x51, addr, !addr]));
            assert!(!validate_ping_reply(addr, &[0x50, addr.wrapping_add(1), !addr]));
            assert!(!validate_ping_reply(addr, &[0x50, addr]));
            assert!(!validate_ping_reply(addr, &[0x50, addr, !addr, 0]));
        }
    }

    #[test]
    fn test_ack_matching() {
        let cmd = Command::SaveConfig;
        assert_eq!(
            cmd.match_reply(0x40, &[0x40, b'C']),
            Ok(Reply::Ack { node: 0x40, opcode: b'C' })
        );
        assert_eq!(
            cmd.match_reply(0x40, &[0x41, b'C']),
            Err(ReplyError::WrongNode(0x41))
        );
        assert_eq!(
            cmd.match_reply(0x40, &[0x40, b'O']),
            Err(ReplyError::WrongOpcode(b'O'))
        );
        assert_eq!(
            cmd.match_reply(0x40, &[0x40, b'C', 0]),
            Err(ReplyError::WrongLength { expected: 2, actual: 3 })
        );
    }

    #[test]
    fn test_servo_reply() {
        let report = ServoReport {
            node: 0x40,
            servo1_us: 1500,
            servo2_us: 1250,
            period_minus_one: 19999,
        };
        let payload = Reply::Servo(report).to_payload().unwrap();
        assert_eq!(payload.len(), 8);
        assert_eq!(
            Command::QueryServo.match_reply(0x40, &payload),
            Ok(Reply::Servo(report))
        );
        assert_eq!(report.period_us(), 20000);
    }

    #[test]
    fn test_stepper_reply() {
        let report = StepperReport {
            node: 0x41,
            position: 120,
            target: 400,
        };
        let payload = Reply::Stepper(report).to_payload().unwrap();
        assert_eq!(&payload[..], &[0x41, b'E', 120, 0, 0x90, 0x01]);
        assert_eq!(
            Command::StepperGet.match_reply(0x41, &payload),
            Ok(Reply::Stepper(report))
        );
    }

    #[test]
    fn test_fire_and_forget_commands() {
        let goto = Command::StepperGoto { position: 10 };
        assert_eq!(goto.expected_reply(), ReplyKind::None);
        assert_eq!(goto.match_reply(0x40, &[0x40, b'G']), Err(ReplyError::Unexpected));
    }
}
