//! Link torture test
//!
//! Transmits random payloads to random nodes at a fixed interval and
//! occasionally sprays unframed noise on the wire. One node, the "self"
//! node, runs a loopback fixture that echoes every payload; the harness
//! counts how many of its echoes come back intact.

use std::fmt;
use std::io;
use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use tiny485_hal::BusTransport;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::deadline::Deadline;
use crate::error::BusError;

/// First payload byte; not a command opcode, so nodes in loopback echo it
pub const ECHO_MARKER: u8 = 0x01;

/// Harness parameters
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Time between transmissions
    pub tx_interval: Duration,
    /// Time between statistics reports
    pub report_interval: Duration,
    /// Addresses picked from at random
    pub nodes: RangeInclusive<u8>,
    /// Address of the loopback node
    pub self_node: u8,
    /// Noise is written with probability 1/`noise_one_in` per tick (0 disables)
    pub noise_one_in: u32,
    /// Longest noise burst
    pub max_noise_len: usize,
    /// Longest random tail after [`ECHO_MARKER`]
    pub max_payload_len: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tx_interval: Duration::from_millis(100),
            report_interval: Duration::from_secs(5),
            nodes: 0x40..=0x42,
            self_node: 0x40,
            noise_one_in: 11,
            max_noise_len: 15,
            max_payload_len: 15,
        }
    }
}

/// Round-trip counters; never reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Echoes identical to what was sent
    pub correct: u64,
    /// Frames that differ from what was sent
    pub mismatched: u64,
    /// Transmissions to the self node with no correct echo before the next tick
    pub no_reply: u64,
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Correct Replies:   {}", self.correct)?;
        writeln!(f, "Incorrect Replies: {}", self.mismatched)?;
        write!(f, "No Replies:        {}", self.no_reply)
    }
}

/// Torture test state
pub struct Harness<'a, T, R> {
    bus: &'a mut Bus<T>,
    rng: R,
    config: HarnessConfig,
    stats: LinkStats,
    last_payload: Vec<u8>,
    last_node: u8,
    awaiting_echo: bool,
    echoed: bool,
    tx_timer: Deadline,
    report_timer: Deadline,
}

impl<'a, T, R> Harness<'a, T, R>
where
    T: BusTransport<Error = io::Error>,
    R: Rng,
{
    pub fn new(bus: &'a mut Bus<T>, rng: R, config: HarnessConfig) -> Self {
        Self {
            bus,
            rng,
            tx_timer: Deadline::after(config.tx_interval),
            report_timer: Deadline::after(config.report_interval),
            config,
            stats: LinkStats::default(),
            last_payload: Vec::new(),
            last_node: 0,
            awaiting_echo: false,
            echoed: false,
        }
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Payload of the most recent transmission
    pub fn last_payload(&self) -> &[u8] {
        &self.last_payload
    }

    /// Close out the previous transmission and send the next one
    pub fn tick(&mut self) -> Result<(), BusError> {
        if self.awaiting_echo && !self.echoed {
            warn!("had sent a message, but got no reply");
            self.stats.no_reply += 1;
        }
        self.awaiting_echo = false;
        self.echoed = false;

        self.maybe_write_noise()?;

        let node = self.rng.gen_range(self.config.nodes.clone());
        let tail = self.rng.gen_range(0..=self.config.max_payload_len);
        let mut payload = Vec::with_capacity(1 + tail);
        payload.push(ECHO_MARKER);
        payload.extend((0..tail).map(|_| self.rng.gen::<u8>()));

        self.bus.transmit(node, &payload)?;
        self.last_payload = payload;
        self.last_node = node;
        self.awaiting_echo = node == self.config.self_node;
        Ok(())
    }

    fn maybe_write_noise(&mut self) -> Result<(), BusError> {
        if self.config.noise_one_in == 0 || !self.rng.gen_ratio(1, self.config.noise_one_in) {
            return Ok(());
        }
        let len = self.rng.gen_range(0..=self.config.max_noise_len);
        let noise: Vec<u8> = (0..len).map(|_| self.rng.gen()).collect();
        debug!("writing {} bytes of random junk", noise.len());
        self.bus.write_raw(&noise)
    }

    /// Poll once and classify a received frame
    pub fn service(&mut self) -> Result<(), BusError> {
        let Some(frame) = self.bus.poll()? else {
            return Ok(());
        };

        if frame.as_bytes() == self.last_payload.as_slice() {
            debug!(
                node = self.last_node,
                "message {} read back correctly",
                hex::encode(&self.last_payload)
            );
            self.stats.correct += 1;
            self.echoed = true;
        } else {
            warn!(
                "messages are not equal: sent {} and received {}",
                hex::encode(&self.last_payload),
                hex::encode(frame.as_bytes())
            );
            self.stats.mismatched += 1;
        }
        Ok(())
    }

    /// Log the counters
    pub fn report(&self) {
        info!(
            correct = self.stats.correct,
            mismatched = self.stats.mismatched,
            no_reply = self.stats.no_reply,
            "link statistics"
        );
    }

    /// One pass of the main loop: report, transmit and receive as due
    pub fn step(&mut self) -> Result<(), BusError> {
        if self.report_timer.check() {
            self.report();
        }
        if self.tx_timer.check() {
            self.tick()?;
        }
        self.service()
    }

    /// Run for `limit`, or forever if `None`
    pub fn run(&mut self, limit: Option<Duration>) -> Result<LinkStats, BusError> {
        let end = limit.map(Deadline::after);
        info!(
            interval_ms = self.config.tx_interval.as_millis(),
            self_node = self.config.self_node,
            "torture test started"
        );

        self.tick()?;
        self.tx_timer.restart();
        while !end.as_ref().is_some_and(Deadline::expired) {
            self.step()?;
        }

        self.report();
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn quiet_config() -> HarnessConfig {
        HarnessConfig {
            noise_one_in: 0,
            ..HarnessConfig::default()
        }
    }

    fn loopback_bus() -> Bus<SimBus> {
        Bus::new(
            SimBus::new()
                .with_node_at(0x40, true)
                .with_read_delay(Duration::ZERO),
        )
    }

    #[test]
    fn test_payload_shape() {
        let mut bus = Bus::new(SimBus::new().with_read_delay(Duration::ZERO));
        let mut harness = Harness::new(&mut bus, StdRng::seed_from_u64(1), quiet_config());
        for _ in 0..50 {
            harness.tick().unwrap();
            let payload = harness.last_payload();
            assert_eq!(payload[0], ECHO_MARKER);
            assert!(payload.len() <= 16);
            assert!((0x40..=0x42).contains(&harness.last_node));
        }
    }

    #[test]
    fn test_loopback_counts_correct_echoes() {
        let mut bus = loopback_bus();
        let mut harness = Harness::new(&mut bus, StdRng::seed_from_u64(7), quiet_config());

        let mut to_self = 0;
        for _ in 0..100 {
            harness.tick().unwrap();
            if harness.last_node == 0x40 {
                to_self += 1;
            }
            harness.service().unwrap();
        }

        let stats = harness.stats();
        assert!(to_self > 0);
        assert_eq!(stats.correct, to_self);
        assert_eq!(stats.mismatched, 0);
        assert_eq!(stats.no_reply, 0);
    }

    #[test]
    fn test_missing_echo_counted_on_next_tick() {
        // nothing answers at 0x40
        let mut bus = Bus::new(SimBus::new().with_read_delay(Duration::ZERO));
        let config = HarnessConfig {
            nodes: 0x40..=0x40,
            ..quiet_config()
        };
        let mut harness = Harness::new(&mut bus, StdRng::seed_from_u64(3), config);

        harness.tick().unwrap();
        harness.service().unwrap();
        assert_eq!(harness.stats().no_reply, 0);

        harness.tick().unwrap();
        assert_eq!(harness.stats().no_reply, 1);
        harness.tick().unwrap();
        assert_eq!(harness.stats().no_reply, 2);
    }

    #[test]
    fn test_other_nodes_not_expected_to_answer() {
        let mut bus = Bus::new(SimBus::new().with_read_delay(Duration::ZERO));
        let config = HarnessConfig {
            nodes: 0x41..=0x42,
            ..quiet_config()
        };
        let mut harness = Harness::new(&mut bus, StdRng::seed_from_u64(3), config);
        for _ in 0..10 {
            harness.tick().unwrap();
            harness.service().unwrap();
        }
        assert_eq!(harness.stats(), LinkStats::default());
    }

    #[test]
    fn test_corrupted_echo_is_mismatch() {
        let mut bus = loopback_bus();
        let config = HarnessConfig {
            nodes: 0x40..=0x40,
            ..quiet_config()
        };
        bus.transport_mut().corrupt_next_reply();
        let mut harness = Harness::new(&mut bus, StdRng::seed_from_u64(11), config);

        harness.tick().unwrap();
        harness.service().unwrap();
        harness.tick().unwrap();
        harness.service().unwrap();

        let stats = harness.stats();
        assert_eq!(stats.mismatched, 1);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.no_reply, 1);
    }

    #[test]
    fn test_noise_does_not_stop_the_link() {
        let mut bus = loopback_bus();
        let config = HarnessConfig {
            noise_one_in: 2,
            ..HarnessConfig::default()
        };
        let mut harness = Harness::new(&mut bus, StdRng::seed_from_u64(42), config);
        for _ in 0..200 {
            harness.tick().unwrap();
            for _ in 0..4 {
                harness.service().unwrap();
            }
        }
        assert!(harness.stats().correct > 0);
    }

    #[test]
    fn test_run_for_bounded_time() {
        let mut bus = loopback_bus();
        let config = HarnessConfig {
            tx_interval: Duration::from_millis(5),
            report_interval: Duration::from_millis(20),
            nodes: 0x40..=0x40,
            ..quiet_config()
        };
        let mut harness = Harness::new(&mut bus, StdRng::seed_from_u64(5), config);
        let stats = harness.run(Some(Duration::from_millis(60))).unwrap();
        assert!(stats.correct >= 2);
        assert_eq!(stats.mismatched, 0);
    }

    #[test]
    fn test_stats_display() {
        let stats = LinkStats {
            correct: 3,
            mismatched: 1,
            no_reply: 2,
        };
        let text = stats.to_string();
        assert!(text.contains("Correct Replies:   3"));
        assert!(text.contains("No Replies:        2"));
    }
}
