//! Stepper motion model
//!
//! Position and target are in micro-steps. Each [`Stepper::tick`] moves the
//! motor towards its target by `(ramp >> 5) + 1` micro-steps, where `ramp`
//! grows by one per tick (up to 255) and is capped by the remaining
//! distance, so the motor accelerates away from rest and decelerates into
//! the target without overshooting.

use crate::config::StepperConfig;

/// Extra travel past `maxpos` assumed at power-on so zeroing always
/// reaches the end stop
pub const ZERO_OVERTRAVEL: u16 = 96;

const RAMP_SHIFT: u8 = 5;

/// Stepper power/motion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepperState {
    /// Coils de-energized
    #[default]
    Off,
    /// Holding or moving to target
    On,
    /// Driving into the end stop; settles at `minpos`
    Zeroing,
}

/// Stepper with acceleration ramp
#[derive(Debug, Clone, Default)]
pub struct Stepper {
    state: StepperState,
    position: u16,
    target: u16,
    ramp: u8,
}

impl Stepper {
    /// Stepper with coils off at position 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Power-on homing: assume the worst-case position and drive to 0
    pub fn start(&mut self, limits: &StepperConfig) {
        self.zero(limits.maxpos.saturating_add(ZERO_OVERTRAVEL));
    }

    pub fn state(&self) -> StepperState {
        self.state
    }

    pub fn position(&self) -> u16 {
        self.position
    }

    pub fn target(&self) -> u16 {
        self.target
    }

    /// Returns true once the target has been reached
    pub fn is_idle(&self) -> bool {
        self.state != StepperState::Zeroing && self.position == self.target
    }

    /// Move to an absolute position within the limits
    ///
    /// Ignored while zeroing.
    pub fn goto(&mut self, position: u16, limits: &StepperConfig) {
        if self.state == StepperState::Zeroing {
            return;
        }
        self.state = StepperState::On;
        self.target = limits.clamp(position);
    }

    /// Zero against the end stop, `steps` micro-steps away
    pub fn zero(&mut self, steps: u16) {
        self.state = StepperState::Zeroing;
        self.target = 0;
        self.position = steps;
    }

    /// De-energize the coils where the motor stands
    pub fn off(&mut self) {
        self.target = self.position;
        self.state = StepperState::Off;
    }

    /// Advance one timer period
    ///
    /// Returns the signed number of micro-steps moved.
    pub fn tick(&mut self, limits: &StepperConfig) -> i16 {
        if self.state == StepperState::Zeroing && self.position == self.target {
            self.target = limits.minpos;
            self.state = StepperState::On;
        }

        let delta = self.position.abs_diff(self.target);
        if delta < u16::from(self.ramp) {
            self.ramp = delta as u8;
        } else if self.ramp < u8::MAX {
            self.ramp += 1;
        }

        let step = u16::from(self.ramp >> RAMP_SHIFT) + 1;
        if self.position < self.target {
            self.position += step;
            step as i16
        } else if self.position > self.target {
            self.position -= step;
            -(step as i16)
        } else {
            0
        }
    }

    /// Tick until idle or `max_ticks` elapsed; returns the ticks used
    pub fn run_to_target(&mut self, limits: &StepperConfig, max_ticks: u32) -> u32 {
        let mut ticks = 0;
        while !self.is_idle() && ticks < max_ticks {
            self.tick(limits);
            ticks += 1;
        }
        ticks
    }
}
