//! Test-only helpers shared across module test suites. Not part of the
//! public API.
#![cfg(test)]

use core::cell::Cell;
use embedded_time::Clock;
use embedded_time::fraction::Fraction;

/// A manually-advanced millisecond clock for deterministic reassembly-timeout
/// and ordering tests.
pub struct TestClock {
    ticks: Cell<u32>,
}

impl TestClock {
    pub fn new() -> Self {
        Self { ticks: Cell::new(0) }
    }

    pub fn advance(&self, ms: u32) {
        self.ticks.set(self.ticks.get() + ms);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    type T = u32;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1000);

    fn try_now(&self) -> Result<embedded_time::Instant<Self>, embedded_time::clock::Error> {
        Ok(embedded_time::Instant::new(self.ticks.get()))
    }
}
