// SPDX-License-Identifier: Apache-2.0

//! Lock-free single-slot cells used at the audio/control boundary.
//!
//! The hot path must never allocate, lock, or log. Parameter updates
//! (gain, limiter settings) travel control -> audio as single-writer
//! atomic slots; loudness readings travel audio -> control as a
//! single-producer/single-consumer "latest value" cell, matching the
//! "atomic pointer swap or equivalent" language of the concurrency model.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::types::LoudnessReading;

/// An `f64` that can be written from one thread and read from another
/// without locking. Ordering is `Relaxed`: each slot is single-writer and
/// readers only ever need the most recently published value, not a
/// happens-before relationship with other state.
#[derive(Debug)]
pub struct AtomicDb {
    bits: AtomicU64,
}

impl AtomicDb {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Single-slot "latest reading" cell. The audio thread calls `publish` once
/// per update cadence (~10 Hz); the control thread calls `latest` whenever
/// it wants a snapshot. A torn read across the four fields is possible in
/// principle (each field is an independent atomic) but harmless here: at
/// worst the Coordinator observes a reading that mixes one cadence tick's
/// momentary value with the previous tick's integrated value, which
/// resolves itself on the next ~100 ms publish.
#[derive(Debug)]
pub struct ReadingSlot {
    momentary: AtomicU64,
    short_term: AtomicU64,
    integrated: AtomicU64,
    block_count: AtomicU32,
}

impl ReadingSlot {
    pub fn new() -> Self {
        let r = LoudnessReading::SILENT;
        Self {
            momentary: AtomicU64::new(r.momentary.to_bits()),
            short_term: AtomicU64::new(r.short_term.to_bits()),
            integrated: AtomicU64::new(r.integrated.to_bits()),
            block_count: AtomicU32::new(r.block_count),
        }
    }

    pub fn publish(&self, reading: LoudnessReading) {
        self.momentary
            .store(reading.momentary.to_bits(), Ordering::Relaxed);
        self.short_term
            .store(reading.short_term.to_bits(), Ordering::Relaxed);
        self.integrated
            .store(reading.integrated.to_bits(), Ordering::Relaxed);
        self.block_count.store(reading.block_count, Ordering::Relaxed);
    }

    pub fn latest(&self) -> LoudnessReading {
        LoudnessReading {
            momentary: f64::from_bits(self.momentary.load(Ordering::Relaxed)),
            short_term: f64::from_bits(self.short_term.load(Ordering::Relaxed)),
            integrated: f64::from_bits(self.integrated.load(Ordering::Relaxed)),
            block_count: self.block_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for ReadingSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_db_round_trips() {
        let slot = AtomicDb::new(-18.0);
        assert_eq!(slot.load(), -18.0);
        slot.store(f64::NEG_INFINITY);
        assert_eq!(slot.load(), f64::NEG_INFINITY);
    }

    #[test]
    fn reading_slot_round_trips() {
        let slot = ReadingSlot::new();
        assert_eq!(slot.latest(), LoudnessReading::SILENT);

        let reading = LoudnessReading {
            momentary: -14.0,
            short_term: -15.0,
            integrated: -16.0,
            block_count: 42,
        };
        slot.publish(reading);
        assert_eq!(slot.latest(), reading);
    }
}
