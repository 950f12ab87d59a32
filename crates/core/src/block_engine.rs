// SPDX-License-Identifier: Apache-2.0

//! Block Loudness Engine: the per-stream hot path. Ingests
//! K-weighted stereo frames, maintains the 400 ms / 75 %-overlap sliding
//! window, and derives momentary / short-term / integrated loudness.
//!
//! Every method on [`BlockLoudnessEngine::push_frame`] runs on the audio
//! thread: no allocation, no locking, no logging.

use std::collections::VecDeque;

use crate::kweight::KWeightedFilter;
use crate::types::{LoudnessReading, ABSOLUTE_GATE_LUFS, RELATIVE_GATE_OFFSET_LU};

const BLOCK_DURATION_MS: f64 = 400.0;
const HOP_MS: f64 = 100.0;
const UPDATE_INTERVAL_MS: f64 = 100.0;
const SHORT_TERM_WINDOW_MS: f64 = 3000.0;
const INTEGRATED_HISTORY_CAP: usize = 600;
const CHANNEL_WEIGHTS: [f64; 2] = [1.0, 1.0];

fn block_size_samples(sample_rate: u32) -> usize {
    ((sample_rate as f64 * BLOCK_DURATION_MS / 1000.0).round() as usize).max(128)
}

fn hop_size_samples(block_size: usize) -> usize {
    (((block_size as f64) * 0.25).round() as usize).max(1)
}

fn update_interval_samples(sample_rate: u32) -> usize {
    ((sample_rate as f64 * UPDATE_INTERVAL_MS / 1000.0).round() as usize).max(128)
}

fn short_term_block_count() -> usize {
    (SHORT_TERM_WINDOW_MS / HOP_MS).ceil() as usize
}

/// Per-channel ring buffer of squared K-weighted samples plus its running
/// sum, mirroring `BlockEngineState`'s per-channel fields.
struct ChannelRing {
    filter: KWeightedFilter,
    ring: Vec<f64>,
    sum_sq: f64,
}

impl ChannelRing {
    fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            filter: KWeightedFilter::new(sample_rate),
            ring: vec![0.0; block_size],
            sum_sq: 0.0,
        }
    }

    #[inline]
    fn push(&mut self, sample: f64, ring_index: usize) {
        let y = self.filter.process(sample);
        let y2 = y * y;
        let old = self.ring[ring_index];
        self.sum_sq += y2 - old;
        self.ring[ring_index] = y2;
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.ring.iter_mut().for_each(|s| *s = 0.0);
        self.sum_sq = 0.0;
    }
}

/// Per-stream BS.1770-4 loudness engine, always operating on normalized
/// stereo input (mono sources are duplicated to stereo upstream, which is
/// the Stream Processor's responsibility, not this engine's).
pub struct BlockLoudnessEngine {
    sample_rate: u32,
    block_size: usize,
    hop_size: usize,
    update_interval: usize,
    channels: [ChannelRing; 2],
    ring_index: usize,
    ring_filled: usize,
    samples_since_last_block: usize,
    samples_since_last_update: usize,
    integrated_history: VecDeque<f64>,
    short_term_history: VecDeque<f64>,
    short_term_cap: usize,
    last_block_loudness: f64,
    block_count: u32,
}

impl BlockLoudnessEngine {
    pub fn new(sample_rate: u32) -> Self {
        let block_size = block_size_samples(sample_rate);
        Self {
            sample_rate,
            block_size,
            hop_size: hop_size_samples(block_size),
            update_interval: update_interval_samples(sample_rate),
            channels: [
                ChannelRing::new(sample_rate, block_size),
                ChannelRing::new(sample_rate, block_size),
            ],
            ring_index: 0,
            ring_filled: 0,
            samples_since_last_block: 0,
            samples_since_last_update: 0,
            integrated_history: VecDeque::with_capacity(INTEGRATED_HISTORY_CAP),
            short_term_history: VecDeque::with_capacity(short_term_block_count()),
            short_term_cap: short_term_block_count(),
            last_block_loudness: f64::NEG_INFINITY,
            block_count: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Push one stereo frame (`[left, right]`). Returns `Some(reading)`
    /// whenever the ~10 Hz update cadence elapses this sample, `None`
    /// otherwise.
    #[inline]
    pub fn push_frame(&mut self, frame: [f64; 2]) -> Option<LoudnessReading> {
        self.channels[0].push(frame[0], self.ring_index);
        self.channels[1].push(frame[1], self.ring_index);

        self.ring_index += 1;
        if self.ring_index == self.block_size {
            self.ring_index = 0;
        }
        if self.ring_filled < self.block_size {
            self.ring_filled += 1;
        }

        self.samples_since_last_block += 1;
        self.samples_since_last_update += 1;

        if self.samples_since_last_block >= self.hop_size && self.ring_filled >= self.block_size {
            self.emit_block();
            self.samples_since_last_block -= self.hop_size;
        }

        if self.samples_since_last_update >= self.update_interval {
            self.samples_since_last_update -= self.update_interval;
            Some(self.current_reading())
        } else {
            None
        }
    }

    fn emit_block(&mut self) {
        let mean_squares = [
            self.channels[0].sum_sq / self.block_size as f64,
            self.channels[1].sum_sq / self.block_size as f64,
        ];
        let weighted_sum: f64 = (0..2).map(|c| CHANNEL_WEIGHTS[c] * mean_squares[c]).sum();

        let loudness = if weighted_sum > 0.0 {
            -0.691 + 10.0 * weighted_sum.log10()
        } else {
            f64::NEG_INFINITY
        };

        self.last_block_loudness = loudness;

        if loudness > ABSOLUTE_GATE_LUFS {
            if self.integrated_history.len() >= INTEGRATED_HISTORY_CAP {
                self.integrated_history.pop_front();
            }
            self.integrated_history.push_back(loudness);
        }

        if self.short_term_history.len() >= self.short_term_cap {
            self.short_term_history.pop_front();
        }
        self.short_term_history.push_back(loudness);

        self.block_count += 1;
    }

    /// Most recent block loudness; `-inf` if no block has been emitted yet.
    pub fn momentary(&self) -> f64 {
        self.last_block_loudness
    }

    /// Energy average of short-term history entries above the absolute
    /// gate.
    pub fn short_term(&self) -> f64 {
        gated_energy_average(self.short_term_history.iter().copied(), ABSOLUTE_GATE_LUFS)
    }

    /// Two-pass gated integrated loudness.
    pub fn integrated(&self) -> f64 {
        if self.integrated_history.is_empty() {
            return f64::NEG_INFINITY;
        }

        let p1 = mean_power(self.integrated_history.iter().copied());
        if p1 <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let relative_threshold = 10.0 * p1.log10() + RELATIVE_GATE_OFFSET_LU;

        gated_energy_average(self.integrated_history.iter().copied(), relative_threshold)
    }

    pub fn current_reading(&self) -> LoudnessReading {
        LoudnessReading {
            momentary: self.momentary(),
            short_term: self.short_term(),
            integrated: self.integrated(),
            block_count: self.block_count,
        }
    }

    /// Reset filter state, ring buffers, histories and counters (spec
    /// §4.2 "Reset").
    pub fn reset(&mut self) {
        self.channels[0].reset();
        self.channels[1].reset();
        self.ring_index = 0;
        self.ring_filled = 0;
        self.samples_since_last_block = 0;
        self.samples_since_last_update = 0;
        self.integrated_history.clear();
        self.short_term_history.clear();
        self.last_block_loudness = f64::NEG_INFINITY;
        self.block_count = 0;
    }
}

fn mean_power(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += 10f64.powf(v / 10.0);
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn gated_energy_average(values: impl Iterator<Item = f64>, gate: f64) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        if v > gate {
            sum += 10f64.powf(v / 10.0);
            count += 1;
        }
    }
    if count == 0 {
        f64::NEG_INFINITY
    } else {
        10.0 * (sum / count as f64).log10()
    }
}
