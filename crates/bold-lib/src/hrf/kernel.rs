use std::f64::consts::PI;

/// Onset step (seconds) for the finite-difference time derivative.
const TIME_DERIVATIVE_STEP: f64 = 0.1;
/// Dispersion step for the finite-difference dispersion derivative.
const DISPERSION_DERIVATIVE_STEP: f64 = 0.01;

/// Difference-of-gammas parameterization of a canonical hemodynamic
/// response kernel.
#[derive(Debug, Clone, Copy)]
pub struct GammaDifferenceHrf {
    /// Delay of the positive response peak (seconds)
    pub peak_delay: f64,
    /// Delay of the post-stimulus undershoot (seconds)
    pub undershoot_delay: f64,
    pub peak_dispersion: f64,
    pub undershoot_dispersion: f64,
    /// Undershoot weight relative to the peak gamma
    pub undershoot_ratio: f64,
    /// Kernel window length (seconds)
    pub time_length: f64,
    /// Shift of the response relative to the stimulus (seconds)
    pub onset: f64,
}

impl GammaDifferenceHrf {
    /// SPM canonical shape.
    pub fn spm() -> Self {
        Self {
            peak_delay: 6.0,
            undershoot_delay: 16.0,
            peak_dispersion: 1.0,
            undershoot_dispersion: 1.0,
            undershoot_ratio: 0.167,
            time_length: 32.0,
            onset: 0.0,
        }
    }

    /// Shape proposed by Glover for auditory cortex responses.
    pub fn glover() -> Self {
        Self {
            peak_delay: 6.0,
            undershoot_delay: 12.0,
            peak_dispersion: 0.9,
            undershoot_dispersion: 0.9,
            undershoot_ratio: 0.35,
            time_length: 32.0,
            onset: 0.0,
        }
    }

    /// Sample the kernel over its window at step `dt`, normalized to unit sum.
    pub fn sample(&self, dt: f64) -> Vec<f64> {
        let n = (self.time_length / dt).round().max(1.0) as usize;
        let peak_shape = self.peak_delay / self.peak_dispersion;
        let undershoot_shape = self.undershoot_delay / self.undershoot_dispersion;
        let mut kernel = Vec::with_capacity(n);
        for i in 0..n {
            // one hi-res step of lead keeps the response at the stimulus itself zero
            let t = i as f64 * dt - self.onset - dt;
            let peak = gamma_density(t, peak_shape, self.peak_dispersion);
            let undershoot = gamma_density(t, undershoot_shape, self.undershoot_dispersion);
            kernel.push(peak - self.undershoot_ratio * undershoot);
        }
        let total: f64 = kernel.iter().sum();
        if total.abs() > f64::EPSILON {
            for value in &mut kernel {
                *value /= total;
            }
        }
        kernel
    }

    /// Finite-difference derivative of the kernel with respect to response
    /// onset, sampled at step `dt`.
    pub fn time_derivative(&self, dt: f64) -> Vec<f64> {
        let shifted = Self {
            onset: self.onset + TIME_DERIVATIVE_STEP,
            ..*self
        }
        .sample(dt);
        self.sample(dt)
            .iter()
            .zip(shifted)
            .map(|(base, late)| (late - base) / TIME_DERIVATIVE_STEP)
            .collect()
    }

    /// Finite-difference derivative with respect to the peak dispersion,
    /// sampled at step `dt`.
    pub fn dispersion_derivative(&self, dt: f64) -> Vec<f64> {
        let widened = Self {
            peak_dispersion: self.peak_dispersion + DISPERSION_DERIVATIVE_STEP,
            ..*self
        }
        .sample(dt);
        self.sample(dt)
            .iter()
            .zip(widened)
            .map(|(base, wide)| (base - wide) / DISPERSION_DERIVATIVE_STEP)
            .collect()
    }
}

/// SPM canonical kernel sampled at step `dt`.
pub fn spm_hrf(dt: f64) -> Vec<f64> {
    GammaDifferenceHrf::spm().sample(dt)
}

/// Glover kernel sampled at step `dt`.
pub fn glover_hrf(dt: f64) -> Vec<f64> {
    GammaDifferenceHrf::glover().sample(dt)
}

/// Gamma probability density with the given shape and scale, zero for
/// non-positive arguments.
fn gamma_density(x: f64, shape: f64, scale: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let z = x / scale;
    ((shape - 1.0) * z.ln() - z - ln_gamma(shape)).exp() / scale
}

/// Lanczos approximation of the log-gamma function (g = 7, nine terms).
fn ln_gamma(x: f64) -> f64 {
    const LANCZOS_G: f64 = 7.0;
    const LANCZOS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // reflection formula
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let mut series = LANCZOS[0];
    for (i, coefficient) in LANCZOS.iter().enumerate().skip(1) {
        series += coefficient / (x + i as f64);
    }
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argmax(values: &[f64]) -> usize {
        let mut best = 0;
        for (i, &v) in values.iter().enumerate() {
            if v > values[best] {
                best = i;
            }
        }
        best
    }

    #[test]
    fn ln_gamma_matches_known_values() {
        assert!((ln_gamma(1.0)).abs() < 1e-10);
        assert!((ln_gamma(2.0)).abs() < 1e-10);
        assert!((ln_gamma(6.0) - 120.0f64.ln()).abs() < 1e-9);
        assert!((ln_gamma(0.5) - PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn kernels_are_unit_sum() {
        for kernel in [spm_hrf(0.02), glover_hrf(0.02)] {
            let total: f64 = kernel.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn kernel_is_silent_at_stimulus_time() {
        let kernel = glover_hrf(0.02);
        assert_eq!(kernel[0], 0.0);
    }

    #[test]
    fn glover_peaks_around_five_seconds() {
        let dt = 0.02;
        let kernel = glover_hrf(dt);
        let peak_time = argmax(&kernel) as f64 * dt;
        assert!(peak_time > 4.0 && peak_time < 7.0, "peak at {peak_time}s");
    }

    #[test]
    fn spm_has_late_undershoot() {
        let dt = 0.02;
        let kernel = spm_hrf(dt);
        let at = |seconds: f64| kernel[(seconds / dt).round() as usize];
        assert!(at(15.0) < 0.0);
        assert!(at(5.0) > 0.0);
    }

    #[test]
    fn derivative_kernels_sum_to_zero() {
        let hrf = GammaDifferenceHrf::glover();
        let td: f64 = hrf.time_derivative(0.02).iter().sum();
        let dd: f64 = hrf.dispersion_derivative(0.02).iter().sum();
        assert!(td.abs() < 1e-9);
        assert!(dd.abs() < 1e-9);
    }
}
