//! Filtro paso-bajo aplicado a cada canal antes de segmentar.

use std::f64::consts::PI;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("cutoff {cutoff_hz} Hz must lie in (0, {nyquist_hz}) Hz")]
    InvalidCutoff { cutoff_hz: f64, nyquist_hz: f64 },

    #[error("filter order must be at least 1")]
    ZeroOrder,
}

/// Colaborador externo: filtra una señal completa de un canal
pub trait LowPassFilter {
    fn apply(
        &self,
        signal: &[f64],
        cutoff_hz: f64,
        sample_rate: f64,
        order: usize,
    ) -> Result<Vec<f64>, FilterError>;
}

/// Sección de primer o segundo orden en forma directa II transpuesta
#[derive(Debug, Clone, Copy)]
struct Section {
    b: [f64; 3],
    a: [f64; 3], // a[0] normalizado a 1
}

impl Section {
    fn first_order(k: f64) -> Self {
        let norm = 1.0 / (1.0 + k);
        Self {
            b: [k * norm, k * norm, 0.0],
            a: [1.0, (k - 1.0) * norm, 0.0],
        }
    }

    fn second_order(k: f64, q: f64) -> Self {
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k / q + k2);
        let b0 = k2 * norm;
        Self {
            b: [b0, 2.0 * b0, b0],
            a: [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - k / q + k2) * norm],
        }
    }

    fn run(&self, signal: &mut [f64]) {
        let (mut z1, mut z2) = (0.0, 0.0);
        for x in signal.iter_mut() {
            let input = *x;
            let y = self.b[0] * input + z1;
            z1 = self.b[1] * input - self.a[1] * y + z2;
            z2 = self.b[2] * input - self.a[2] * y;
            *x = y;
        }
    }
}

/// Butterworth paso-bajo causal (transformada bilineal con pre-warping).
///
/// Orden N = una sección de primer orden si N es impar más N/2 bicuadráticas,
/// estado inicial nulo.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButterworthLowPass;

impl ButterworthLowPass {
    fn sections(cutoff_hz: f64, sample_rate: f64, order: usize) -> Result<Vec<Section>, FilterError> {
        if order == 0 {
            return Err(FilterError::ZeroOrder);
        }
        let nyquist_hz = sample_rate / 2.0;
        if !(cutoff_hz > 0.0 && cutoff_hz < nyquist_hz) {
            return Err(FilterError::InvalidCutoff {
                cutoff_hz,
                nyquist_hz,
            });
        }

        let k = (PI * cutoff_hz / sample_rate).tan();
        let mut sections = Vec::with_capacity(order / 2 + 1);
        if order % 2 == 1 {
            sections.push(Section::first_order(k));
        }
        for pair in 1..=order / 2 {
            let angle = (2 * pair - 1) as f64 * PI / (2 * order) as f64;
            let q = 1.0 / (2.0 * angle.sin());
            sections.push(Section::second_order(k, q));
        }
        Ok(sections)
    }
}

impl LowPassFilter for ButterworthLowPass {
    fn apply(
        &self,
        signal: &[f64],
        cutoff_hz: f64,
        sample_rate: f64,
        order: usize,
    ) -> Result<Vec<f64>, FilterError> {
        let sections = Self::sections(cutoff_hz, sample_rate, order)?;
        let mut out = signal.to_vec();
        for section in &sections {
            section.run(&mut out);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_gain_is_unity() {
        let filter = ButterworthLowPass;
        let out = filter.apply(&vec![2.5; 2000], 20.0, 1000.0, 3).unwrap();
        assert!((out[1999] - 2.5).abs() < 1e-6);
        // Arranca desde estado nulo
        assert!(out[0] < 2.5);
    }

    #[test]
    fn test_attenuates_high_frequency() {
        let filter = ButterworthLowPass;
        let signal: Vec<f64> = (0..4000)
            .map(|i| (2.0 * PI * 200.0 * i as f64 / 1000.0).sin())
            .collect();
        let out = filter.apply(&signal, 20.0, 1000.0, 3).unwrap();
        let peak = out[2000..].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak < 0.01, "peak {}", peak);
    }

    #[test]
    fn test_passes_low_frequency() {
        let filter = ButterworthLowPass;
        let signal: Vec<f64> = (0..4000)
            .map(|i| (2.0 * PI * 1.0 * i as f64 / 1000.0).sin())
            .collect();
        let out = filter.apply(&signal, 20.0, 1000.0, 3).unwrap();
        let peak = out[2000..].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak > 0.98, "peak {}", peak);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let filter = ButterworthLowPass;
        assert_eq!(
            filter.apply(&[0.0; 4], 600.0, 1000.0, 3),
            Err(FilterError::InvalidCutoff {
                cutoff_hz: 600.0,
                nyquist_hz: 500.0
            })
        );
        assert_eq!(filter.apply(&[0.0; 4], 20.0, 1000.0, 0), Err(FilterError::ZeroOrder));
    }
}
