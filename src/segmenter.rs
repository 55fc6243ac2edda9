use log::{debug, warn};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis, ShapeError};
use thiserror::Error;

use crate::types::{ChannelSchema, LabeledStep, SchemaError, MIN_STEP_SAMPLES};

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("signal needs at least 2 samples, got {0}")]
    TooFewSamples(usize),

    #[error("invalid channel layout: {0}")]
    Schema(#[from] SchemaError),

    #[error("stance indicator must be 0/1, found {value} at sample {sample}")]
    NonBinaryIndicator { sample: usize, value: f64 },

    #[error("step {step} has no onset/offset pair ({pairs} pairs available)")]
    MissingBoundary { step: usize, pairs: usize },

    #[error("no label for step position {position} ({available} labels)")]
    MissingLabel { position: usize, available: usize },

    #[error("window shape error: {0}")]
    Shape(#[from] ShapeError),
}

/// Observador opcional de cada paso antes del recorte/relleno (diagnóstico)
pub trait StepObserver {
    fn observe(&mut self, step: usize, acc: ArrayView2<f64>, gyro: ArrayView2<f64>);
}

/// Observador que no hace nada
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StepObserver for NoopObserver {
    fn observe(&mut self, _step: usize, _acc: ArrayView2<f64>, _gyro: ArrayView2<f64>) {}
}

impl<F> StepObserver for F
where
    F: FnMut(usize, ArrayView2<f64>, ArrayView2<f64>),
{
    fn observe(&mut self, step: usize, acc: ArrayView2<f64>, gyro: ArrayView2<f64>) {
        self(step, acc, gyro)
    }
}

/// Índices k donde ind[k+1] - ind[k] == delta
fn transitions(indicator: ArrayView1<f64>, delta: f64) -> Vec<usize> {
    (0..indicator.len().saturating_sub(1))
        .filter(|&k| indicator[k + 1] - indicator[k] == delta)
        .collect()
}

/// Inicios de apoyo: transiciones 0 → 1 (índice de la última muestra en 0)
pub fn onset_indices(indicator: ArrayView1<f64>) -> Vec<usize> {
    transitions(indicator, 1.0)
}

/// Finales de apoyo: transiciones 1 → 0, descartando la primera
/// (proviene de la anotación de referencia, no es el final de un paso).
pub fn offset_indices(indicator: ArrayView1<f64>) -> Vec<usize> {
    transitions(indicator, -1.0).into_iter().skip(1).collect()
}

/// Convierte en sitio las columnas de velocidad angular de grados a radianes
pub fn degrees_to_radians(signal: &mut Array2<f64>, schema: &ChannelSchema) {
    signal
        .slice_mut(s![.., schema.gyro_range()])
        .mapv_inplace(f64::to_radians);
}

/// Reparto simétrico: (floor(n/2), n - floor(n/2))
pub fn symmetric_split(amount: usize) -> (usize, usize) {
    let left = amount / 2;
    (left, amount - left)
}

/// Recorta filas por ambos extremos hasta `target`
pub fn crop_symmetric(window: ArrayView2<f64>, target: usize) -> Array2<f64> {
    let len = window.nrows();
    if len <= target {
        return window.to_owned();
    }
    let (left, right) = symmetric_split(len - target);
    window.slice(s![left..len - right, ..]).to_owned()
}

/// Índice reflejado sin repetir el borde, periódico para rellenos largos
fn reflect_index(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - m) as usize
    }
}

/// Rellena por reflexión hasta `target` filas
pub fn reflect_pad(window: ArrayView2<f64>, target: usize) -> Array2<f64> {
    let (len, channels) = window.dim();
    if len >= target {
        return window.to_owned();
    }
    if len == 0 {
        return Array2::zeros((target, channels));
    }
    let (left, _) = symmetric_split(target - len);
    Array2::from_shape_fn((target, channels), |(row, ch)| {
        window[[reflect_index(row as isize - left as isize, len), ch]]
    })
}

/// Recorta o rellena simétricamente a exactamente `target` filas
pub fn fit_to_length(window: ArrayView2<f64>, target: usize) -> Array2<f64> {
    if window.nrows() > target {
        crop_symmetric(window, target)
    } else {
        reflect_pad(window, target)
    }
}

/// Segmentador de pasos. Sin estado entre registros.
#[derive(Debug, Clone)]
pub struct Segmenter {
    pub schema: ChannelSchema,
    /// Muestras extra alrededor del paso (mitad a cada lado)
    pub buffer_width: usize,
    /// Longitud fija de cada ventana
    pub target_length: usize,
    pub min_step_samples: usize,
}

impl Segmenter {
    pub fn new(schema: ChannelSchema, buffer_width: usize, target_length: usize) -> Self {
        Self {
            schema,
            buffer_width,
            target_length,
            min_step_samples: MIN_STEP_SAMPLES,
        }
    }

    /// Pares (onset, offset) emparejados por posición.
    ///
    /// Si los conteos no coinciden se trunca al más corto.
    pub fn boundaries(&self, record: &str, signal: &Array2<f64>) -> Vec<(usize, usize)> {
        let indicator = signal.column(self.schema.stance);
        let onsets = onset_indices(indicator);
        let offsets = offset_indices(indicator);
        if onsets.len() != offsets.len() {
            warn!(
                "{}: {} inicios y {} finales de apoyo, se emparejan {}",
                record,
                onsets.len(),
                offsets.len(),
                onsets.len().min(offsets.len())
            );
        }
        onsets.into_iter().zip(offsets).collect()
    }

    fn check_input(&self, signal: &Array2<f64>) -> Result<(), SegmentError> {
        if signal.nrows() < 2 {
            return Err(SegmentError::TooFewSamples(signal.nrows()));
        }
        self.schema.validate(signal.ncols())?;
        if let Some((sample, &value)) = signal
            .column(self.schema.stance)
            .indexed_iter()
            .find(|(_, v)| **v != 0.0 && **v != 1.0)
        {
            return Err(SegmentError::NonBinaryIndicator { sample, value });
        }
        Ok(())
    }

    /// Divide una señal en ventanas de paso etiquetadas.
    ///
    /// `signal` llega con la velocidad angular en grados y se convierte aquí.
    /// El primer y el último índice de `step_indices` se descartan siempre; los
    /// pasos con menos de `min_step_samples` muestras o cuya ventana empezaría
    /// antes de la primera muestra se omiten sin error. Al final de la señal la
    /// ventana se recorta.
    pub fn segment(
        &self,
        record: &str,
        mut signal: Array2<f64>,
        labels: &[f64],
        step_indices: &[usize],
        observer: &mut dyn StepObserver,
    ) -> Result<Vec<LabeledStep>, SegmentError> {
        self.check_input(&signal)?;
        let pairs = self.boundaries(record, &signal);
        degrees_to_radians(&mut signal, &self.schema);

        let samples = signal.nrows();
        let half = self.buffer_width / 2;
        let acc = self.schema.acc(&signal);
        let gyro = self.schema.gyro(&signal);

        let mut steps = Vec::new();
        let interior = 1..step_indices.len().saturating_sub(1);
        for position in interior {
            let step = step_indices[position];
            let &(onset, offset) = pairs.get(step).ok_or(SegmentError::MissingBoundary {
                step,
                pairs: pairs.len(),
            })?;

            if onset < half {
                warn!(
                    "paso {} en {} empieza antes de la señal (inicio {}, buffer {})",
                    step, record, onset, self.buffer_width
                );
                continue;
            }
            let start = onset - half;
            let end = (offset + half).min(samples);
            if offset + half > samples {
                debug!(
                    "{}: ventana del paso {} recortada a [{}, {})",
                    record, step, start, end
                );
            }
            let end = end.max(start);

            let raw_acc = acc.slice(s![start..end, ..]);
            let raw_gyro = gyro.slice(s![start..end, ..]);
            observer.observe(step, raw_acc, raw_gyro);

            if raw_acc.nrows() < self.min_step_samples {
                warn!(
                    "paso corto en {} (paso {}, {} muestras)",
                    record,
                    step,
                    raw_acc.nrows()
                );
                continue;
            }

            let label = *labels.get(position).ok_or(SegmentError::MissingLabel {
                position,
                available: labels.len(),
            })?;

            let acc_fit = fit_to_length(raw_acc, self.target_length);
            let gyro_fit = fit_to_length(raw_gyro, self.target_length);
            let window = ndarray::concatenate(Axis(1), &[acc_fit.view(), gyro_fit.view()])?;

            steps.push(LabeledStep { window, label });
        }

        Ok(steps)
    }
}

/// Versión directa: indicador en `indicator_channel`, sin observador
pub fn segment(
    signal: Array2<f64>,
    indicator_channel: usize,
    buffer_width: usize,
    target_length: usize,
    labels: &[f64],
    step_indices: &[usize],
) -> Result<Vec<LabeledStep>, SegmentError> {
    Segmenter::new(
        ChannelSchema::with_stance(indicator_channel),
        buffer_width,
        target_length,
    )
    .segment("<signal>", signal, labels, step_indices, &mut NoopObserver)
}
