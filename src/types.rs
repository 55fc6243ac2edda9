use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// Ventana de un paso: [seq_length x 6] = aceleración (3) ‖ velocidad angular (3)
pub type StepWindow = Array2<f64>;

/// Constantes del sistema
pub const NUM_ACC_CHANNELS: usize = 3;
pub const NUM_GYRO_CHANNELS: usize = 3;
pub const NUM_DATA_CHANNELS: usize = NUM_ACC_CHANNELS + NUM_GYRO_CHANNELS; // 6
pub const NUM_RECORD_CHANNELS: usize = NUM_DATA_CHANNELS + 2; // + stance + aux
pub const MIN_STEP_SAMPLES: usize = 50; // pasos más cortos se consideran pulsos
pub const WARMUP_SAMPLES: usize = 200; // asentamiento del sensor
pub const LOWPASS_CUTOFF_HZ: f64 = 20.0;
pub const LOWPASS_ORDER: usize = 3;
pub const DEFAULT_SAMPLE_RATE: f64 = 1000.0; // Hz
pub const STRIDE_LENGTH_COLUMN: &str = "Stride_length";
pub const CM_PER_M: f64 = 100.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("expected at least {expected} channels, got {actual}")]
    TooFewChannels { expected: usize, actual: usize },

    #[error("channel {index} is outside the {width}-channel matrix")]
    ChannelOutOfRange { index: usize, width: usize },

    #[error("channel ranges overlap: {0}")]
    Overlap(&'static str),
}

/// Disposición explícita de columnas de la matriz de sensores.
///
/// Por defecto: [ax, ay, az, gx, gy, gz, stance, aux].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSchema {
    /// Primer canal de aceleración (ocupa 3 columnas)
    pub acc_start: usize,
    /// Primer canal de velocidad angular en grados (ocupa 3 columnas)
    pub gyro_start: usize,
    /// Canal binario stance/swing
    pub stance: usize,
    /// Canal auxiliar (no se usa)
    pub aux: Option<usize>,
}

impl Default for ChannelSchema {
    fn default() -> Self {
        Self {
            acc_start: 0,
            gyro_start: NUM_ACC_CHANNELS,
            stance: NUM_DATA_CHANNELS,
            aux: Some(NUM_DATA_CHANNELS + 1),
        }
    }
}

impl ChannelSchema {
    /// Esquema mínimo con el indicador en `stance` y sin canal auxiliar
    pub fn with_stance(stance: usize) -> Self {
        Self {
            aux: None,
            stance,
            ..Self::default()
        }
    }

    pub fn acc_range(&self) -> std::ops::Range<usize> {
        self.acc_start..self.acc_start + NUM_ACC_CHANNELS
    }

    pub fn gyro_range(&self) -> std::ops::Range<usize> {
        self.gyro_start..self.gyro_start + NUM_GYRO_CHANNELS
    }

    /// Número mínimo de columnas que debe tener una matriz con este esquema
    pub fn required_width(&self) -> usize {
        let data_end = self.acc_range().end.max(self.gyro_range().end);
        let flags_end = self.stance.max(self.aux.unwrap_or(0)) + 1;
        data_end.max(flags_end)
    }

    /// Comprueba que el esquema encaja en una matriz de `width` columnas
    pub fn validate(&self, width: usize) -> Result<(), SchemaError> {
        let acc = self.acc_range();
        let gyro = self.gyro_range();
        if acc.start < gyro.end && gyro.start < acc.end {
            return Err(SchemaError::Overlap("acceleration and angular rate"));
        }
        if acc.contains(&self.stance) || gyro.contains(&self.stance) {
            return Err(SchemaError::Overlap("stance indicator and data channels"));
        }
        if width < NUM_DATA_CHANNELS {
            return Err(SchemaError::TooFewChannels {
                expected: NUM_DATA_CHANNELS,
                actual: width,
            });
        }
        let required = self.required_width();
        if required > width {
            return Err(SchemaError::ChannelOutOfRange {
                index: required - 1,
                width,
            });
        }
        Ok(())
    }

    /// Vista [T x 3] de la aceleración
    pub fn acc<'a>(&self, signal: &'a Array2<f64>) -> ArrayView2<'a, f64> {
        signal.slice(ndarray::s![.., self.acc_range()])
    }

    /// Vista [T x 3] de la velocidad angular
    pub fn gyro<'a>(&self, signal: &'a Array2<f64>) -> ArrayView2<'a, f64> {
        signal.slice(ndarray::s![.., self.gyro_range()])
    }
}

/// Una ventana ya normalizada junto a su longitud de zancada en metros
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledStep {
    pub window: StepWindow,
    pub label: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_fits_record() {
        let schema = ChannelSchema::default();
        assert_eq!(schema.required_width(), NUM_RECORD_CHANNELS);
        assert!(schema.validate(NUM_RECORD_CHANNELS).is_ok());
    }

    #[test]
    fn test_schema_rejects_narrow_matrix() {
        let schema = ChannelSchema::default();
        assert_eq!(
            schema.validate(7),
            Err(SchemaError::ChannelOutOfRange { index: 7, width: 7 })
        );
        assert_eq!(
            ChannelSchema::with_stance(2).validate(8),
            Err(SchemaError::Overlap("stance indicator and data channels"))
        );
    }

    #[test]
    fn test_schema_views() {
        let signal = Array2::from_shape_fn((4, 8), |(_, c)| c as f64);
        let schema = ChannelSchema::default();
        assert_eq!(schema.acc(&signal).dim(), (4, 3));
        assert_eq!(schema.gyro(&signal)[[0, 0]], 3.0);
    }
}
