use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DEFAULT_SAMPLE_RATE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Parámetros de construcción del dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Registros a procesar, en orden
    pub files: Vec<PathBuf>,
    /// Tamaño de lote para `StrideDataset::batches` (no afecta a la segmentación)
    pub batch_size: usize,
    /// Longitud fija de cada ventana
    pub seq_length: usize,
    /// Muestras de contexto alrededor de cada paso
    pub seq_buffer: usize,
    /// Frecuencia de muestreo (Hz)
    pub rate: f64,
    /// Registrar la procedencia de cada registro
    pub testing: bool,
    /// Tipo de marcha esperado (solo informativo)
    pub walking_type: String,
    /// Descontar primer y último paso en la procedencia
    pub testing_with_discard: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            batch_size: 1,
            seq_length: 200,
            seq_buffer: 0,
            rate: DEFAULT_SAMPLE_RATE,
            testing: false,
            walking_type: "Normal".to_string(),
            testing_with_discard: false,
        }
    }
}

impl DatasetConfig {
    pub fn new(files: Vec<PathBuf>, seq_length: usize, seq_buffer: usize) -> Self {
        Self {
            files,
            seq_length,
            seq_buffer,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.files.is_empty() {
            return Err(ConfigError::Invalid("no record files given".to_string()));
        }
        if self.seq_length == 0 {
            return Err(ConfigError::Invalid("seq_length must be > 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()));
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "rate must be a positive number of Hz, got {}",
                self.rate
            )));
        }
        Ok(())
    }

    /// Lee la configuración desde JSON sin validarla
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Carga y valida la configuración desde JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatasetConfig::default();
        assert_eq!(config.rate, 1000.0);
        assert_eq!(config.walking_type, "Normal");
        assert!(!config.testing);
        assert!(!config.testing_with_discard);
    }

    #[test]
    fn test_load_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{"files": ["Normal/S1_T1_L.csv"], "seq_length": 256, "seq_buffer": 20, "testing": true}"#,
        )
        .unwrap();

        let config = DatasetConfig::load(&path).unwrap();
        assert_eq!(config.seq_length, 256);
        assert_eq!(config.seq_buffer, 20);
        assert!(config.testing);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn test_read_skips_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(&path, r#"{"seq_length": 128}"#).unwrap();

        assert!(DatasetConfig::load(&path).is_err());
        let config = DatasetConfig::read(&path).unwrap();
        assert_eq!(config.seq_length, 128);
        assert!(config.files.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DatasetConfig::new(vec![PathBuf::from("a.csv")], 0, 0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.seq_length = 10;
        config.rate = 0.0;
        assert!(config.validate().is_err());
        config.rate = 100.0;
        assert!(config.validate().is_ok());
        assert!(DatasetConfig::default().validate().is_err());
    }
}
