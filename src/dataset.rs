use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{s, Array1, Array2};
use thiserror::Error;

use crate::config::{ConfigError, DatasetConfig};
use crate::filter::{ButterworthLowPass, FilterError, LowPassFilter};
use crate::provenance::{ProvenanceError, ProvenanceRow, ProvenanceTable, RecordMeta, StepCounter};
use crate::record_loader::{FileRecordSource, LabelTable, RecordSource};
use crate::segmenter::{onset_indices, NoopObserver, SegmentError, Segmenter, StepObserver};
use crate::types::{
    ChannelSchema, SchemaError, StepWindow, CM_PER_M, LOWPASS_CUTOFF_HZ, LOWPASS_ORDER, STRIDE_LENGTH_COLUMN,
    WARMUP_SAMPLES,
};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load {path:?}: {source:#}")]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("filtering {path:?} failed: {source}")]
    Filter {
        path: PathBuf,
        #[source]
        source: FilterError,
    },

    #[error("filter returned {actual} samples for channel {channel} of {path:?}, expected {expected}")]
    FilterLength {
        path: PathBuf,
        channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error("invalid channel layout in {path:?}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("{path:?} has {samples} samples, needs more than {}", WARMUP_SAMPLES)]
    RecordTooShort { path: PathBuf, samples: usize },

    #[error("{path:?} has no {} column", STRIDE_LENGTH_COLUMN)]
    MissingStrideLength { path: PathBuf },

    #[error("segmenting {path:?} failed: {source}")]
    Segment {
        path: PathBuf,
        #[source]
        source: SegmentError,
    },

    #[error("provenance of {path:?}: {source}")]
    Provenance {
        path: PathBuf,
        #[source]
        source: ProvenanceError,
    },

    #[error("index {index} out of range for dataset of {len} windows")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Transformación aplicada a cada ventana al iterar por lotes
pub type Transform = Box<dyn Fn(&mut StepWindow)>;

/// Etiquetas en metros: `Stride_length` sin su primera fila, / 100
pub fn stride_labels(stride_cm: &[f64]) -> Vec<f64> {
    stride_cm.iter().skip(1).map(|cm| cm / CM_PER_M).collect()
}

/// Conjunto de ventanas por paso con su longitud de zancada.
///
/// Se construye completo de una vez y después solo se lee por índice.
pub struct StrideDataset {
    windows: Vec<StepWindow>,
    labels: Vec<f64>,
    provenance: Option<ProvenanceTable>,
    batch_size: usize,
    walking_type: String,
    transform: Option<Transform>,
}

impl StrideDataset {
    /// Construye desde disco con el filtro Butterworth por defecto
    pub fn from_files(config: &DatasetConfig) -> Result<Self, DatasetError> {
        Self::build(config, &FileRecordSource, &ButterworthLowPass, &mut NoopObserver)
    }

    pub fn build(
        config: &DatasetConfig,
        source: &dyn RecordSource,
        filter: &dyn LowPassFilter,
        observer: &mut dyn StepObserver,
    ) -> Result<Self, DatasetError> {
        config.validate()?;

        let schema = ChannelSchema::default();
        let segmenter = Segmenter::new(schema, config.seq_buffer, config.seq_length);
        let mut counter = StepCounter::new(config.testing_with_discard);
        let mut rows = Vec::new();
        let mut windows = Vec::new();
        let mut labels = Vec::new();

        for path in &config.files {
            let record = source.load(path).map_err(|source| DatasetError::Load {
                path: path.clone(),
                source,
            })?;
            if record.step_indices.is_empty() {
                debug!("{:?}: registro sin secuencia de pasos, se recalcula", path);
            }
            let record_labels = labels_in_meters(path, &record.labels)?;
            let sensors = filter_channels(path, record.sensors, config.rate, &schema, filter)?;

            let step_count = onset_indices(sensors.column(schema.stance)).len();
            let step_indices: Vec<usize> = (0..step_count.saturating_sub(1)).collect();

            let name = path.display().to_string();
            let steps = segmenter
                .segment(&name, sensors, &record_labels, &step_indices, observer)
                .map_err(|source| DatasetError::Segment {
                    path: path.clone(),
                    source,
                })?;
            info!(
                "{}: {} pasos detectados, {} ventanas",
                name,
                step_indices.len(),
                steps.len()
            );

            for step in steps {
                windows.push(step.window);
                labels.push(step.label);
            }

            if config.testing {
                let meta = RecordMeta::from_path(path).map_err(|source| DatasetError::Provenance {
                    path: path.clone(),
                    source,
                })?;
                let (start_steps, end_steps) = counter.advance(&step_indices);
                rows.push(ProvenanceRow {
                    subject_id: meta.subject_id,
                    walking_type: meta.walking_type,
                    start_steps,
                    end_steps,
                    trial: meta.trial,
                    side: meta.side,
                });
            }
        }

        info!("carga terminada: {} ventanas", windows.len());

        Ok(Self {
            windows,
            labels,
            provenance: config.testing.then(|| ProvenanceTable::from(rows)),
            batch_size: config.batch_size,
            walking_type: config.walking_type.clone(),
            transform: None,
        })
    }

    /// Asigna la transformación usada por `batches`
    pub fn with_transform(mut self, transform: impl Fn(&mut StepWindow) + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Ventana [seq_length x 6] y etiqueta [1 x 1]
    pub fn get(&self, index: usize) -> Result<(Array2<f64>, Array2<f64>), DatasetError> {
        let (window, &label) = self
            .windows
            .get(index)
            .zip(self.labels.get(index))
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.len(),
            })?;
        Ok((window.clone(), Array2::from_elem((1, 1), label)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepWindow, f64)> + '_ {
        self.windows.iter().zip(self.labels.iter().copied())
    }

    pub fn windows(&self) -> &[StepWindow] {
        &self.windows
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    /// Solo presente si la configuración activó `testing`
    pub fn provenance(&self) -> Option<&ProvenanceTable> {
        self.provenance.as_ref()
    }

    pub fn walking_type(&self) -> &str {
        &self.walking_type
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Escribe todas las ventanas en formato largo:
    /// step,sample,ax,ay,az,gx,gy,gz,stride_length
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([
            "step",
            "sample",
            "ax",
            "ay",
            "az",
            "gx",
            "gy",
            "gz",
            "stride_length",
        ])?;
        for (step, (window, label)) in self.iter().enumerate() {
            for (sample, row) in window.rows().into_iter().enumerate() {
                let mut record = vec![step.to_string(), sample.to_string()];
                record.extend(row.iter().map(f64::to_string));
                record.push(label.to_string());
                writer.write_record(&record)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Lotes de `batch_size` pares (ventana, etiqueta) con la transformación aplicada
    pub fn batches(&self) -> Batches<'_> {
        Batches {
            dataset: self,
            next: 0,
        }
    }
}

pub struct Batches<'a> {
    dataset: &'a StrideDataset,
    next: usize,
}

impl Iterator for Batches<'_> {
    type Item = Vec<(Array2<f64>, Array2<f64>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.dataset.len();
        if self.next >= len {
            return None;
        }
        let end = (self.next + self.dataset.batch_size).min(len);
        let windows = &self.dataset.windows[self.next..end];
        let labels = &self.dataset.labels[self.next..end];
        let batch = windows
            .iter()
            .zip(labels)
            .map(|(window, &label)| {
                let mut window = window.clone();
                if let Some(transform) = &self.dataset.transform {
                    transform(&mut window);
                }
                (window, Array2::from_elem((1, 1), label))
            })
            .collect();
        self.next = end;
        Some(batch)
    }
}

/// Filtra los canales de datos y descarta el calentamiento del sensor
fn filter_channels(
    path: &Path,
    mut sensors: Array2<f64>,
    rate: f64,
    schema: &ChannelSchema,
    filter: &dyn LowPassFilter,
) -> Result<Array2<f64>, DatasetError> {
    schema
        .validate(sensors.ncols())
        .map_err(|source| DatasetError::Schema {
            path: path.to_path_buf(),
            source,
        })?;

    let samples = sensors.nrows();
    if samples <= WARMUP_SAMPLES {
        return Err(DatasetError::RecordTooShort {
            path: path.to_path_buf(),
            samples,
        });
    }

    for channel in schema.acc_range().chain(schema.gyro_range()) {
        let column = sensors.column(channel).to_vec();
        let filtered = filter
            .apply(&column, LOWPASS_CUTOFF_HZ, rate, LOWPASS_ORDER)
            .map_err(|source| DatasetError::Filter {
                path: path.to_path_buf(),
                source,
            })?;
        if filtered.len() != samples {
            return Err(DatasetError::FilterLength {
                path: path.to_path_buf(),
                channel,
                expected: samples,
                actual: filtered.len(),
            });
        }
        sensors.column_mut(channel).assign(&Array1::from(filtered));
    }

    debug!(
        "{:?}: {} muestras, {} descartadas por calentamiento",
        path, samples, WARMUP_SAMPLES
    );
    Ok(sensors.slice(s![WARMUP_SAMPLES.., ..]).to_owned())
}

fn labels_in_meters(path: &Path, table: &LabelTable) -> Result<Vec<f64>, DatasetError> {
    let stride = table
        .column(STRIDE_LENGTH_COLUMN)
        .ok_or_else(|| DatasetError::MissingStrideLength {
            path: path.to_path_buf(),
        })?;
    Ok(stride_labels(stride))
}
