use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use csv::ReaderBuilder;
use log::debug;
use ndarray::Array2;
use serde::Deserialize;

/// Columna opcional de la tabla de etiquetas con la secuencia de pasos
pub const STEP_COLUMN: &str = "Step";

/// Tabla de etiquetas por paso (solo columnas numéricas)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    columns: BTreeMap<String, Vec<f64>>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(name.into(), values);
        self
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

/// Registro crudo: matriz de sensores [T x C], etiquetas y secuencia de pasos
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub sensors: Array2<f64>,
    pub labels: LabelTable,
    /// Secuencia de pasos tal como viene en disco; el dataset la recalcula
    /// desde el indicador filtrado y no la usa para segmentar.
    pub step_indices: Vec<usize>,
}

/// Fuente de registros. La deserialización concreta queda fuera del segmentador.
pub trait RecordSource {
    fn load(&self, path: &Path) -> Result<RawRecord>;
}

/// Carga registros desde disco según la extensión:
/// - `.json`: `{"sensors": [[..]], "labels": {"Stride_length": [..]}, "step_indices": [..]}`
/// - cualquier otra: CSV de sensores + `<nombre>.labels.csv` al lado
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRecordSource;

impl RecordSource for FileRecordSource {
    fn load(&self, path: &Path) -> Result<RawRecord> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => load_record_from_json(path),
            _ => load_record_from_csv(path),
        }
    }
}

/// Ruta de la tabla de etiquetas asociada a un CSV de sensores
pub fn labels_path(sensors_path: &Path) -> PathBuf {
    sensors_path.with_extension("labels.csv")
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    cell.parse().ok()
}

/// Carga la matriz de sensores desde un CSV con cabecera (ax,ay,az,gx,gy,gz,stance,aux)
pub fn load_sensors_from_csv(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let width = reader
        .headers()
        .with_context(|| format!("Cabecera inválida en {:?}", path))?
        .len();
    let mut data = Vec::new();
    let mut rows = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Fila {} inválida en {:?}", row_idx + 1, path))?;
        for (col, cell) in record.iter().enumerate() {
            let value: f64 = cell.trim().parse().with_context(|| {
                format!("Valor {:?} inválido en fila {}, columna {}", cell, row_idx + 1, col)
            })?;
            data.push(value);
        }
        rows += 1;
    }

    ensure!(rows > 0, "El CSV {:?} no contiene datos", path);
    Array2::from_shape_vec((rows, width), data)
        .with_context(|| format!("Matriz irregular en {:?}", path))
}

/// Carga la tabla de etiquetas; las columnas no numéricas se ignoran
pub fn load_labels_from_csv(path: impl AsRef<Path>) -> Result<LabelTable> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV de etiquetas {:?}", path))?;

    let headers = reader.headers()?.clone();
    let mut values: Vec<Option<Vec<f64>>> = vec![Some(Vec::new()); headers.len()];

    for (row_idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Fila {} inválida en {:?}", row_idx + 1, path))?;
        for (col, column) in values.iter_mut().enumerate() {
            if let Some(cells) = column {
                match parse_cell(record.get(col).unwrap_or("")) {
                    Some(v) => cells.push(v),
                    None => *column = None,
                }
            }
        }
    }

    let mut table = LabelTable::new();
    for (name, column) in headers.iter().zip(values) {
        match column {
            Some(cells) => table = table.with_column(name.trim(), cells),
            None => debug!("{:?}: columna no numérica {:?} ignorada", path, name),
        }
    }
    Ok(table)
}

/// Secuencia de pasos: columna `Step` si existe, si no 0..filas
fn step_indices_from(labels: &LabelTable) -> Result<Vec<usize>> {
    let Some(steps) = labels.column(STEP_COLUMN) else {
        let rows = labels
            .column_names()
            .next()
            .and_then(|name| labels.column(name))
            .map_or(0, <[f64]>::len);
        return Ok((0..rows).collect());
    };
    steps
        .iter()
        .map(|&v| {
            if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
                Ok(v as usize)
            } else {
                bail!("Índice de paso inválido: {}", v)
            }
        })
        .collect()
}

/// Registro en formato CSV: sensores en `path`, etiquetas en `<nombre>.labels.csv`
pub fn load_record_from_csv(path: impl AsRef<Path>) -> Result<RawRecord> {
    let path = path.as_ref();
    let sensors = load_sensors_from_csv(path)?;
    let labels = load_labels_from_csv(labels_path(path))?;
    let step_indices = step_indices_from(&labels)?;
    Ok(RawRecord {
        sensors,
        labels,
        step_indices,
    })
}

#[derive(Debug, Deserialize)]
struct JsonRecord {
    sensors: Vec<Vec<f64>>,
    labels: BTreeMap<String, Vec<Option<f64>>>,
    #[serde(default)]
    step_indices: Option<Vec<usize>>,
}

/// Registro en formato JSON
pub fn load_record_from_json(path: impl AsRef<Path>) -> Result<RawRecord> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("No se pudo abrir {:?}", path))?;
    let json: JsonRecord = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("JSON inválido en {:?}", path))?;

    let rows = json.sensors.len();
    ensure!(rows > 0, "El registro {:?} no contiene datos", path);
    let width = json.sensors[0].len();
    if let Some(bad) = json.sensors.iter().position(|row| row.len() != width) {
        bail!("La fila {} no tiene {} columnas", bad, width);
    }
    let sensors = Array2::from_shape_vec((rows, width), json.sensors.concat())?;

    let mut labels = LabelTable::new();
    for (name, column) in json.labels {
        let cells = column.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        labels = labels.with_column(name, cells);
    }

    let step_indices = match json.step_indices {
        Some(steps) => steps,
        None => step_indices_from(&labels)?,
    };

    Ok(RawRecord {
        sensors,
        labels,
        step_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_csv_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S03_T2_L.csv");
        fs::write(
            &path,
            "ax,ay,az,gx,gy,gz,stance,aux\n\
             0.1,0.2,9.8,1,2,3,0,0\n\
             0.1,0.2,9.8,1,2,3,1,0\n\
             0.1,0.2,9.8,1,2,3,1,0\n",
        )
        .unwrap();
        fs::write(
            labels_path(&path),
            "Step,Stride_length,Foot\n1,,L\n2,150,L\n3,148.5,L\n",
        )
        .unwrap();

        let record = FileRecordSource.load(&path).unwrap();
        assert_eq!(record.sensors.dim(), (3, 8));
        assert_eq!(record.sensors[[1, 6]], 1.0);
        assert_eq!(record.step_indices, vec![1, 2, 3]);

        let stride = record.labels.column("Stride_length").unwrap();
        assert!(stride[0].is_nan());
        assert_eq!(&stride[1..], &[150.0, 148.5]);
        assert!(record.labels.column("Foot").is_none());
    }

    #[test]
    fn test_steps_default_to_row_count() {
        let labels = LabelTable::new().with_column("Stride_length", vec![1.0, 2.0, 3.0]);
        assert_eq!(step_indices_from(&labels).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_load_json_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S01_T1_R.json");
        fs::write(
            &path,
            r#"{"sensors": [[0,0,0,0,0,0,0,0],[1,1,1,1,1,1,1,0]],
                "labels": {"Stride_length": [null, 120.0]},
                "step_indices": [0, 1]}"#,
        )
        .unwrap();

        let record = FileRecordSource.load(&path).unwrap();
        assert_eq!(record.sensors.dim(), (2, 8));
        assert_eq!(record.step_indices, vec![0, 1]);
        assert_eq!(record.labels.column("Stride_length").unwrap()[1], 120.0);
    }

    #[test]
    fn test_ragged_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S01_T1_R.json");
        fs::write(&path, r#"{"sensors": [[0,0],[1]], "labels": {}}"#).unwrap();
        assert!(FileRecordSource.load(&path).is_err());
    }

    #[test]
    fn test_missing_labels_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S01_T1_R.csv");
        fs::write(&path, "ax,ay,az,gx,gy,gz,stance,aux\n0,0,0,0,0,0,0,0\n").unwrap();
        let err = FileRecordSource.load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("etiquetas"));
    }
}
