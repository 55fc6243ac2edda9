//! Procedencia de cada registro: sujeto, tipo de marcha, rango de pasos, ensayo y lado.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvenanceError {
    #[error("cannot read file name of {0:?}")]
    NoFileName(std::path::PathBuf),

    #[error("expected subject and trial numbers in {name:?}, found {found} numeric tokens")]
    NumericTokens { name: String, found: usize },

    #[error("file name {0:?} is too short to carry a side marker")]
    NoSide(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadatos codificados en la ruta: `<tipo_marcha>/<...sujeto...ensayo...lado.ext>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub subject_id: String,
    pub walking_type: String,
    pub trial: String,
    pub side: char,
}

fn numeric_tokens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d+|\d+").expect("static regex"))
}

impl RecordMeta {
    /// Extrae sujeto y ensayo (los dos números del nombre), el lado (carácter
    /// en la posición -5 del nombre) y el tipo de marcha (directorio padre).
    pub fn from_path(path: &Path) -> Result<Self, ProvenanceError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ProvenanceError::NoFileName(path.to_path_buf()))?;

        let tokens: Vec<&str> = numeric_tokens().find_iter(name).map(|m| m.as_str()).collect();
        let [subject_id, trial] = tokens[..] else {
            return Err(ProvenanceError::NumericTokens {
                name: name.to_string(),
                found: tokens.len(),
            });
        };

        let chars: Vec<char> = name.chars().collect();
        let side = chars
            .len()
            .checked_sub(5)
            .map(|i| chars[i])
            .ok_or_else(|| ProvenanceError::NoSide(name.to_string()))?;

        let walking_type = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            subject_id: subject_id.to_string(),
            walking_type,
            trial: trial.to_string(),
            side,
        })
    }
}

/// Una fila por registro procesado
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceRow {
    #[serde(rename = "subjectID")]
    pub subject_id: String,
    #[serde(rename = "walkingtype")]
    pub walking_type: String,
    pub start_steps: i64,
    pub end_steps: i64,
    pub trial: String,
    pub side: char,
}

/// Contador acumulado de pasos entre registros
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCounter {
    /// Descontar el primer y el último paso de cada registro
    pub discard_boundaries: bool,
    init_step: i64,
}

impl StepCounter {
    pub fn new(discard_boundaries: bool) -> Self {
        Self {
            discard_boundaries,
            init_step: 0,
        }
    }

    pub fn init_step(&self) -> i64 {
        self.init_step
    }

    /// Devuelve (start_steps, end_steps) del registro y avanza el contador
    pub fn advance(&mut self, step_indices: &[usize]) -> (i64, i64) {
        let start = self.init_step;
        let Some(&last) = step_indices.last() else {
            return (start, start);
        };
        let trim = if self.discard_boundaries { 2 } else { 0 };
        let count = step_indices.len() as i64;
        let end = last as i64 + start - trim;
        self.init_step += (count - trim).max(0);
        (start, end)
    }
}

/// Tabla materializada al final de la construcción
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceTable {
    rows: Vec<ProvenanceRow>,
}

impl ProvenanceTable {
    pub fn rows(&self) -> &[ProvenanceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Escribe la tabla como CSV: subjectID,walkingtype,start_steps,end_steps,trial,side
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), ProvenanceError> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl From<Vec<ProvenanceRow>> for ProvenanceTable {
    fn from(rows: Vec<ProvenanceRow>) -> Self {
        Self { rows }
    }
}

impl FromIterator<ProvenanceRow> for ProvenanceTable {
    fn from_iter<I: IntoIterator<Item = ProvenanceRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn test_meta_from_path() {
        let meta = RecordMeta::from_path(&PathBuf::from("data/Normal/S12_T3_L.pkl")).unwrap();
        assert_eq!(
            meta,
            RecordMeta {
                subject_id: "12".to_string(),
                walking_type: "Normal".to_string(),
                trial: "3".to_string(),
                side: 'L',
            }
        );
    }

    #[test]
    fn test_meta_decimal_tokens() {
        let meta = RecordMeta::from_path(&PathBuf::from("Stroke/sub4.5_trial2_R.csv")).unwrap();
        assert_eq!(meta.subject_id, "4.5");
        assert_eq!(meta.trial, "2");
        assert_eq!(meta.side, 'R');
    }

    #[test]
    fn test_meta_needs_two_numbers() {
        let err = RecordMeta::from_path(&PathBuf::from("Normal/S1_L.csv")).unwrap_err();
        assert!(matches!(err, ProvenanceError::NumericTokens { found: 1, .. }));
    }

    #[test]
    fn test_counter_with_discard() {
        let mut counter = StepCounter::new(true);
        let first: Vec<usize> = (0..10).collect();
        let second: Vec<usize> = (0..8).collect();

        assert_eq!(counter.init_step(), 0);
        assert_eq!(counter.advance(&first), (0, 7));
        assert_eq!(counter.init_step(), 8);
        assert_eq!(counter.advance(&second), (8, 13));
        assert_eq!(counter.init_step(), 14);
    }

    #[test]
    fn test_counter_without_discard() {
        let mut counter = StepCounter::new(false);
        assert_eq!(counter.advance(&(0..10).collect::<Vec<_>>()), (0, 9));
        assert_eq!(counter.advance(&(0..8).collect::<Vec<_>>()), (10, 17));
        assert_eq!(counter.advance(&[]), (18, 18));
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subjects.csv");
        let table: ProvenanceTable = vec![ProvenanceRow {
            subject_id: "7".to_string(),
            walking_type: "Normal".to_string(),
            start_steps: 0,
            end_steps: 5,
            trial: "1".to_string(),
            side: 'L',
        }]
        .into();
        table.write_csv(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "subjectID,walkingtype,start_steps,end_steps,trial,side\n7,Normal,0,5,1,L\n"
        );
    }
}
