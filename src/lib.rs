pub mod config;
pub mod dataset;
pub mod filter;
pub mod provenance;
pub mod record_loader;
pub mod segmenter;
pub mod types;

pub use config::DatasetConfig;
pub use dataset::{DatasetError, StrideDataset};
pub use segmenter::{segment, Segmenter, StepObserver};
