use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use zancada::config::DatasetConfig;
use zancada::dataset::StrideDataset;

/// Segmenta registros de marcha en ventanas por paso para entrenar el estimador de zancada
#[derive(Parser, Debug)]
#[command(name = "segment_steps", version, about, long_about = None)]
struct Cli {
    /// Registros a procesar (<tipo_marcha>/<sujeto>_<ensayo>_<lado>.csv|json)
    files: Vec<PathBuf>,

    /// Configuración JSON (los registros de la línea de comandos se añaden)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Longitud fija de cada ventana
    #[arg(long)]
    seq_length: Option<usize>,

    /// Muestras de contexto alrededor de cada paso
    #[arg(long)]
    seq_buffer: Option<usize>,

    /// Frecuencia de muestreo en Hz
    #[arg(long)]
    rate: Option<f64>,

    /// Registrar procedencia por registro
    #[arg(long)]
    provenance: bool,

    /// Descontar primer y último paso en la procedencia
    #[arg(long)]
    discard: bool,

    /// CSV de salida con todas las ventanas
    #[arg(short, long, default_value = "windows.csv")]
    output: PathBuf,

    /// CSV de salida con la procedencia
    #[arg(long, default_value = "subjects.csv")]
    provenance_out: PathBuf,
}

fn build_config(cli: &Cli) -> Result<DatasetConfig> {
    let mut config = match &cli.config {
        Some(path) => DatasetConfig::read(path)
            .with_context(|| format!("No se pudo leer la configuración {:?}", path))?,
        None => DatasetConfig::default(),
    };

    config.files.extend(cli.files.iter().cloned());
    if let Some(seq_length) = cli.seq_length {
        config.seq_length = seq_length;
    }
    if let Some(seq_buffer) = cli.seq_buffer {
        config.seq_buffer = seq_buffer;
    }
    if let Some(rate) = cli.rate {
        config.rate = rate;
    }
    config.testing |= cli.provenance;
    config.testing_with_discard |= cli.discard;

    if config.files.is_empty() {
        bail!("Debes especificar al menos un registro");
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    println!("🚶 Segmentando {} registros", config.files.len());

    let dataset = StrideDataset::from_files(&config)?;
    println!(
        "✅ {} ventanas de {} x 6 muestras",
        dataset.len(),
        config.seq_length
    );

    dataset
        .write_csv(&cli.output)
        .with_context(|| format!("No se pudo escribir {:?}", cli.output))?;
    println!("💾 Ventanas guardadas en {:?}", cli.output);

    if let Some(table) = dataset.provenance() {
        table
            .write_csv(&cli.provenance_out)
            .with_context(|| format!("No se pudo escribir {:?}", cli.provenance_out))?;
        println!(
            "🧾 Procedencia de {} registros en {:?}",
            table.len(),
            cli.provenance_out
        );
    }

    Ok(())
}
