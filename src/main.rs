mod data;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use data::export::{export_csv, export_json};
use data::filter::{FilterKind, FilterSpec};
use data::flags::FlagSummary;
use data::loader::load_file;
use data::pipeline::{run, PipelineConfig};

/// Track-geometry analysis: impute, filter, derive metrics, flag threshold
/// exceedances, export the annotated table.
#[derive(Parser)]
#[command(name = "railscan")]
#[command(about = "Railway track-geometry measurement analysis")]
#[command(version)]
struct Cli {
    /// Input measurement file (.csv or .json)
    input: PathBuf,

    /// Noise filter to apply: rolling, butterworth or savgol
    #[arg(long)]
    filter: Option<String>,

    /// Filter window size in samples
    #[arg(long, default_value_t = 5)]
    window: usize,

    /// Filter order (Butterworth / Savitzky-Golay only)
    #[arg(long, default_value_t = 3)]
    order: usize,

    /// Comma-separated channels to filter (default: the geometry channels)
    #[arg(long)]
    columns: Option<String>,

    /// Skip missing-value imputation
    #[arg(long)]
    no_impute: bool,

    /// Drop records below this chainage (after analysis)
    #[arg(long)]
    min_chainage: Option<f64>,

    /// Drop records above this chainage (after analysis)
    #[arg(long)]
    max_chainage: Option<f64>,

    /// Write the annotated table as CSV
    #[arg(long)]
    out_csv: Option<PathBuf>,

    /// Write the annotated table as JSON
    #[arg(long)]
    out_json: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let table = load_file(&cli.input)?;

    let mut config = PipelineConfig {
        impute: !cli.no_impute,
        ..PipelineConfig::default()
    };
    if let Some(kind) = &cli.filter {
        let kind: FilterKind = kind.parse()?;
        config.filter = Some(FilterSpec::new(kind, cli.window, cli.order));
    }
    if let Some(columns) = &cli.columns {
        let columns: Vec<String> = columns
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        // Explicitly requested channels must exist, unlike the default set.
        for column in &columns {
            if table.numeric(column).is_none() {
                bail!("no numeric column '{column}' in {}", cli.input.display());
            }
        }
        config.filter_columns = columns;
    }

    let mut table = run(table, &config)?;

    if cli.min_chainage.is_some() || cli.max_chainage.is_some() {
        table = table.slice_chainage(
            cli.min_chainage.unwrap_or(f64::NEG_INFINITY),
            cli.max_chainage.unwrap_or(f64::INFINITY),
        )?;
    }

    print!("{}", FlagSummary::from_table(&table)?);

    if let Some(path) = &cli.out_csv {
        export_csv(&table, path)?;
    }
    if let Some(path) = &cli.out_json {
        export_json(&table, path)?;
    }
    Ok(())
}
