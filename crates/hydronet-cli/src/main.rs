//! Command-line interface for Hydronet, the water-utility network GIS
//! normalization and association toolkit.
//!
//! The binary is a thin façade over [`hydronet_core`]: it parses arguments
//! with [`clap`], configures [`tracing`] logging (bridging the `log` macros
//! the library crates use), and renders end-of-run summaries as tables.
//!
//! # Available Commands
//!
//! - `normalize` - Normalize a source dataset into per-asset GeoPackage tables
//! - `boundaries` - Import a district-boundary CSV (WKT column) the same way
//! - `associate` - Associate point assets to the line network
//! - `layers` - Audit the layers of a source dataset
//! - `specs` - List the builtin layer-spec registry

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use hydronet_core::GpkgSource;
use hydronet_core::associate::{PointLayerRequest, associate_layers};
use hydronet_core::pipeline;
use hydronet_core::source::{SourceFormat, audit_layers, open_csv_source, open_source};
use hydronet_core::spec::PipelineConfig;
use tracing::{Level, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

mod display;

#[derive(Parser)]
#[command(
    name = "hydronet",
    version,
    about = "Water-utility network GIS normalization and association",
    long_about = "Hydronet ingests heterogeneous vector GIS datasets describing a water\n\
                  network, writes schema-normalized per-asset tables into a GeoPackage,\n\
                  and associates point assets with the pipe they belong to."
)]
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Normalizes a source dataset into per-asset tables.
    ///
    /// Each configured layer is read, schema-mapped, reprojected, and
    /// written under overwrite semantics; a failing layer never stops the
    /// others.
    Normalize {
        /// Path to the source dataset (shapefile directory or GeoPackage).
        #[arg(short, long, value_name = "DATASET")]
        source: PathBuf,

        /// Path of the target GeoPackage store.
        #[arg(short, long, value_name = "STORE")]
        output: PathBuf,

        /// Source format override ("shapefile" or "gpkg"); inferred from
        /// the path when omitted.
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,

        /// Layer-spec configuration file (YAML); builtin registry when
        /// omitted.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Fallback EPSG code for layers that declare no CRS.
        #[arg(long, value_name = "EPSG")]
        source_epsg: Option<u32>,

        /// Restrict the run to these layer names (comma separated).
        #[arg(long, value_name = "NAMES", value_delimiter = ',')]
        layers: Option<Vec<String>>,
    },

    /// Imports a district-boundary CSV with a WKT geometry column.
    ///
    /// The degenerate tabular case of normalization: same contract, with
    /// the source/target CRS pair stated explicitly for auditability.
    Boundaries {
        /// Path to the boundary CSV (e.g. dma.csv).
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,

        /// Path of the target GeoPackage store.
        #[arg(short, long, value_name = "STORE")]
        output: PathBuf,

        /// Name of the WKT geometry column.
        #[arg(long, value_name = "COLUMN", default_value = "wkt")]
        wkt_column: String,

        /// Boundary layer spec to use from the configuration.
        #[arg(long, value_name = "NAME", default_value = "dma")]
        layer: String,

        /// Layer-spec configuration file (YAML); builtin registry when
        /// omitted.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// EPSG code of the CSV coordinates.
        #[arg(long, value_name = "EPSG", default_value_t = 27700)]
        source_epsg: u32,

        /// EPSG code of the stored geometry.
        #[arg(long, value_name = "EPSG", default_value_t = 27700)]
        storage_epsg: u32,
    },

    /// Associates point assets to the line network.
    Associate {
        /// Path of the normalized GeoPackage store.
        #[arg(short, long, value_name = "STORE")]
        store: PathBuf,

        /// Line-network table to associate against.
        #[arg(long, value_name = "TABLE", default_value = "trunk_main")]
        lines: String,

        /// Point tables to associate (comma separated); defaults to every
        /// point layer of the configuration present in the store.
        #[arg(long, value_name = "NAMES", value_delimiter = ',')]
        points: Option<Vec<String>>,

        /// Layer-spec configuration file (YAML) supplying tolerances;
        /// builtin registry when omitted.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Path of the association CSV artifact.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Audits the layers of a source dataset.
    Layers {
        /// Path to the source dataset.
        #[arg(short, long, value_name = "DATASET")]
        source: PathBuf,

        /// Source format override ("shapefile" or "gpkg").
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,

        /// Keep only water-network layers ('w' prefix, no annotation
        /// layers).
        #[arg(long)]
        network: bool,
    },

    /// Lists the builtin layer-spec registry.
    Specs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Normalize {
            source,
            output,
            format,
            config,
            source_epsg,
            layers,
        } => handle_normalize(&source, &output, format.as_deref(), config.as_deref(), source_epsg, layers.as_deref()),
        Commands::Boundaries {
            csv,
            output,
            wkt_column,
            layer,
            config,
            source_epsg,
            storage_epsg,
        } => handle_boundaries(
            &csv,
            &output,
            &wkt_column,
            &layer,
            config.as_deref(),
            source_epsg,
            storage_epsg,
        ),
        Commands::Associate {
            store,
            lines,
            points,
            config,
            output,
        } => handle_associate(&store, &lines, points.as_deref(), config.as_deref(), &output),
        Commands::Layers {
            source,
            format,
            network,
        } => handle_layers(&source, format.as_deref(), network),
        Commands::Specs => handle_specs(),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_yaml_path(path)?),
        None => Ok(PipelineConfig::builtin()),
    }
}

fn parse_format(name: Option<&str>) -> Result<Option<SourceFormat>> {
    name.map(SourceFormat::parse).transpose()
}

fn handle_normalize(
    source_path: &std::path::Path,
    output: &std::path::Path,
    format: Option<&str>,
    config_path: Option<&std::path::Path>,
    source_epsg: Option<u32>,
    layers: Option<&[String]>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if source_epsg.is_some() {
        config.source_epsg = source_epsg;
    }

    let source = open_source(source_path, parse_format(format)?)?;
    let mut store = pipeline::open_store(output)?;

    info!("normalizing '{}' into '{}'", source_path.display(), output.display());
    let summary = pipeline::run(source.as_ref(), &config, &mut store, layers)?;

    println!("\nNormalization summary:\n");
    println!("{}", display::run_summary_table(&summary));

    if summary.layers.iter().all(|l| !l.succeeded()) {
        return Err(anyhow!("every layer failed; see the summary above"));
    }
    Ok(())
}

fn handle_boundaries(
    csv: &std::path::Path,
    output: &std::path::Path,
    wkt_column: &str,
    layer: &str,
    config_path: Option<&std::path::Path>,
    source_epsg: u32,
    storage_epsg: u32,
) -> Result<()> {
    let base = load_config(config_path)?;
    let mut spec = base
        .layer(layer)
        .ok_or_else(|| anyhow!("configuration has no layer '{layer}'"))?
        .clone();

    let source = open_csv_source(csv, wkt_column, Some(source_epsg))?;
    let csv_layer = source
        .layer_names()?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("CSV source exposes no layer"))?;
    spec.source_layer = Some(csv_layer);

    let config = PipelineConfig {
        storage_epsg,
        reference_epsg: base.reference_epsg,
        source_epsg: Some(source_epsg),
        batch_size: base.batch_size,
        layers: vec![spec],
    };

    let mut store = pipeline::open_store(output)?;
    info!(
        "importing boundaries '{}' (EPSG:{source_epsg} -> EPSG:{storage_epsg})",
        csv.display()
    );
    let summary = pipeline::run(source.as_ref(), &config, &mut store, None)?;

    println!("\nBoundary import summary:\n");
    println!("{}", display::run_summary_table(&summary));

    if !summary.all_succeeded() {
        return Err(anyhow!("boundary import failed; see the summary above"));
    }
    Ok(())
}

fn handle_associate(
    store_path: &std::path::Path,
    lines: &str,
    points: Option<&[String]>,
    config_path: Option<&std::path::Path>,
    output: &std::path::Path,
) -> Result<()> {
    let config = load_config(config_path)?;
    let source = GpkgSource::open(store_path)?;

    // Explicit names, or every configured point layer; tolerances always
    // come from the configuration.
    let requests: Vec<PointLayerRequest> = match points {
        Some(names) => names
            .iter()
            .map(|name| PointLayerRequest {
                layer: name.clone(),
                tolerance: config.layer(name).and_then(|spec| spec.tolerance),
            })
            .collect(),
        None => config
            .layers
            .iter()
            .filter(|spec| spec.geometry_kind.is_point())
            .map(|spec| PointLayerRequest {
                layer: spec.target_table(),
                tolerance: spec.tolerance,
            })
            .collect(),
    };

    if requests.is_empty() {
        return Err(anyhow!("no point layers to associate"));
    }

    info!(
        "associating {} point layer(s) against '{lines}'",
        requests.len()
    );
    let report = associate_layers(&source, lines, &requests)?;
    report
        .write_csv_path(output)
        .with_context(|| format!("cannot write association artifact '{}'", output.display()))?;

    println!("\nAssociation summary ({} line(s)):\n", report.lines_read);
    println!("{}", display::association_table(&report));
    println!(
        "\n{} association(s) written to '{}'",
        report.associations.len(),
        output.display()
    );
    Ok(())
}

fn handle_layers(
    source_path: &std::path::Path,
    format: Option<&str>,
    network: bool,
) -> Result<()> {
    let source = open_source(source_path, parse_format(format)?)?;
    let audits = audit_layers(source.as_ref(), network)?;

    println!("\nLayers in '{}' ({} total):\n", source_path.display(), audits.len());
    println!("{}", display::audit_table(&audits));
    Ok(())
}

fn handle_specs() -> Result<()> {
    let config = PipelineConfig::builtin();
    println!("\nBuiltin layer specs ({} total):\n", config.layers.len());
    println!("{}", display::spec_table(&config));
    Ok(())
}
