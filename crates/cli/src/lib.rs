use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use wsi_annotations_core::{AnnotationEngine, EngineConfig, EngineEvent, ExportOptions, ImportOptions};
use wsi_annotations_storage::Storage;

#[derive(Debug, Parser)]
#[command(name = "wsi-annotations")]
#[command(about = "Inspect, convert and store slide annotations")]
pub struct Cli {
    /// Engine configuration file; `WSI_ANNOTATIONS_*` variables otherwise.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print a machine-readable summary of an annotation file.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Format tried first before falling back to the others.
        #[arg(long)]
        from: Option<String>,
    },
    /// Convert an annotation file to another format.
    Convert {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        to: String,
        #[arg(long)]
        from: Option<String>,
        /// Written to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the supported formats.
    Formats,
    /// Work with the local annotation store.
    Store {
        /// Store directory; the platform data directory by default.
        #[arg(long, global = true, value_name = "DIR")]
        root: Option<PathBuf>,
        #[command(subcommand)]
        command: StoreCommands,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum StoreCommands {
    /// List slides, or the records of one slide.
    List {
        #[arg(long)]
        tissue: Option<String>,
    },
    /// Save an annotation file as a new record.
    Push {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        tissue: String,
        #[arg(long)]
        from: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    format: String,
    annotations: usize,
    presets: Vec<String>,
    layers: usize,
    factories: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
struct FormatOutput<'a> {
    format: &'a str,
    suffix: &'static str,
}

#[derive(Debug, Serialize)]
struct RecordOutput {
    id: String,
    metadata: BTreeMap<String, String>,
    bytes: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { file, from } => run_info(config, &file, from),
        Commands::Convert { file, to, from, output } => run_convert(config, &file, &to, from, output.as_deref()),
        Commands::Formats => run_formats(config),
        Commands::Store { root, command } => {
            let storage = match root {
                Some(root) => Storage::with_root(root),
                None => Storage::from_default_project().context("failed to resolve the store directory")?,
            };
            match command {
                StoreCommands::List { tissue } => run_store_list(&storage, tissue.as_deref()),
                StoreCommands::Push { file, tissue, from } => run_store_push(config, &storage, &file, &tissue, from),
            }
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => EngineConfig::from_env().context("invalid WSI_ANNOTATIONS_* environment"),
    }
}

/// Engine holding the content of `file`, with the format that decoded it
fn load_engine(config: EngineConfig, file: &Path, from: Option<String>) -> Result<(AnnotationEngine, String)> {
    ensure_file_exists(file)?;
    let data = fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;

    let mut engine = AnnotationEngine::builder().with_config(config).build().context("failed to set up the engine")?;
    let events = engine.events_mut().channel();

    let options = ImportOptions { format: from, inherit_session: true };
    if !engine.import(&data, &options, true) {
        anyhow::bail!("failed to import annotations from {}", file.display());
    }
    let format = events
        .try_iter()
        .find_map(|event| match event {
            EngineEvent::Import { imported: true, format } => format,
            _ => None,
        })
        .unwrap_or_else(|| engine.config().default_format.clone());
    tracing::debug!(path = %file.display(), %format, "annotation file loaded");
    Ok((engine, format))
}

fn run_info(config: EngineConfig, file: &Path, from: Option<String>) -> Result<()> {
    let (engine, format) = load_engine(config, file, from)?;

    let mut factories = BTreeMap::new();
    for object in engine.objects() {
        *factories.entry(object.factory_id.clone()).or_insert(0) += 1;
    }
    let payload = InfoOutput {
        path: file.display().to_string(),
        format,
        annotations: engine.objects().count(),
        presets: engine.presets().ids(),
        layers: engine.layers().len(),
        factories,
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_convert(config: EngineConfig, file: &Path, to: &str, from: Option<String>, output: Option<&Path>) -> Result<()> {
    let (mut engine, _) = load_engine(config, file, from)?;
    if !engine.convertors().contains(to) {
        anyhow::bail!("unknown format '{to}', see `wsi-annotations formats`");
    }

    let data = engine
        .export(&ExportOptions::with_format(to), true, true)
        .with_context(|| format!("failed to export as {to}"))?;

    match output {
        Some(output) => {
            if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(output, data).with_context(|| format!("failed to write {}", output.display()))?;
            println!("{}", output.display());
        }
        None => println!("{data}"),
    }
    Ok(())
}

fn run_formats(config: EngineConfig) -> Result<()> {
    let engine = AnnotationEngine::builder().with_config(config).build().context("failed to set up the engine")?;
    let registry = engine.convertors();

    let mut formats = Vec::new();
    for format in registry.formats() {
        formats.push(FormatOutput { format, suffix: registry.suffix(format)? });
    }
    println!("{}", serde_json::to_string_pretty(&formats)?);
    Ok(())
}

fn run_store_list(storage: &Storage, tissue: Option<&str>) -> Result<()> {
    let store = storage.annotation_store();
    let json = match tissue {
        Some(tissue) => {
            let records: Vec<RecordOutput> = store
                .records(tissue)
                .context("failed to read the annotation store")?
                .into_iter()
                .map(|record| RecordOutput { bytes: record.data.len(), id: record.id, metadata: record.metadata })
                .collect();
            serde_json::to_string_pretty(&records)?
        }
        None => serde_json::to_string_pretty(&store.tissues().context("failed to read the annotation store")?)?,
    };
    println!("{json}");
    Ok(())
}

fn run_store_push(
    config: EngineConfig,
    storage: &Storage,
    file: &Path,
    tissue: &str,
    from: Option<String>,
) -> Result<()> {
    let (mut engine, format) = load_engine(config, file, from)?;
    let mut store = storage.annotation_store();

    let id = engine
        .upload_to_store(&mut store, tissue, &ExportOptions::with_format(format))
        .context("failed to save annotations")?;
    println!("{id}");
    Ok(())
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
