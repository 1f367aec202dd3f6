//! Command-line interface for h5p-import.
//!
//! Provides commands for importing packages, copying and deleting package
//! records, downloading stored archives, and inspecting the catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::fs::File;

use crate::adapters::{build_object_store, ObjectStore, ZipExtractor};
use crate::config::{self, Settings, StorageConfig};
use crate::core::{Importer, PackageHooks};
use crate::domain::{Actor, PermissionLevel, Record};
use crate::records::{CatalogRecordStore, RecordStore};
use crate::validation::ManifestValidator;

/// Fallback actor when neither --actor nor USER is set
const DEFAULT_ACTOR: &str = "local";

/// h5p-import - Import and manage H5P content packages
#[derive(Parser, Debug)]
#[command(name = "h5p-import")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Member performing the operation (defaults to $USER)
    #[arg(long, global = true, env = "H5P_IMPORT_ACTOR")]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a package archive
    Import {
        /// Path to the .h5p archive ("-" reads stdin)
        file: PathBuf,

        /// Record name (required when reading stdin)
        #[arg(short, long)]
        name: Option<String>,

        /// Parent record to import into
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Copy a record (and its stored package)
    Copy {
        /// Record ID
        record_id: String,

        /// Destination parent record
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Delete a record (and its stored package)
    Delete {
        /// Record ID
        record_id: String,
    },

    /// Download the stored archive of a package record
    Download {
        /// Record ID
        record_id: String,

        /// Destination file
        dest: PathBuf,
    },

    /// Show a record
    Show {
        /// Record ID
        record_id: String,
    },

    /// List records
    List {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Grant a member a permission level on a record
    Grant {
        /// Record ID
        record_id: String,

        /// Member to grant
        member: String,

        /// Permission level (read, write, admin)
        level: PermissionLevel,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Wired-up components for one CLI invocation
struct App {
    settings: Settings,
    records: Arc<CatalogRecordStore>,
    importer: Importer,
}

impl App {
    fn build(settings: Settings) -> Result<Self> {
        let store: Arc<dyn ObjectStore> =
            build_object_store(&settings.storage).context("Failed to set up storage backend")?;
        let records = Arc::new(CatalogRecordStore::new(settings.catalog_path.clone()));

        Arc::new(PackageHooks::new(
            store.clone(),
            settings.path_prefix.clone(),
            settings.name_max_length,
        ))
        .register(records.as_ref());

        let validator =
            ManifestValidator::with_default_schema().context("Failed to compile manifest schema")?;
        let importer = Importer::new(
            settings.clone(),
            store,
            records.clone(),
            Arc::new(ZipExtractor::new()),
            validator,
        );

        Ok(Self {
            settings,
            records,
            importer,
        })
    }
}

impl Cli {
    fn resolve_actor(&self) -> Actor {
        let id = self
            .actor
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| DEFAULT_ACTOR.to_string());
        Actor::new(id)
    }

    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let actor = self.resolve_actor();
        let settings = config::load_settings()?;

        if let Commands::Config = self.command {
            return show_config(&settings);
        }

        let app = App::build(settings)?;

        match self.command {
            Commands::Import { file, name, parent } => {
                import_package(&app, &actor, &file, name, parent.as_deref()).await
            }
            Commands::Copy { record_id, parent } => {
                copy_record(&app, &actor, &record_id, parent.as_deref()).await
            }
            Commands::Delete { record_id } => delete_record(&app, &actor, &record_id).await,
            Commands::Download { record_id, dest } => {
                download_archive(&app, &actor, &record_id, &dest).await
            }
            Commands::Show { record_id } => show_record(&app, &actor, &record_id).await,
            Commands::List { limit } => list_records(&app, limit).await,
            Commands::Grant {
                record_id,
                member,
                level,
            } => grant(&app, &actor, &record_id, &member, level).await,
            Commands::Config => show_config(&app.settings),
        }
    }
}

/// Import a package from a file or stdin
async fn import_package(
    app: &App,
    actor: &Actor,
    file: &Path,
    name: Option<String>,
    parent: Option<&str>,
) -> Result<()> {
    let result = if file == Path::new("-") {
        let name = name.context("--name is required when reading from stdin")?;
        app.importer
            .import_package(tokio::io::stdin(), &name, actor, parent)
            .await
    } else {
        let name = match name {
            Some(name) => name,
            None => file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("Invalid archive path: {}", file.display()))?,
        };
        let archive = File::open(file)
            .await
            .with_context(|| format!("Failed to open archive: {}", file.display()))?;
        app.importer
            .import_package(archive, &name, actor, parent)
            .await
    };

    let record = result.map_err(|e| {
        let context = format!("Import failed [{} / {}]", e.code(), e.status_code());
        anyhow::Error::new(e).context(context)
    })?;

    eprintln!("Imported package");
    print_record(&record);
    Ok(())
}

async fn copy_record(app: &App, actor: &Actor, record_id: &str, parent: Option<&str>) -> Result<()> {
    let copy = app
        .records
        .copy_record(actor, record_id, parent)
        .await
        .with_context(|| format!("Failed to copy record {}", record_id))?;

    eprintln!("Copied {} -> {}", record_id, copy.id);
    print_record(&copy);
    Ok(())
}

async fn delete_record(app: &App, actor: &Actor, record_id: &str) -> Result<()> {
    let removed = app
        .records
        .delete_record(actor, record_id)
        .await
        .with_context(|| format!("Failed to delete record {}", record_id))?;

    eprintln!("Deleted {} ({})", removed.id, removed.name);
    Ok(())
}

async fn download_archive(app: &App, actor: &Actor, record_id: &str, dest: &Path) -> Result<()> {
    let record = app
        .records
        .get_record(actor, record_id)
        .await
        .with_context(|| format!("Failed to load record {}", record_id))?;

    let bytes = app
        .importer
        .download_archive(&record, dest, actor)
        .await
        .map_err(|e| {
            let context = format!("Download failed [{} / {}]", e.code(), e.status_code());
            anyhow::Error::new(e).context(context)
        })?;

    eprintln!("Wrote {} bytes to {}", bytes, dest.display());
    Ok(())
}

async fn show_record(app: &App, actor: &Actor, record_id: &str) -> Result<()> {
    let record = app
        .records
        .get_record(actor, record_id)
        .await
        .with_context(|| format!("Failed to load record {}", record_id))?;

    let json = serde_json::to_string_pretty(&record).context("Failed to serialize record")?;
    println!("{}", json);
    Ok(())
}

async fn list_records(app: &App, limit: usize) -> Result<()> {
    let records = app.records.list().await.context("Failed to read catalog")?;

    if records.is_empty() {
        println!("Catalog is empty. Use 'h5p-import import <file>' to add a package.");
        return Ok(());
    }

    println!("{:<38} {:<8} {:<40}", "ID", "TYPE", "NAME");
    println!("{}", "-".repeat(86));

    for record in records.iter().take(limit) {
        let name: String = if record.name.chars().count() > 37 {
            format!("{}...", record.name.chars().take(37).collect::<String>())
        } else {
            record.name.clone()
        };
        println!("{:<38} {:<8} {:<40}", record.id, record.kind, name);
    }

    println!("\nTotal: {} records", records.len());
    Ok(())
}

async fn grant(
    app: &App,
    actor: &Actor,
    record_id: &str,
    member: &str,
    level: PermissionLevel,
) -> Result<()> {
    app.records
        .grant(actor, record_id, member, level)
        .await
        .with_context(|| format!("Failed to grant {} on {}", level, record_id))?;

    eprintln!("Granted {} to {} on {}", level, member, record_id);
    Ok(())
}

fn print_record(record: &Record) {
    println!("  ID:   {}", record.id);
    println!("  Name: {}", record.name);
    println!("  Type: {}", record.kind);
    if let Some(extra) = record.package_extra() {
        println!("  Content ID: {}", extra.content_id);
        println!("  Archive:    {}", extra.h5p_file_path);
        println!("  Content:    {}", extra.content_file_path);
    }
    if let Some(parent) = &record.parent_id {
        println!("  Parent: {}", parent);
    }
}

/// Show the resolved configuration (for debugging)
fn show_config(settings: &Settings) -> Result<()> {
    println!("h5p-import configuration");
    println!();
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:        {}", settings.home.display());
    println!("  Staging:     {}", settings.staging_dir.display());
    println!("  Catalog:     {}", settings.catalog_path.display());
    println!("  Path prefix: {}", settings.path_prefix);
    println!();
    println!("Storage:");
    match &settings.storage {
        StorageConfig::Local { root } => println!("  Local: {}", root.display()),
        StorageConfig::Remote { endpoint, token } => {
            println!("  Remote: {}", endpoint);
            println!("  Token:  {}", if token.is_some() { "(set)" } else { "(none)" });
        }
    }
    println!();
    println!("Limits:");
    println!("  Max archive size:       {} bytes", settings.max_archive_bytes);
    println!("  Max concurrent uploads: {}", settings.max_concurrent_uploads);
    println!("  Max name length:        {}", settings.name_max_length);

    Ok(())
}
