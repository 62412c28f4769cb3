//! Policy Store CLI
//!
//! Operator commands over the rule table: bootstrap, listing, import and
//! export of policy files, and filtered removal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use policy_store::{
    Filter, MemoryModel, PolicyAdapter, PolicyModel, RuleRow, StoreConfig, PERSISTED_SECTIONS,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Manage access-control policy rules stored in SQLite
#[derive(Parser, Debug)]
#[command(name = "policy-store", version, about)]
pub struct Cli {
    /// Configuration file (TOML); `POLICY_STORE_*` variables override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the rule table if it does not exist
    Init,
    /// Print stored rules as policy lines
    List {
        /// Raw SQL predicate, e.g. "v0 = 'alice'"
        #[arg(long)]
        filter: Option<String>,
        /// Print the loaded model as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save every rule of a policy file
    Import {
        /// Policy file, one `ptype, v0, v1, ...` rule per line
        file: PathBuf,
    },
    /// Write every stored rule to a policy file, or stdout
    Export { file: Option<PathBuf> },
    /// Remove rules whose fields from FIELD_INDEX on match VALUES
    Remove {
        ptype: String,
        field_index: usize,
        values: Vec<String>,
    },
}

/// Initialize logging on stderr
pub fn init_logging(level: &str) -> Result<()> {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Load configuration, connect, and run one command
pub async fn run(cli: Cli) -> Result<()> {
    let config = StoreConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.log_level)?;

    let mut adapter = PolicyAdapter::connect(&config)
        .await
        .with_context(|| format!("Failed to open policy store at {}", config.database_url))?;

    let stdout = std::io::stdout();
    execute(&mut adapter, cli.command, &mut stdout.lock()).await
}

/// Run a command against an open adapter
pub async fn execute<W: Write>(
    adapter: &mut PolicyAdapter,
    command: Command,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Init => {
            adapter.init_table().await?;
        }
        Command::List { filter, json } => {
            let mut model = MemoryModel::new();
            match filter {
                Some(predicate) => {
                    adapter
                        .load_filtered_policy(&mut model, &Filter::raw(predicate))
                        .await?
                }
                None => adapter.load_policy(&mut model).await?,
            }

            if json {
                serde_json::to_writer_pretty(&mut *out, &model)?;
                writeln!(out)?;
            } else {
                for line in policy_lines(&model)? {
                    writeln!(out, "{line}")?;
                }
            }
        }
        Command::Import { file } => {
            let model = read_policy_file(&file)?;
            adapter.save_policy(&model).await?;
            info!("Imported {} rules from {}", model.policy_count(), file.display());
        }
        Command::Export { file } => {
            let mut model = MemoryModel::new();
            adapter.load_policy(&mut model).await?;
            let lines = policy_lines(&model)?;

            match file {
                Some(path) => {
                    let mut contents = lines.join("\n");
                    contents.push('\n');
                    std::fs::write(&path, contents)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Exported {} rules to {}", lines.len(), path.display());
                }
                None => {
                    for line in lines {
                        writeln!(out, "{line}")?;
                    }
                }
            }
        }
        Command::Remove {
            ptype,
            field_index,
            values,
        } => {
            let sec = MemoryModel::section_of(&ptype)?;
            let removed = adapter
                .remove_filtered_policy(sec, &ptype, field_index, &values)
                .await?;
            writeln!(out, "removed {removed} rules")?;
        }
    }

    Ok(())
}

/// Parse a policy file into a model
pub fn read_policy_file(path: &Path) -> Result<MemoryModel> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut model = MemoryModel::new();
    for (number, line) in contents.lines().enumerate() {
        model
            .load_policy_line(line)
            .with_context(|| format!("{}:{}", path.display(), number + 1))?;
    }
    Ok(model)
}

/// Every rule of a model as policy lines, policy section first
pub fn policy_lines(model: &MemoryModel) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for sec in PERSISTED_SECTIONS {
        for (ptype, rules) in model.policies(sec) {
            for rule in rules {
                lines.push(RuleRow::encode(ptype, rule)?.decode_line());
            }
        }
    }
    Ok(lines)
}
