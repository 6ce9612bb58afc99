use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored_json::{ColorMode, Output};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use tagsession::{SessionConfig, TagModel, TagStatus, TagUtility, WriteAction};

mod sim;

use crate::sim::{Field, SimReader};

#[derive(Parser, Debug)]
#[command(
    name = "tag-sim",
    version,
    about = "Run tag read and write sessions against a simulated reader"
)]
struct Cli {
    /// JSON file describing the tags in the field
    #[arg(short, long, value_name = "FILE", default_value = "tag.json")]
    tag: PathBuf,

    /// Session configuration in TOML
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Colorize output
    #[arg(long, value_enum, default_value_t = Color::Auto)]
    color: Color,

    /// Increase log verbosity, may be repeated
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Color {
    On,
    Off,
    Auto,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a tag file holding one blank tag
    Init {
        /// Payload capacity of the tag in bytes
        #[arg(long, default_value_t = 137)]
        capacity: usize,
        /// Make the tag read only
        #[arg(long)]
        read_only: bool,
        /// Overwrite an existing tag file
        #[arg(short, long)]
        force: bool,
    },
    /// Read the model stored on the tag
    Read,
    /// Append a record to the model stored on the tag
    Write {
        /// Record text
        message: String,
    },
    /// Replace the tag contents with a fresh model
    Setup {
        /// Name of the model
        name: String,
        /// Initial records
        #[arg(short, long = "record", value_name = "RECORD")]
        records: Vec<String>,
    },
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")
}

fn init_field(path: &Path, capacity: usize, read_only: bool, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Tag file '{}' already exists, use --force to overwrite",
            path.display()
        );
    }
    let status = if read_only {
        TagStatus::ReadOnly
    } else {
        TagStatus::ReadWrite
    };
    Field::blank(capacity, status).save(path)?;
    eprintln!("Created '{}'", path.display());
    Ok(())
}

fn print_model(model: &TagModel, color: Color) -> Result<()> {
    let should_colorize = match color {
        Color::On => true,
        Color::Off => false,
        Color::Auto => ColorMode::should_colorize(Output::StdOut),
    };
    let color_mode = if should_colorize {
        ColorMode::On
    } else {
        ColorMode::Off
    };
    let value = serde_json::to_value(model).context("Failed to serialize tag model")?;
    println!(
        "{}",
        colored_json::to_colored_json(&value, color_mode)
            .context("Failed to print tag model")?
    );
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let action = match cli.command {
        Commands::Init {
            capacity,
            read_only,
            force,
        } => return init_field(&cli.tag, capacity, read_only, force),
        Commands::Read => None,
        Commands::Write { message } => Some(WriteAction::Write(message)),
        Commands::Setup { name, records } => {
            Some(WriteAction::Setup(TagModel::new(name).with_records(records)))
        }
    };

    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => SessionConfig::default(),
    };

    let field = Field::load(&cli.tag)?;
    let utility = TagUtility::with_config(SimReader::new(field.clone()), config);
    debug!(config = ?utility.config(), "session configuration");

    let outcome = match action {
        None => utility.read().await,
        Some(action) => utility.write(action).await,
    };

    let after = utility.reader().field();
    if after != field {
        after.save(&cli.tag)?;
    }

    match outcome.context("Tag session failed")? {
        Some(model) => print_model(&model, cli.color),
        None => {
            eprintln!("Session ended without a result");
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    run(cli).await
}
