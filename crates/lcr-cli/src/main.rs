//! LCR snapshot CLI - ingest daily extracts and query dated snapshots

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lcr_core::DateKey;
use lcr_engine::{Engine, EngineConfig, Upload};
use lcr_xlsx::{Package, Patcher};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lcr")]
#[command(author, version, about = "Build and query dated LCR snapshot workbooks")]
struct Cli {
    /// Data directory holding uploads, history and the snapshot store
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process an extract into the snapshot for its date
    Ingest {
        /// Extract workbook to upload
        input: PathBuf,

        /// Date key (YYYY-MM-DD); inferred from the file name when omitted
        #[arg(short, long)]
        date: Option<String>,

        /// File name to record instead of the input's own
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show the latest snapshot, or the one for a date
    Latest {
        #[arg(short, long)]
        date: Option<String>,
    },

    /// List every date with a snapshot, newest first
    Dates,

    /// Copy a history artifact out of the data directory
    Fetch {
        /// Artifact name, e.g. 2026-02-04.xlsx
        name: String,

        /// Destination (default: print the artifact's path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show which template a patch would use
    Template,

    /// Show the reference result for a date, if one exists
    Reference {
        date: String,
    },

    /// Patch an extract into a template directly, bypassing the store
    Patch {
        /// Extract workbook
        input: PathBuf,

        /// Template workbook
        #[arg(short, long)]
        template: PathBuf,

        /// Output workbook
        #[arg(short, long)]
        output: PathBuf,

        /// Date key written to the header cell
        #[arg(short, long)]
        date: String,
    },

    /// List all sheets in a workbook
    Sheets {
        input: PathBuf,
    },

    /// Print the spreadsheet date serial for a date
    Serial {
        date: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { input, date, name } => ingest(&engine(&cli.data_dir)?, &input, date, name),
        Commands::Latest { date } => print_json(&engine(&cli.data_dir)?.latest(date.as_deref())),
        Commands::Dates => print_json(&engine(&cli.data_dir)?.dates()),
        Commands::Fetch { name, output } => fetch(&engine(&cli.data_dir)?, &name, output.as_deref()),
        Commands::Template => show_template(&engine(&cli.data_dir)?),
        Commands::Reference { date } => show_reference(&engine(&cli.data_dir)?, &date),
        Commands::Patch {
            input,
            template,
            output,
            date,
        } => patch(&input, &template, &output, &date),
        Commands::Sheets { input } => list_sheets(&input),
        Commands::Serial { date } => {
            let key = parse_date(&date)?;
            println!("{}", key.serial());
            Ok(())
        }
    }
}

fn engine(data_dir: &Path) -> Result<Engine> {
    let config = EngineConfig::from_env(data_dir).context("Invalid environment configuration")?;
    Engine::new(&config)
        .with_context(|| format!("Failed to prepare data directory '{}'", data_dir.display()))
}

fn parse_date(raw: &str) -> Result<DateKey> {
    DateKey::parse(raw).with_context(|| format!("Invalid date '{raw}'. Use YYYY-MM-DD."))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("Failed to encode JSON")?;
    writeln!(stdout).context("Failed to write to stdout")?;
    Ok(())
}

fn ingest(engine: &Engine, input: &Path, date: Option<String>, name: Option<String>) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read '{}'", input.display()))?;
    let filename = name.unwrap_or_else(|| {
        input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let mut upload = Upload::new(bytes, filename);
    upload.date = date;

    eprintln!("Processing '{}'...", input.display());
    let outcome = engine.ingest(upload);
    print_json(&outcome)?;

    match outcome.error {
        Some(error) if !outcome.ok => bail!(error),
        _ => Ok(()),
    }
}

fn fetch(engine: &Engine, name: &str, output: Option<&Path>) -> Result<()> {
    let path = engine.history_file(name)?;
    match output {
        Some(dest) => {
            std::fs::copy(&path, dest)
                .with_context(|| format!("Failed to write '{}'", dest.display()))?;
            eprintln!("Wrote '{}'", dest.display());
        }
        None => println!("{}", path.display()),
    }
    Ok(())
}

fn show_template(engine: &Engine) -> Result<()> {
    let path = engine.dispatcher().templates().resolve()?;
    println!("{}", path.display());
    Ok(())
}

fn show_reference(engine: &Engine, date: &str) -> Result<()> {
    let key = parse_date(date)?;
    match engine.dispatcher().references().resolve(&key) {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("No reference result for {key}");
            eprintln!("Strategy: {}", engine.dispatcher().strategy_for(&key).mode());
        }
    }
    Ok(())
}

fn patch(input: &Path, template: &Path, output: &Path, date: &str) -> Result<()> {
    let key = parse_date(date)?;
    let report = Patcher::default()
        .patch_file(input, template, output, key)
        .with_context(|| format!("Failed to patch '{}'", template.display()))?;

    eprintln!(
        "Wrote {} cells to {} ({} new shared strings, {} formulas replaced)",
        report.cells_written, report.sheet_path, report.strings_added, report.formulas_cleared
    );
    if report.formulas_detached > 0 {
        eprintln!("Rewrote {} shared formulas whose first cell was overwritten", report.formulas_detached);
    }
    eprintln!("Saved '{}'", output.display());
    Ok(())
}

fn list_sheets(input: &Path) -> Result<()> {
    let package =
        Package::open(input).with_context(|| format!("Failed to open '{}'", input.display()))?;

    for (i, sheet) in package.sheets()?.iter().enumerate() {
        println!("{}\t{}\t{}", i + 1, sheet.name, sheet.path.as_deref().unwrap_or("-"));
    }
    Ok(())
}
