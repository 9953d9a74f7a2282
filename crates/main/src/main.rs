use std::error::Error;
use std::path::{Path, PathBuf};

use calibration_report::group::{group_records, GroupOrder};
use calibration_report::record::DateRange;
use calibration_report::source::{InstrumentCatalog, JsonRecordsFile, RecordSource, SheetSource};
use calibration_report::{BatchOrchestrator, CalibrationRecord, PdfRenderer, ReportConfig, RunSummary};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

/// Generates per-instrument calibration reports and bundles them into a zip archive.
///
/// Fonts are looked up under `CALIB_REPORT_FONTS_DIR`, then `assets/fonts` next to the
/// binary or the crate, then common system locations.
#[derive(Parser)]
#[command(author, version, about = "Calibration report generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one PDF per instrument and write them together with the archive.
    Generate(GenerateArgs),

    /// List the instruments found in the input with their record counts.
    #[command(aliases = ["list"])]
    Groups(InputArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum InputKind {
    /// JSON array of spreadsheet rows keyed by column header.
    Sheet,
    /// JSON array of structured calibration records.
    Records,
}

#[derive(Args)]
struct InputArgs {
    /// Input file with the calibration data.
    #[arg(long)]
    records: PathBuf,

    #[arg(long, value_enum, default_value_t = InputKind::Sheet)]
    input: InputKind,

    /// JSON report configuration, including the sheet column layout.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep only records calibrated on or after this date (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Keep only records calibrated on or before this date (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Order instruments by identifier instead of first appearance.
    #[arg(long)]
    sorted: bool,
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Sheet rows describing each instrument, keyed by the configured catalog key.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Sheet rows describing the calibration masters, keyed by serial number.
    #[arg(long)]
    master_catalog: Option<PathBuf>,

    /// Logo placed in every report header. Overrides the configuration.
    #[arg(long)]
    branding: Option<PathBuf>,

    /// Output directory for the reports and the archive.
    #[arg(long, default_value = "reports")]
    out: PathBuf,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

impl InputArgs {
    fn report_config(&self) -> Result<ReportConfig, Box<dyn Error>> {
        let config = match &self.config {
            Some(path) => ReportConfig::from_json_file(path)?,
            None => ReportConfig::default(),
        };
        Ok(if self.sorted {
            config.with_group_order(GroupOrder::InstrumentId)
        } else {
            config
        })
    }

    fn load(&self, config: &ReportConfig) -> Result<Vec<CalibrationRecord>, Box<dyn Error>> {
        let records = match self.input {
            InputKind::Sheet => {
                SheetSource::from_json_file(&self.records, config.sheet_layout.clone())?.fetch()?
            }
            InputKind::Records => JsonRecordsFile::new(&self.records).fetch()?,
        };
        let range = DateRange::new(self.from, self.to);
        let total = records.len();
        let records = range.retain(records);
        if records.len() != total {
            info!("Date filter kept {} of {} records", records.len(), total);
        }
        Ok(records)
    }
}

fn load_catalog(path: Option<&PathBuf>, key_column: &str) -> Result<InstrumentCatalog, Box<dyn Error>> {
    Ok(match path {
        Some(path) => InstrumentCatalog::from_json_file(path, key_column)?,
        None => InstrumentCatalog::new(),
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate(args) => generate(args),
        Commands::Groups(args) => list_groups(args),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn generate(args: GenerateArgs) -> Result<(), Box<dyn Error>> {
    let mut config = args.input.report_config()?;
    if let Some(branding) = &args.branding {
        config = config.with_branding(branding);
    }

    let catalog = load_catalog(args.catalog.as_ref(), &config.catalog_key)?;
    let masters = load_catalog(args.master_catalog.as_ref(), &config.master_catalog_key)?;

    let records = args.input.load(&config)?;
    let archive_name = config.archive_name.clone();
    let orchestrator = BatchOrchestrator::new(PdfRenderer::new(), config)
        .with_catalog(catalog)
        .with_master_catalog(masters);
    let (bundle, summary) = orchestrator.run_batch(records)?;
    let written = bundle.write_to_dir(&args.out, &archive_name)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, written.last().map(PathBuf::as_path));
    }
    Ok(())
}

fn list_groups(args: InputArgs) -> Result<(), Box<dyn Error>> {
    let config = args.report_config()?;
    let records = args.load(&config)?;
    for group in group_records(records, config.group_order) {
        println!("{}\t{}", group.instrument_id(), group.len());
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, archive: Option<&Path>) {
    println!(
        "Generated {} report(s), {} failed",
        summary.succeeded, summary.failed
    );
    for failure in &summary.failures {
        println!("  {}: {}", failure.instrument_id, failure.reason);
    }
    match archive {
        Some(archive) => println!("Archive: {}", archive.display()),
        None => println!("No reports generated; no archive written"),
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
