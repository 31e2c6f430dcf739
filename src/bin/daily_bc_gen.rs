//! Nightly driver: pull AM/PM precipitation observations for a date range
//! and stage them for a new set of bias-correction factors.
//!
//! Writes the binned lines to `<out>/kleio.stdout`, then loads them back
//! into a bucket -> station -> value map.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;

use nwac_wx_service::analysis::binning::{aggregate, PolicyTable};
use nwac_wx_service::config::{Config, DEFAULT_CONFIG_FILE};
use nwac_wx_service::ingest::db;
use nwac_wx_service::logging::{self, Component};
use nwac_wx_service::model::Granularity;
use nwac_wx_service::report;
use nwac_wx_service::stations::default_daily_stations;

const STDOUT_FILE: &str = "kleio.stdout";
const STDERR_FILE: &str = "kleio.stderr";
const FIELD: &str = "precipitation";

#[derive(Parser)]
#[command(
    name = "daily_bc_gen",
    about = "Gather observations to generate a new set of bias correction factors."
)]
struct Args {
    /// Start date, YYYYMMDD
    #[arg(short = 's', required = true)]
    start: String,

    /// End date, YYYYMMDD (inclusive); defaults to the start date
    #[arg(short = 'e')]
    end: Option<String>,

    /// Output directory, created if missing
    #[arg(short = 'o', required = true)]
    outdir: PathBuf,

    /// Stations by AWS ID [default: the nightly station list]
    #[arg(short = 'L', num_args = 1..)]
    stations: Vec<String>,

    /// Config file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

fn parse_yyyymmdd(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|_| format!("Invalid date '{}': expected YYYYMMDD", value))
}

fn prepare_outdir(outdir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(outdir)?;
    if fs::read_dir(outdir)?.next().is_some() {
        logging::warn(
            Component::System,
            None,
            &format!("Output directory ({}) is not empty", outdir.display()),
        );
    }
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let config = Config::load(&args.config)?;
    logging::init_logger(config.log_level()?, config.log_file.as_deref(), false);

    let first = parse_yyyymmdd(&args.start)?;
    let last = match args.end.as_deref() {
        Some(end) => parse_yyyymmdd(end)?,
        None => first,
    };
    if last < first {
        return Err(format!("End {} is before start {}", last, first).into());
    }

    prepare_outdir(&args.outdir)?;

    let stations: Vec<&str> = if args.stations.is_empty() {
        default_daily_stations()
    } else {
        args.stations.iter().map(String::as_str).collect()
    };
    let fields = [FIELD];
    let policy = PolicyTable::nwac_default();

    let fetched = db::connect(&config.database_url())
        .map_err(db::DbError::from)
        .and_then(|mut client| db::fetch_readings(&mut client, &stations, &fields, first, last, &policy));
    let readings = match fetched {
        Ok(readings) => readings,
        Err(e) => {
            logging::log_db_failure(None, "fetch precipitation", &e);
            fs::write(args.outdir.join(STDERR_FILE), format!("{}\n", e))?;
            return Err(e.into());
        }
    };

    let records = aggregate(&readings, &fields, Granularity::AmPm, &policy)?;
    let mut text = String::new();
    for record in &records {
        text.push_str(&report::format_bucket_line(record, &fields));
        text.push('\n');
    }
    let stdout_path = args.outdir.join(STDOUT_FILE);
    fs::write(&stdout_path, &text)?;
    logging::debug(
        Component::Binning,
        None,
        &format!("Wrote {} bucket lines to {}", records.len(), stdout_path.display()),
    );

    let (obs, skipped) = report::load_bucket_observations(&text);
    if skipped > 0 {
        logging::warn(Component::Binning, None, &format!("Skipped {} malformed bucket lines", skipped));
    }
    let with_data: std::collections::BTreeSet<&str> = obs
        .values()
        .flat_map(|by_station| by_station.keys().map(String::as_str))
        .collect();
    logging::info(
        Component::Binning,
        None,
        &format!(
            "Loaded observations for {} half-day buckets from {} of {} stations",
            obs.len(),
            with_data.len(),
            stations.len()
        ),
    );

    let missing: Vec<&str> = stations.iter().copied().filter(|s| !with_data.contains(s)).collect();
    for &station in &missing {
        logging::warn(Component::Database, Some(station), "No precipitation readings in range");
    }
    logging::log_run_summary(Component::Binning, stations.len(), stations.len() - missing.len(), missing.len());
    Ok(())
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
