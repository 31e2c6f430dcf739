//! Generate precipitation correction factors for NWAC stations from the
//! bias-correction CSV.
//!
//! Per-day stdout output: `<date> <station> <fcst> <obs> <cf> <fcst w/ cf>`.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;

use nwac_wx_service::analysis::bias_correction::compute_bias_correction;
use nwac_wx_service::analysis::skill::ForecastSkill;
use nwac_wx_service::config::{Config, DEFAULT_CONFIG_FILE};
use nwac_wx_service::ingest::csv_series::BiasTable;
use nwac_wx_service::logging::{self, Component};
use nwac_wx_service::report;
use nwac_wx_service::stations::{is_bias_csv_station, BIAS_CSV_STATIONS};

#[derive(Parser)]
#[command(name = "gen_bc", about = "Generate correction factor for NWAC wx data.")]
struct Args {
    /// Start date, YYYYMMDD
    #[arg(short = 's', default_value = "20181211")]
    start: String,

    /// End date, YYYYMMDD (inclusive)
    #[arg(short = 'e', default_value = "20190430")]
    end: String,

    /// Path to input CSV file [default: <project_dir>/BiasCorrectionData.csv]
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Path to output directory [default: <project_dir>/outdir]
    #[arg(short = 'o', long = "output")]
    outdir: Option<PathBuf>,

    /// Silence the per-day correction factor lines
    #[arg(short = 'S')]
    silence: bool,

    /// Config file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Stations to analyze; must match CSV headers. Defaults to all known.
    stations: Vec<String>,
}

fn parse_yyyymmdd(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|_| format!("Invalid date '{}': expected YYYYMMDD", value))
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let config = Config::load(&args.config)?;
    logging::init_logger(config.log_level()?, config.log_file.as_deref(), false);

    let start = parse_yyyymmdd(&args.start)?;
    let end = parse_yyyymmdd(&args.end)?;
    if start >= end {
        return Err(format!("Start must be before end. You specified: {} to {}", start, end).into());
    }

    let stations: Vec<String> = if args.stations.is_empty() {
        BIAS_CSV_STATIONS.iter().map(|s| s.to_string()).collect()
    } else {
        let unknown: Vec<&str> = args
            .stations
            .iter()
            .map(String::as_str)
            .filter(|s| !is_bias_csv_station(s))
            .collect();
        if !unknown.is_empty() {
            return Err(format!("Invalid station names specified: {}", unknown.join(" ")).into());
        }
        args.stations.clone()
    };

    let outdir = args.outdir.clone().unwrap_or_else(|| config.output_dir());
    std::fs::create_dir_all(&outdir)?;

    let input = args.input.clone().unwrap_or_else(|| config.input_csv_path());
    let table = BiasTable::from_path(&input, start, end)?;
    logging::info(
        Component::Csv,
        None,
        &format!("Loaded {} days from {}", table.dates.len(), input.display()),
    );

    let params = config.bias_params()?;
    let mut failed = 0;

    for station in &stations {
        let station = station.as_str();
        let result = table
            .station_series(station)
            .map_err(|e| e.to_string())
            .and_then(|series| compute_bias_correction(&series, &params).map_err(|e| e.to_string()));

        let days = match result {
            Ok(days) => days,
            Err(e) => {
                logging::error(Component::BiasCorrection, Some(station), &e);
                failed += 1;
                continue;
            }
        };

        if !args.silence {
            for day in &days[..days.len() - 1] {
                println!("{}", report::format_daily_line(station, day));
            }
        }

        let path = report::write_station_table(&outdir, station, &days)?;
        logging::debug(Component::BiasCorrection, Some(station), &format!("Wrote {}", path.display()));

        match ForecastSkill::from_days(&days) {
            Some(skill) => logging::info(Component::BiasCorrection, Some(station), &report::format_skill(station, &skill)),
            None => logging::warn(Component::BiasCorrection, Some(station), "No usable days for skill summary"),
        }
    }

    logging::log_run_summary(Component::BiasCorrection, stations.len(), stations.len() - failed, failed);
    if failed > 0 && failed == stations.len() {
        return Err("No station could be processed".into());
    }
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
