//! Command line access to the NWAC weather database.
//!
//! Lists stations, or fetches readings for a date range and optionally
//! bins them daily or into AM/PM halves:
//!
//! ```text
//! kleio -s 20190101 -e 20190107 --bin ampm -L HUR MTB -F precipitation
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use nwac_wx_service::analysis::binning::{aggregate, PolicyTable};
use nwac_wx_service::config::{Config, DEFAULT_CONFIG_FILE};
use nwac_wx_service::ingest::db;
use nwac_wx_service::logging::{self, Component};
use nwac_wx_service::model::Granularity;
use nwac_wx_service::report;
use nwac_wx_service::stations::default_daily_stations;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Bin {
    None,
    Daily,
    Ampm,
}

impl From<Bin> for Granularity {
    fn from(bin: Bin) -> Self {
        match bin {
            Bin::None => Granularity::None,
            Bin::Daily => Granularity::Daily,
            Bin::Ampm => Granularity::AmPm,
        }
    }
}

#[derive(Parser)]
#[command(name = "kleio", about = "Provides access to the NWAC database.")]
struct Args {
    /// List all weather stations
    #[arg(short = 'S', long = "list-stations")]
    list_stations: bool,

    /// Print query in lieu of outputting data from DB
    #[arg(short = 'q', long = "print-query")]
    print_query: bool,

    /// Start date, YYYYMMDD
    #[arg(short = 's')]
    start: Option<String>,

    /// End date, YYYYMMDD (inclusive); defaults to the start date
    #[arg(short = 'e')]
    end: Option<String>,

    /// Time binning
    #[arg(long = "bin", value_enum, default_value = "none")]
    bin: Bin,

    /// Stations by AWS ID
    #[arg(short = 'L', num_args = 1..)]
    stations: Vec<String>,

    /// Sensor fields to fetch
    #[arg(short = 'F', num_args = 1.., default_value = "precipitation")]
    fields: Vec<String>,

    /// Emit JSON instead of text columns
    #[arg(long)]
    json: bool,

    /// Config file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

fn parse_yyyymmdd(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|_| format!("Invalid date '{}': expected YYYYMMDD", value))
}

fn list_stations(args: &Args, config: &Config) -> Result<(), Box<dyn Error>> {
    if args.print_query {
        println!("{}", db::list_stations_query());
        return Ok(());
    }

    let mut client = db::connect(&config.database_url())?;
    for station in db::list_stations(&mut client)? {
        let aws_id = match station.aws_id() {
            Some(id) => id,
            None => {
                logging::warn(Component::Database, Some(station.code.as_str()), "Unexpected format for station code");
                station.code.as_str()
            }
        };
        println!("{:3} {:3} {}", station.id, aws_id, station.title);
    }
    Ok(())
}

fn readings(args: &Args, config: &Config) -> Result<(), Box<dyn Error>> {
    let start = args
        .start
        .as_deref()
        .ok_or("A start date (-s) is required unless listing stations")?;
    let first = parse_yyyymmdd(start)?;
    let last = match args.end.as_deref() {
        Some(end) => parse_yyyymmdd(end)?,
        None => first,
    };
    if last < first {
        return Err(format!("End {} is before start {}", last, first).into());
    }

    let stations: Vec<&str> = if args.stations.is_empty() {
        default_daily_stations()
    } else {
        args.stations.iter().map(String::as_str).collect()
    };
    let fields: Vec<&str> = args.fields.iter().map(String::as_str).collect();
    let policy = PolicyTable::nwac_default();

    let query = db::build_readings_query(&fields, &policy)?;
    if args.print_query {
        println!("{}", db::describe_readings_query(&query, &stations, first, last));
        return Ok(());
    }

    let mut client = db::connect(&config.database_url())?;
    let readings = db::fetch_readings(&mut client, &stations, &fields, first, last, &policy)
        .inspect_err(|e| logging::log_db_failure(None, "fetch readings", e))?;

    match Granularity::from(args.bin) {
        Granularity::None => {
            if args.json {
                println!("{}", report::readings_to_json(&readings)?);
            } else {
                for reading in &readings {
                    println!("{}", report::format_reading_line(reading, &fields));
                }
            }
        }
        granularity => {
            let records = aggregate(&readings, &fields, granularity, &policy)?;
            logging::debug(
                Component::Binning,
                None,
                &format!("{} readings folded into {} buckets", readings.len(), records.len()),
            );
            if args.json {
                println!("{}", report::records_to_json(&records)?);
            } else {
                for record in &records {
                    println!("{}", report::format_bucket_line(record, &fields));
                }
            }
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let config = Config::load(&args.config)?;
    logging::init_logger(config.log_level()?, config.log_file.as_deref(), false);

    if args.list_stations {
        list_stations(&args, &config)
    } else {
        readings(&args, &config)
    }
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
