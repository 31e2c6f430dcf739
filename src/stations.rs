/// Station registry for the NWAC weather network.
///
/// Stations go by three names depending on who is asking:
///   - the AWS ID used by our own loggers and the database ("HUR"),
///   - the Mesowest ID used by the Synoptic/Mesowest feeds ("HUR53"),
///   - the database station code, which is the AWS ID prefixed with "oso"
///     ("osoHUR").
///
/// This is the single source of truth for those mappings; all other
/// modules should translate station names through here rather than
/// hardcoding them.

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Prefix the weather database puts in front of every AWS ID.
pub const DB_CODE_PREFIX: &str = "oso";

/// Metadata for a single NWAC weather station.
pub struct Station {
    /// Three-character AWS identifier.
    pub aws_id: &'static str,
    /// Mesowest identifier.
    pub mesowest_id: &'static str,
    pub name: &'static str,
    /// Whether the nightly bias-correction run pulls observations for this
    /// station by default.
    pub daily_bias_correction: bool,
}

/// All NWAC stations with both an AWS and a Mesowest identifier.
pub static STATION_REGISTRY: &[Station] = &[
    Station { aws_id: "HUR", mesowest_id: "HUR53", name: "Hurricane Ridge", daily_bias_correction: true },
    Station { aws_id: "MTB", mesowest_id: "MTB42", name: "Mt. Baker Ski Area", daily_bias_correction: true },
    Station { aws_id: "MAZ", mesowest_id: "MAZ22", name: "Mazama", daily_bias_correction: false },
    Station { aws_id: "WAS", mesowest_id: "WAP55", name: "Washington Pass", daily_bias_correction: true },
    Station { aws_id: "LAK", mesowest_id: "LAK19", name: "Lake Wenatchee", daily_bias_correction: false },
    Station { aws_id: "BRN", mesowest_id: "BRN27", name: "Berne", daily_bias_correction: false },
    Station { aws_id: "STS", mesowest_id: "STS40", name: "Stevens Pass - Schmidt Haus", daily_bias_correction: true },
    Station { aws_id: "stb", mesowest_id: "STB48", name: "Stevens Pass - Brooks", daily_bias_correction: false },
    // Not unique as an AWS ID, so it stays out of the nightly run.
    Station { aws_id: "TUM", mesowest_id: "LVN11", name: "Tumwater Mountain", daily_bias_correction: false },
    Station { aws_id: "ALL", mesowest_id: "ALP31", name: "Alpental", daily_bias_correction: false },
    Station { aws_id: "SSM", mesowest_id: "SNO30", name: "Snoqualmie Pass", daily_bias_correction: true },
    Station { aws_id: "BLT", mesowest_id: "BLT41", name: "Blewett Pass", daily_bias_correction: false },
    Station { aws_id: "MSM", mesowest_id: "MSR52", name: "Mission Ridge", daily_bias_correction: true },
    Station { aws_id: "CMT", mesowest_id: "CMT43", name: "Crystal Mountain", daily_bias_correction: true },
    Station { aws_id: "CHL", mesowest_id: "CHP55", name: "Chinook Pass", daily_bias_correction: false },
    Station { aws_id: "PVC", mesowest_id: "PVC54", name: "Paradise", daily_bias_correction: true },
    Station { aws_id: "WPS", mesowest_id: "WPS58", name: "White Pass", daily_bias_correction: true },
    Station { aws_id: "MSH", mesowest_id: "MSH33", name: "Mt. St. Helens", daily_bias_correction: false },
    Station { aws_id: "TML", mesowest_id: "TIM59", name: "Timberline", daily_bias_correction: true },
    Station { aws_id: "MHL", mesowest_id: "MHM54", name: "Mt. Hood Meadows", daily_bias_correction: true },
    Station { aws_id: "SBL", mesowest_id: "GVT36", name: "Mt. Hood Ski Bowl", daily_bias_correction: false },
];

/// Column prefixes in the bias-correction CSV, which predates the AWS IDs.
/// `<prefix>1` holds the observation and `<prefix>4` the forecast.
pub static BIAS_CSV_STATIONS: &[&str] = &[
    "HUR", "MTB", "WAP", "STV", "SNO", "LVN", "MIS", "CMT", "PAR", "WHP", "TML", "MHM",
];

/// Looks up a station by AWS ID. Returns `None` if not found.
pub fn find_station(aws_id: &str) -> Option<&'static Station> {
    STATION_REGISTRY.iter().find(|s| s.aws_id == aws_id)
}

pub fn mesowest_to_aws(mesowest_id: &str) -> Option<&'static str> {
    STATION_REGISTRY
        .iter()
        .find(|s| s.mesowest_id == mesowest_id)
        .map(|s| s.aws_id)
}

pub fn aws_to_mesowest(aws_id: &str) -> Option<&'static str> {
    find_station(aws_id).map(|s| s.mesowest_id)
}

/// AWS IDs pulled by the nightly bias-correction run, in run order.
pub fn default_daily_stations() -> Vec<&'static str> {
    STATION_REGISTRY
        .iter()
        .filter(|s| s.daily_bias_correction)
        .map(|s| s.aws_id)
        .collect()
}

/// Returns true if `name` is a column prefix of the bias-correction CSV.
pub fn is_bias_csv_station(name: &str) -> bool {
    BIAS_CSV_STATIONS.contains(&name)
}

/// Database station code for an AWS ID, e.g. "HUR" -> "osoHUR".
pub fn db_code_for(aws_id: &str) -> String {
    format!("{}{}", DB_CODE_PREFIX, aws_id)
}

/// Extracts the AWS ID from a database station code.
///
/// Returns `None` unless the code is exactly "oso" followed by three
/// characters.
pub fn aws_id_from_db_code(code: &str) -> Option<&str> {
    if code.len() != DB_CODE_PREFIX.len() + 3 {
        return None;
    }
    code.strip_prefix(DB_CODE_PREFIX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
