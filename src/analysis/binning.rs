//! Time-bucket aggregation of raw sensor readings.
//!
//! Loggers report hourly, and a value stamped at time X covers (X-1h, X].
//! A reading at 00:00 is therefore the last hour of the previous day, and
//! for AM/PM binning the PM half runs 13:00 through the following 00:00.
//!
//! Each field is folded with the `AggregationKind` from a fixed policy
//! table. `None` values do not participate in a fold; a field that never
//! saw a value in a bucket comes out as `None`.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::model::{
    AggregatedRecord, AggregationError, AggregationKind, BucketKey, Granularity, Half, SensorReading,
};

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// Aggregation policy for every column of the NWAC measurement table.
pub static DEFAULT_POLICY: &[(&str, AggregationKind)] = &[
    ("id", AggregationKind::Excluded),
    ("station_id", AggregationKind::Excluded),
    ("time", AggregationKind::Excluded),
    ("data_logger", AggregationKind::CheckEqual),
    ("precipitation", AggregationKind::Sum),
    ("intermittent_snow", AggregationKind::Sum),
    ("temperature", AggregationKind::Average),
    ("equip_temperature", AggregationKind::Average),
    ("relative_humidity", AggregationKind::Average),
    ("barometric_pressure", AggregationKind::Average),
    ("solar_radiation", AggregationKind::Average),
    ("net_solar", AggregationKind::Average),
    ("wind_direction", AggregationKind::Average),
    ("wind_speed_average", AggregationKind::Average),
    ("wind_speed_minimum", AggregationKind::Min),
    ("wind_speed_maximum", AggregationKind::Max),
    ("battery_voltage", AggregationKind::Min),
    ("snow_depth", AggregationKind::Max),
    ("snowfall_24_hour", AggregationKind::Max),
];

/// Field name -> aggregation policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTable {
    entries: HashMap<String, AggregationKind>,
}

impl PolicyTable {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, AggregationKind)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(name, kind)| (name.into(), kind)).collect(),
        }
    }

    /// The NWAC measurement table policy.
    pub fn nwac_default() -> Self {
        Self::new(DEFAULT_POLICY.iter().copied())
    }

    pub fn get(&self, field: &str) -> Option<AggregationKind> {
        self.entries.get(field).copied()
    }

    /// Fields that can be requested as data columns, sorted by name.
    pub fn data_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, kind)| **kind != AggregationKind::Excluded)
            .map(|(name, _)| name.as_str())
            .collect();
        fields.sort_unstable();
        fields
    }
}

// ---------------------------------------------------------------------------
// Bucket keys
// ---------------------------------------------------------------------------

/// The day a reading belongs to: hour 0 rolls back to the previous day.
pub fn adjusted_date(time: NaiveDateTime) -> NaiveDate {
    if time.hour() == 0 {
        time.date() - Duration::days(1)
    } else {
        time.date()
    }
}

/// AM covers hours 1-12; PM covers 13-23 and 0.
pub fn half_of(time: NaiveDateTime) -> Half {
    match time.hour() {
        1..=12 => Half::Am,
        _ => Half::Pm,
    }
}

/// Returns the bucket a reading falls in, or `None` for `Granularity::None`.
pub fn bucket_key(station: &str, time: NaiveDateTime, granularity: Granularity) -> Option<BucketKey> {
    let half = match granularity {
        Granularity::None => return None,
        Granularity::Daily => None,
        Granularity::AmPm => Some(half_of(time)),
    };
    Some(BucketKey {
        station: station.to_string(),
        date: adjusted_date(time),
        half,
    })
}

/// Raw-timestamp window `(start, end]` covering adjusted dates
/// `first..=last`.
pub fn reading_window(first: NaiveDate, last: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = first.and_time(NaiveTime::MIN);
    let end = (last + Duration::days(1)).and_time(NaiveTime::MIN);
    (start, end)
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

/// Running state for one field in one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldAccumulator {
    Sum(Option<f64>),
    Average { count: usize, sum: f64 },
    Min(Option<f64>),
    Max(Option<f64>),
    CheckEqual(Option<f64>),
}

impl FieldAccumulator {
    /// Returns `None` for `Excluded`, which has no accumulator.
    pub fn new(kind: AggregationKind) -> Option<Self> {
        match kind {
            AggregationKind::Sum => Some(FieldAccumulator::Sum(None)),
            AggregationKind::Average => Some(FieldAccumulator::Average { count: 0, sum: 0.0 }),
            AggregationKind::Min => Some(FieldAccumulator::Min(None)),
            AggregationKind::Max => Some(FieldAccumulator::Max(None)),
            AggregationKind::CheckEqual => Some(FieldAccumulator::CheckEqual(None)),
            AggregationKind::Excluded => None,
        }
    }

    /// Folds one value in. On a `CheckEqual` mismatch (NaN equals NaN) returns
    /// `Err((expected, found))` and leaves the state unchanged.
    pub fn push(&mut self, value: f64) -> Result<(), (f64, f64)> {
        match self {
            FieldAccumulator::Sum(total) => *total = Some(total.unwrap_or(0.0) + value),
            FieldAccumulator::Average { count, sum } => {
                *count += 1;
                *sum += value;
            }
            FieldAccumulator::Min(current) => {
                *current = Some(current.map_or(value, |c| c.min(value)));
            }
            FieldAccumulator::Max(current) => {
                *current = Some(current.map_or(value, |c| c.max(value)));
            }
            FieldAccumulator::CheckEqual(first) => match *first {
                None => *first = Some(value),
                Some(expected) if same_value(expected, value) => {}
                Some(expected) => return Err((expected, value)),
            },
        }
        Ok(())
    }

    /// Combines the state of a sub-group folded separately.
    pub fn merge(&mut self, other: &FieldAccumulator) -> Result<(), (f64, f64)> {
        match (self, other) {
            (FieldAccumulator::Average { count, sum }, FieldAccumulator::Average { count: c2, sum: s2 }) => {
                *count += c2;
                *sum += s2;
                Ok(())
            }
            (this, other) => match other.finish() {
                Some(value) => this.push(value),
                None => Ok(()),
            },
        }
    }

    pub fn finish(&self) -> Option<f64> {
        match *self {
            FieldAccumulator::Sum(v)
            | FieldAccumulator::Min(v)
            | FieldAccumulator::Max(v)
            | FieldAccumulator::CheckEqual(v) => v,
            FieldAccumulator::Average { count: 0, .. } => None,
            FieldAccumulator::Average { count, sum } => Some(sum / count as f64),
        }
    }
}

/// Equality for `CheckEqual`: NaN matches NaN.
fn same_value(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// All field accumulators for one bucket, in plan order.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketAccumulator {
    fields: Vec<FieldAccumulator>,
}

impl BucketAccumulator {
    fn new(plan: &[(String, AggregationKind)]) -> Self {
        Self {
            fields: plan
                .iter()
                .filter_map(|(_, kind)| FieldAccumulator::new(*kind))
                .collect(),
        }
    }

    fn fold(&mut self, key: &BucketKey, plan: &[(String, AggregationKind)], reading: &SensorReading) -> Result<(), AggregationError> {
        for (acc, (name, _)) in self.fields.iter_mut().zip(plan) {
            if let Some(Some(value)) = reading.values.get(name) {
                acc.push(*value).map_err(|(expected, found)| integrity_error(key, name, expected, found))?;
            }
        }
        Ok(())
    }

    fn merge(&mut self, key: &BucketKey, plan: &[(String, AggregationKind)], other: &BucketAccumulator) -> Result<(), AggregationError> {
        for ((acc, other), (name, _)) in self.fields.iter_mut().zip(&other.fields).zip(plan) {
            acc.merge(other).map_err(|(expected, found)| integrity_error(key, name, expected, found))?;
        }
        Ok(())
    }
}

fn integrity_error(key: &BucketKey, field: &str, expected: f64, found: f64) -> AggregationError {
    AggregationError::IntegrityViolation {
        bucket: format!("{} {}", key.station, key.label()),
        field: field.to_string(),
        expected,
        found,
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Resolves the requested fields against the policy table, dropping
/// `Excluded` ones. Fails on the first field with no policy.
fn build_plan(fields: &[&str], policy: &PolicyTable) -> Result<Vec<(String, AggregationKind)>, AggregationError> {
    let mut plan = Vec::with_capacity(fields.len());
    for field in fields {
        let kind = policy
            .get(field)
            .ok_or_else(|| AggregationError::UnknownField(field.to_string()))?;
        if kind != AggregationKind::Excluded {
            plan.push((field.to_string(), kind));
        }
    }
    Ok(plan)
}

/// Partial aggregation state: one accumulator per bucket seen so far.
///
/// Separate `Aggregator`s can be `absorb`ed into one another, so a large
/// input may be folded in chunks and combined.
#[derive(Debug, Clone)]
pub struct Aggregator {
    granularity: Granularity,
    plan: Vec<(String, AggregationKind)>,
    buckets: HashMap<BucketKey, BucketAccumulator>,
}

impl Aggregator {
    /// Validates `fields` against `policy` before anything is folded.
    pub fn new(fields: &[&str], granularity: Granularity, policy: &PolicyTable) -> Result<Self, AggregationError> {
        Ok(Self {
            granularity,
            plan: build_plan(fields, policy)?,
            buckets: HashMap::new(),
        })
    }

    /// Folds one reading into its bucket. `Granularity::None` folds at
    /// daily resolution; callers wanting raw rows skip aggregation.
    pub fn push(&mut self, reading: &SensorReading) -> Result<(), AggregationError> {
        let granularity = match self.granularity {
            Granularity::None => Granularity::Daily,
            g => g,
        };
        let Some(key) = bucket_key(&reading.station, reading.time, granularity) else {
            return Ok(());
        };
        let plan = &self.plan;
        let acc = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| BucketAccumulator::new(plan));
        acc.fold(&key, plan, reading)
    }

    /// Merges another aggregator built with the same fields and granularity.
    pub fn absorb(&mut self, other: Aggregator) -> Result<(), AggregationError> {
        for (key, other_acc) in other.buckets {
            match self.buckets.get_mut(&key) {
                Some(acc) => acc.merge(&key, &self.plan, &other_acc)?,
                None => {
                    self.buckets.insert(key, other_acc);
                }
            }
        }
        Ok(())
    }

    /// Finalizes every bucket. Records are sorted by station, date, half.
    pub fn finish(self) -> Vec<AggregatedRecord> {
        let plan = self.plan;
        let mut records: Vec<AggregatedRecord> = self
            .buckets
            .into_iter()
            .map(|(key, acc)| AggregatedRecord {
                key,
                values: plan
                    .iter()
                    .zip(&acc.fields)
                    .map(|((name, _), field)| (name.clone(), field.finish()))
                    .collect(),
            })
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }
}

/// Aggregates `readings` into one record per (station, bucket).
///
/// `fields` are the data columns to aggregate; each must appear in
/// `policy`, otherwise `UnknownField` is returned before any reading is
/// looked at. `Excluded` fields are accepted and dropped.
pub fn aggregate(
    readings: &[SensorReading],
    fields: &[&str],
    granularity: Granularity,
    policy: &PolicyTable,
) -> Result<Vec<AggregatedRecord>, AggregationError> {
    let mut aggregator = Aggregator::new(fields, granularity, policy)?;
    for reading in readings {
        aggregator.push(reading)?;
    }
    Ok(aggregator.finish())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn reading(station: &str, time: NaiveDateTime, values: &[(&str, Option<f64>)]) -> SensorReading {
        SensorReading {
            station: station.to_string(),
            time,
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn value(record: &AggregatedRecord, field: &str) -> Option<f64> {
        *record.values.get(field).expect("field present in output")
    }

    // --- Bucket keys --------------------------------------------------------

    #[test]
    fn test_midnight_rolls_back_to_previous_day() {
        assert_eq!(adjusted_date(at(2019, 1, 2, 0)), NaiveDate::from_ymd_opt(2019, 1, 1).unwrap());
        assert_eq!(adjusted_date(at(2019, 1, 2, 1)), NaiveDate::from_ymd_opt(2019, 1, 2).unwrap());
        assert_eq!(adjusted_date(at(2019, 3, 1, 0)), NaiveDate::from_ymd_opt(2019, 2, 28).unwrap());
    }

    #[test]
    fn test_half_boundaries() {
        assert_eq!(half_of(at(2019, 1, 1, 1)), Half::Am);
        assert_eq!(half_of(at(2019, 1, 1, 12)), Half::Am);
        assert_eq!(half_of(at(2019, 1, 1, 13)), Half::Pm);
        assert_eq!(half_of(at(2019, 1, 1, 23)), Half::Pm);
        assert_eq!(half_of(at(2019, 1, 1, 0)), Half::Pm);
    }

    #[test]
    fn test_midnight_reading_lands_in_previous_pm_bucket() {
        let records = aggregate(
            &[reading("HUR", at(2019, 1, 2, 0), &[("precipitation", Some(5.0))])],
            &["precipitation"],
            Granularity::AmPm,
            &PolicyTable::nwac_default(),
        )
        .expect("valid input");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.label(), "2019-01-01-PM");
        assert_eq!(value(&records[0], "precipitation"), Some(5.0));
    }

    #[test]
    fn test_bucket_key_none_granularity() {
        assert_eq!(bucket_key("HUR", at(2019, 1, 1, 5), Granularity::None), None);
    }

    #[test]
    fn test_reading_window_covers_through_next_midnight() {
        let (start, end) = reading_window(
            NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2019, 1, 3).unwrap(),
        );
        assert_eq!(start, at(2019, 1, 1, 0));
        assert_eq!(end, at(2019, 1, 4, 0));
        assert_eq!(adjusted_date(end), NaiveDate::from_ymd_opt(2019, 1, 3).unwrap());
    }

    // --- Per-kind folding ---------------------------------------------------

    #[test]
    fn test_each_kind_over_one_day() {
        let readings: Vec<_> = [(1, 1.0), (6, 3.0), (18, 2.0)]
            .iter()
            .map(|&(h, v)| {
                reading(
                    "MTB",
                    at(2019, 1, 1, h),
                    &[
                        ("precipitation", Some(v)),
                        ("temperature", Some(v)),
                        ("wind_speed_minimum", Some(v)),
                        ("wind_speed_maximum", Some(v)),
                        ("data_logger", Some(7.0)),
                    ],
                )
            })
            .collect();
        let fields = ["precipitation", "temperature", "wind_speed_minimum", "wind_speed_maximum", "data_logger"];
        let records = aggregate(&readings, &fields, Granularity::Daily, &PolicyTable::nwac_default())
            .expect("valid input");

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.key.label(), "2019-01-01");
        assert_eq!(value(r, "precipitation"), Some(6.0));
        assert_eq!(value(r, "temperature"), Some(2.0));
        assert_eq!(value(r, "wind_speed_minimum"), Some(1.0));
        assert_eq!(value(r, "wind_speed_maximum"), Some(3.0));
        assert_eq!(value(r, "data_logger"), Some(7.0));
    }

    #[test]
    fn test_single_record_bucket_is_unchanged() {
        let fields = ["precipitation", "temperature", "wind_speed_minimum", "wind_speed_maximum", "data_logger"];
        let values: Vec<(&str, Option<f64>)> = fields.iter().map(|f| (*f, Some(4.25))).collect();
        let records = aggregate(
            &[reading("HUR", at(2019, 1, 1, 9), &values)],
            &fields,
            Granularity::AmPm,
            &PolicyTable::nwac_default(),
        )
        .expect("valid input");
        for field in fields {
            assert_eq!(value(&records[0], field), Some(4.25), "field {}", field);
        }
    }

    #[test]
    fn test_missing_values_do_not_participate() {
        let readings = [
            reading("HUR", at(2019, 1, 1, 1), &[("temperature", Some(10.0)), ("precipitation", None)]),
            reading("HUR", at(2019, 1, 1, 2), &[("temperature", None), ("precipitation", None)]),
            reading("HUR", at(2019, 1, 1, 3), &[("temperature", Some(20.0))]),
        ];
        let records = aggregate(
            &readings,
            &["temperature", "precipitation"],
            Granularity::Daily,
            &PolicyTable::nwac_default(),
        )
        .expect("valid input");
        assert_eq!(value(&records[0], "temperature"), Some(15.0));
        assert_eq!(value(&records[0], "precipitation"), None, "no data is not zero");
    }

    #[test]
    fn test_excluded_fields_are_dropped() {
        let records = aggregate(
            &[reading("HUR", at(2019, 1, 1, 1), &[("id", Some(99.0)), ("precipitation", Some(1.0))])],
            &["id", "precipitation"],
            Granularity::Daily,
            &PolicyTable::nwac_default(),
        )
        .expect("excluded fields are accepted");
        assert!(!records[0].values.contains_key("id"));
        assert_eq!(records[0].values.len(), 1);
    }

    // --- Errors -------------------------------------------------------------

    #[test]
    fn test_check_equal_mismatch_is_an_integrity_error() {
        let readings = [
            reading("HUR", at(2019, 1, 1, 1), &[("data_logger", Some(1.0))]),
            reading("HUR", at(2019, 1, 1, 2), &[("data_logger", Some(2.0))]),
        ];
        let result = aggregate(&readings, &["data_logger"], Granularity::Daily, &PolicyTable::nwac_default());
        match result {
            Err(AggregationError::IntegrityViolation { bucket, field, expected, found }) => {
                assert_eq!(bucket, "HUR 2019-01-01");
                assert_eq!(field, "data_logger");
                assert_eq!((expected, found), (1.0, 2.0));
            }
            other => panic!("expected integrity violation, got {:?}", other),
        }
    }

    #[test]
    fn test_check_equal_accepts_repeated_nan() {
        let readings = [
            reading("HUR", at(2019, 1, 1, 1), &[("data_logger", Some(f64::NAN))]),
            reading("HUR", at(2019, 1, 1, 2), &[("data_logger", Some(f64::NAN))]),
        ];
        let records = aggregate(&readings, &["data_logger"], Granularity::Daily, &PolicyTable::nwac_default())
            .expect("identical NaN values are not a conflict");
        assert!(records[0].values["data_logger"].unwrap().is_nan());

        let mut acc = FieldAccumulator::new(AggregationKind::CheckEqual).unwrap();
        acc.push(f64::NAN).unwrap();
        assert!(acc.push(1.0).is_err(), "NaN then a number still disagrees");
    }

    #[test]
    fn test_check_equal_is_per_bucket() {
        let readings = [
            reading("HUR", at(2019, 1, 1, 1), &[("data_logger", Some(1.0))]),
            reading("HUR", at(2019, 1, 1, 13), &[("data_logger", Some(2.0))]),
        ];
        let records = aggregate(&readings, &["data_logger"], Granularity::AmPm, &PolicyTable::nwac_default())
            .expect("different buckets may differ");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_unknown_field_fails_before_folding() {
        let result = aggregate(&[], &["precipitation", "humidex"], Granularity::Daily, &PolicyTable::nwac_default());
        assert_eq!(result, Err(AggregationError::UnknownField("humidex".to_string())));
    }

    // --- Associativity ------------------------------------------------------

    #[test]
    fn test_split_and_merge_matches_single_fold() {
        let fields = ["precipitation", "temperature", "wind_speed_minimum", "wind_speed_maximum", "data_logger"];
        let policy = PolicyTable::nwac_default();
        let readings: Vec<_> = (1..=23)
            .map(|h| {
                let v = (h * 7 % 11) as f64 / 4.0;
                reading(
                    "SNO",
                    at(2019, 2, 1, h),
                    &[
                        ("precipitation", Some(v)),
                        ("temperature", Some(v - 1.0)),
                        ("wind_speed_minimum", Some(v)),
                        ("wind_speed_maximum", Some(v)),
                        ("data_logger", Some(3.0)),
                    ],
                )
            })
            .collect();

        let whole = aggregate(&readings, &fields, Granularity::AmPm, &policy).expect("valid input");

        let (left, right) = readings.split_at(9);
        let mut first = Aggregator::new(&fields, Granularity::AmPm, &policy).unwrap();
        left.iter().for_each(|r| first.push(r).unwrap());
        let mut second = Aggregator::new(&fields, Granularity::AmPm, &policy).unwrap();
        right.iter().for_each(|r| second.push(r).unwrap());
        first.absorb(second).expect("sub-groups agree on data_logger");
        let merged = first.finish();

        assert_eq!(whole.len(), merged.len());
        for (a, b) in whole.iter().zip(&merged) {
            assert_eq!(a.key, b.key);
            for field in fields {
                let (x, y) = (value(a, field).unwrap(), value(b, field).unwrap());
                assert!((x - y).abs() < 1e-12, "{} differs: {} vs {}", field, x, y);
            }
        }
    }

    #[test]
    fn test_merge_detects_check_equal_disagreement_between_groups() {
        let mut a = FieldAccumulator::new(AggregationKind::CheckEqual).unwrap();
        a.push(1.0).unwrap();
        let mut b = FieldAccumulator::new(AggregationKind::CheckEqual).unwrap();
        b.push(2.0).unwrap();
        assert_eq!(a.merge(&b), Err((1.0, 2.0)));
    }

    #[test]
    fn test_merge_with_empty_group_is_identity() {
        let mut a = FieldAccumulator::new(AggregationKind::Sum).unwrap();
        a.push(2.5).unwrap();
        let empty = FieldAccumulator::new(AggregationKind::Sum).unwrap();
        a.merge(&empty).unwrap();
        assert_eq!(a.finish(), Some(2.5));
    }

    #[test]
    fn test_output_is_sorted_by_station_then_time() {
        let readings = [
            reading("MTB", at(2019, 1, 1, 5), &[("precipitation", Some(1.0))]),
            reading("HUR", at(2019, 1, 2, 5), &[("precipitation", Some(1.0))]),
            reading("HUR", at(2019, 1, 1, 5), &[("precipitation", Some(1.0))]),
        ];
        let records = aggregate(&readings, &["precipitation"], Granularity::Daily, &PolicyTable::nwac_default())
            .expect("valid input");
        let keys: Vec<_> = records.iter().map(|r| format!("{} {}", r.key.station, r.key.label())).collect();
        assert_eq!(keys, vec!["HUR 2019-01-01", "HUR 2019-01-02", "MTB 2019-01-01"]);
    }

    #[test]
    fn test_policy_table_lists_only_data_fields() {
        let table = PolicyTable::nwac_default();
        let fields = table.data_fields();
        assert!(fields.contains(&"precipitation"));
        assert!(!fields.contains(&"station_id"));
        let custom = PolicyTable::new(BTreeMap::from([("a", AggregationKind::Sum), ("b", AggregationKind::Excluded)]));
        assert_eq!(custom.data_fields(), vec!["a"]);
    }
}
