//! Precipitation-frequency tables
//!
//! The oracle answers with loosely typed JSON records. [`RainfallDataset::from_wire`]
//! is the only way to build a dataset and enforces the table invariants: every
//! table has exactly one record per [`StormDuration`], and every record carries a
//! finite, non-negative value for every [`ReturnPeriod`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Storm duration rows, in table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StormDuration {
    FiveMinutes,
    FifteenMinutes,
    SixtyMinutes,
    TwoHours,
    ThreeHours,
    SixHours,
    TwelveHours,
    TwentyFourHours,
}

impl StormDuration {
    pub const ALL: [StormDuration; 8] = [
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::SixtyMinutes,
        Self::TwoHours,
        Self::ThreeHours,
        Self::SixHours,
        Self::TwelveHours,
        Self::TwentyFourHours,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::FiveMinutes => "5-min",
            Self::FifteenMinutes => "15-min",
            Self::SixtyMinutes => "60-min",
            Self::TwoHours => "2-hr",
            Self::ThreeHours => "3-hr",
            Self::SixHours => "6-hr",
            Self::TwelveHours => "12-hr",
            Self::TwentyFourHours => "24-hr",
        }
    }

    /// Parse a row label; `1-hr` is accepted for `60-min`
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        if label == "1-hr" {
            return Some(Self::SixtyMinutes);
        }
        Self::ALL.into_iter().find(|d| d.label() == label)
    }
}

impl fmt::Display for StormDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Return period columns, in table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnPeriod {
    Two,
    Five,
    Ten,
    TwentyFive,
    Fifty,
    Hundred,
}

impl ReturnPeriod {
    pub const ALL: [ReturnPeriod; 6] = [
        Self::Two,
        Self::Five,
        Self::Ten,
        Self::TwentyFive,
        Self::Fifty,
        Self::Hundred,
    ];

    pub fn years(self) -> u32 {
        match self {
            Self::Two => 2,
            Self::Five => 5,
            Self::Ten => 10,
            Self::TwentyFive => 25,
            Self::Fifty => 50,
            Self::Hundred => 100,
        }
    }

    /// Column key used on the wire and in CSV headers
    pub fn label(self) -> &'static str {
        match self {
            Self::Two => "2-yr",
            Self::Five => "5-yr",
            Self::Ten => "10-yr",
            Self::TwentyFive => "25-yr",
            Self::Fifty => "50-yr",
            Self::Hundred => "100-yr",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Two => 0,
            Self::Five => 1,
            Self::Ten => 2,
            Self::TwentyFive => 3,
            Self::Fifty => 4,
            Self::Hundred => 5,
        }
    }
}

/// Which of the two tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Intensity,
    Depth,
}

impl TableKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Intensity => "intensity",
            Self::Depth => "depth",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Intensity => "inches/hour",
            Self::Depth => "inches",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intensity" => Ok(Self::Intensity),
            "depth" => Ok(Self::Depth),
            other => Err(format!(
                "unknown table '{}'; expected 'intensity' or 'depth'",
                other
            )),
        }
    }
}

/// One record as the oracle sends it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct WireRecord {
    pub duration: String,
    #[serde(rename = "2-yr")]
    pub yr2: f64,
    #[serde(rename = "5-yr")]
    pub yr5: f64,
    #[serde(rename = "10-yr")]
    pub yr10: f64,
    #[serde(rename = "25-yr")]
    pub yr25: f64,
    #[serde(rename = "50-yr")]
    pub yr50: f64,
    #[serde(rename = "100-yr")]
    pub yr100: f64,
}

impl WireRecord {
    fn values(&self) -> [f64; 6] {
        [
            self.yr2, self.yr5, self.yr10, self.yr25, self.yr50, self.yr100,
        ]
    }
}

/// Full oracle answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct RainfallResponse {
    #[serde(alias = "intensityData")]
    pub intensity_table: Vec<WireRecord>,
    #[serde(alias = "depthData")]
    pub depth_table: Vec<WireRecord>,
}

/// A table invariant the oracle's answer broke
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetError {
    WrongRecordCount {
        table: TableKind,
        found: usize,
    },
    UnknownDuration {
        table: TableKind,
        label: String,
    },
    DuplicateDuration {
        table: TableKind,
        duration: StormDuration,
    },
    InvalidValue {
        table: TableKind,
        duration: StormDuration,
        period: &'static str,
        value: f64,
    },
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongRecordCount { table, found } => write!(
                f,
                "{} table has {} records, expected {}",
                table,
                found,
                StormDuration::ALL.len()
            ),
            Self::UnknownDuration { table, label } => {
                write!(f, "{} table has unknown duration '{}'", table, label)
            }
            Self::DuplicateDuration { table, duration } => {
                write!(f, "{} table repeats duration {}", table, duration)
            }
            Self::InvalidValue {
                table,
                duration,
                period,
                value,
            } => write!(
                f,
                "{} table has invalid {} value {} for {}",
                table, period, value, duration
            ),
        }
    }
}

impl std::error::Error for DatasetError {}

/// One duration row
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyRecord {
    pub duration: StormDuration,
    values: [f64; 6],
}

impl FrequencyRecord {
    pub fn value(&self, period: ReturnPeriod) -> f64 {
        self.values[period.index()]
    }

    fn to_wire(&self) -> WireRecord {
        WireRecord {
            duration: self.duration.label().to_string(),
            yr2: self.value(ReturnPeriod::Two),
            yr5: self.value(ReturnPeriod::Five),
            yr10: self.value(ReturnPeriod::Ten),
            yr25: self.value(ReturnPeriod::TwentyFive),
            yr50: self.value(ReturnPeriod::Fifty),
            yr100: self.value(ReturnPeriod::Hundred),
        }
    }
}

/// Eight rows, one per duration, in [`StormDuration::ALL`] order
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    kind: TableKind,
    records: Vec<FrequencyRecord>,
}

impl FrequencyTable {
    fn from_wire(kind: TableKind, wire: &[WireRecord]) -> Result<Self, DatasetError> {
        if wire.len() != StormDuration::ALL.len() {
            return Err(DatasetError::WrongRecordCount {
                table: kind,
                found: wire.len(),
            });
        }

        let mut records: Vec<FrequencyRecord> = Vec::with_capacity(wire.len());
        for row in wire {
            let duration =
                StormDuration::parse(&row.duration).ok_or_else(|| DatasetError::UnknownDuration {
                    table: kind,
                    label: row.duration.clone(),
                })?;
            if records.iter().any(|r| r.duration == duration) {
                return Err(DatasetError::DuplicateDuration {
                    table: kind,
                    duration,
                });
            }

            let values = row.values();
            for period in ReturnPeriod::ALL {
                let value = values[period.index()];
                if !value.is_finite() || value < 0.0 {
                    return Err(DatasetError::InvalidValue {
                        table: kind,
                        duration,
                        period: period.label(),
                        value,
                    });
                }
            }

            records.push(FrequencyRecord { duration, values });
        }

        // Eight distinct known durations means the set is complete
        records.sort_by_key(|r| r.duration);
        Ok(Self { kind, records })
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn records(&self) -> &[FrequencyRecord] {
        &self.records
    }

    /// Largest value in a return-period column
    pub fn max(&self, period: ReturnPeriod) -> f64 {
        self.records
            .iter()
            .map(|r| r.value(period))
            .fold(0.0, f64::max)
    }

    fn to_wire(&self) -> Vec<WireRecord> {
        self.records.iter().map(FrequencyRecord::to_wire).collect()
    }
}

/// Intensity (inches/hour) and depth (inches) tables from one oracle call
#[derive(Debug, Clone, PartialEq)]
pub struct RainfallDataset {
    intensity: FrequencyTable,
    depth: FrequencyTable,
}

impl RainfallDataset {
    pub fn from_wire(response: &RainfallResponse) -> Result<Self, DatasetError> {
        Ok(Self {
            intensity: FrequencyTable::from_wire(TableKind::Intensity, &response.intensity_table)?,
            depth: FrequencyTable::from_wire(TableKind::Depth, &response.depth_table)?,
        })
    }

    pub fn intensity(&self) -> &FrequencyTable {
        &self.intensity
    }

    pub fn depth(&self) -> &FrequencyTable {
        &self.depth
    }

    pub fn table(&self, kind: TableKind) -> &FrequencyTable {
        match kind {
            TableKind::Intensity => &self.intensity,
            TableKind::Depth => &self.depth,
        }
    }

    pub fn max_intensity(&self, period: ReturnPeriod) -> f64 {
        self.intensity.max(period)
    }

    pub fn to_wire(&self) -> RainfallResponse {
        RainfallResponse {
            intensity_table: self.intensity.to_wire(),
            depth_table: self.depth.to_wire(),
        }
    }
}
