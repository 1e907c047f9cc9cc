use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{Deserialize, Deserializer};
use serde_derive::{Deserialize, Serialize};

/// Opaque identifier the vendor assigns to a tank.
///
/// The login endpoint returns these as bare JSON values and the vendor is not
/// consistent about whether they are strings or integers, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TankId(String);

impl TankId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TankId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for TankId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for TankId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(serde_derive::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(id) => TankId(id),
            Raw::Number(id) => TankId(id.to_string()),
        })
    }
}

/// Static and semi-static tank attributes as reported by the vendor.
///
/// A read-only snapshot per fetch; only the identifier and name are guaranteed,
/// everything else is omitted freely depending on the tank's device generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankInfo {
    pub tank_id: TankId,
    pub tank_name: String,
    #[serde(default)]
    pub current_volume: Option<f64>,
    #[serde(default)]
    pub current_temperature: Option<f64>,
    #[serde(default)]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub days_left: Option<f64>,
    #[serde(default)]
    pub last_measure_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_connection_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub address_street: Option<String>,
    #[serde(default)]
    pub address_number: Option<String>,
    #[serde(default)]
    pub address_postcode: Option<String>,
    #[serde(default)]
    pub address_city: Option<String>,
    #[serde(default)]
    pub address_country: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub device_full_serial: Option<String>,
    #[serde(default)]
    pub tank_usage: Option<String>,
    #[serde(default)]
    pub tank_shape: Option<String>,
    #[serde(default)]
    pub tank_diameter: Option<f64>,
    #[serde(default)]
    pub tank_height: Option<f64>,
    #[serde(default)]
    pub tank_length: Option<f64>,
    #[serde(default)]
    pub tank_chimney: Option<f64>,
    #[serde(default)]
    pub tank_total_volume: Option<f64>,
    #[serde(default)]
    pub tank_notification_level: Option<f64>,
}

/// One vendor-reported volume measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: DateTime<Utc>,
    pub volume: f64,
}

/// The record handed to the polling collaborator: the vendor's tank snapshot
/// plus the derived daily consumption estimate in liters per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankRecord {
    #[serde(flatten)]
    pub info: TankInfo,
    pub daily_consumption: f64,
}

impl TankRecord {
    /// Fill level as a percentage of total capacity, rounded to one decimal.
    /// `None` when the vendor did not report a volume or capacity, or the
    /// capacity is zero.
    pub fn fill_level_percentage(&self) -> Option<f64> {
        let current = self.info.current_volume?;
        let total = self.info.tank_total_volume?;
        if total <= 0.0 {
            return None;
        }
        Some((current / total * 1000.0).round() / 10.0)
    }
}
