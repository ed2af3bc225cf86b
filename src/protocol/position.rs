// src/protocol/position.rs
//! Decoded position records

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute keys written by the decoders
pub mod keys {
    pub const STATUS: &str = "status";
    pub const POWER: &str = "power";
    pub const BATTERY: &str = "battery";
    pub const CHARGE: &str = "charge";
    pub const INDEX: &str = "index";
    pub const RPM: &str = "rpm";
    pub const OBD_SPEED: &str = "obd-speed";
    pub const COOLANT_TEMP: &str = "temp1";
    pub const FUEL_CONSUMPTION: &str = "fuel-consumption";
    pub const DTCS_CLEARED_DISTANCE: &str = "dtcs-cleared-distance";
    pub const OBD_CONNECT: &str = "obd-connect";
    pub const DTCS_NUMBER: &str = "dtcs-number";
    pub const DTCS_CODES: &str = "dtcs-codes";
    pub const THROTTLE: &str = "throttle";
    pub const FUEL: &str = "fuel";
    pub const OBD_ODOMETER: &str = "obd-odometer";
    pub const MCC: &str = "mcc";
    pub const MNC: &str = "mnc";
    pub const LAC: &str = "lac";
    pub const CID: &str = "cid";
    pub const ODOMETER: &str = "odometer";
}

/// Opaque device handle handed out by the identity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(value) => write!(f, "{}", value),
            AttributeValue::Integer(value) => write!(f, "{}", value),
            AttributeValue::Number(value) => write!(f, "{}", value),
            AttributeValue::Bool(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub protocol: String,
    pub device_id: DeviceId,
    pub fix_time: DateTime<Utc>,
    /// Fix time of the stored position this record fell back to
    pub server_time: Option<DateTime<Utc>>,
    pub valid: bool,
    /// Stamped from the last known position rather than a fresh fix
    pub outdated: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64, // meters
    pub speed: f64,    // knots
    pub course: f64,   // degrees
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Position {
    pub fn new(protocol: &str, device_id: DeviceId) -> Self {
        Self {
            protocol: protocol.to_string(),
            device_id,
            fix_time: DateTime::<Utc>::default(),
            server_time: None,
            valid: false,
            outdated: false,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            speed: 0.0,
            course: 0.0,
            attributes: BTreeMap::new(),
        }
    }

    /// Store an attribute; absent values leave the map untouched.
    pub fn set<V: Into<AttributeValue>>(&mut self, key: &str, value: Option<V>) {
        if let Some(value) = value {
            self.attributes.insert(key.to_string(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// Format coordinate for display
    pub fn format_coordinate(coord: f64) -> String {
        format!("{:>11.6}°", coord)
    }
}
