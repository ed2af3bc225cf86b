// src/protocol/reconcile.rs
//! Fix/time reconciliation shared by every decoder that yields a position

use super::position::Position;
use chrono::{DateTime, Utc};

const KPH_PER_KNOT: f64 = 1.852;

/// Convert km/h to knots
pub fn knots_from_kph(kph: f64) -> f64 {
    kph / KPH_PER_KNOT
}

/// Stamp the record with a fresh GPS fix.
pub fn apply_fix(position: &mut Position, longitude: f64, latitude: f64, time: DateTime<Utc>) {
    position.valid = true;
    position.outdated = false;
    position.longitude = longitude;
    position.latitude = latitude;
    position.fix_time = time;
}

/// Fall back to the device's last known fix.
///
/// Coordinates and altitude come from the stored fix; the fix time is the
/// frame's own time when it carried one, otherwise the stored fix time.
pub fn fall_back_to_last(
    position: &mut Position,
    last: Option<&Position>,
    frame_time: Option<DateTime<Utc>>,
) {
    position.valid = false;
    position.outdated = true;

    match last {
        Some(last) => {
            position.latitude = last.latitude;
            position.longitude = last.longitude;
            position.altitude = last.altitude;
            position.server_time = Some(last.fix_time);
            position.fix_time = frame_time.unwrap_or(last.fix_time);
        }
        None => {
            position.fix_time = frame_time.unwrap_or_default();
        }
    }
}

/// Consider a second timestamp found later in the frame.
///
/// It only replaces the fix time of a fresh record, and only when it is
/// strictly earlier.
pub fn prefer_earlier_time(position: &mut Position, alternate: DateTime<Utc>) -> bool {
    if !position.outdated && alternate < position.fix_time {
        position.fix_time = alternate;
        true
    } else {
        false
    }
}
