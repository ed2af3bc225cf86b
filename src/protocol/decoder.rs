// src/protocol/decoder.rs
//! GL200 frame decoder
//!
//! Every failure path (unroutable frame, layout mismatch, unknown device)
//! ends in "no position for this frame"; nothing here returns an error to the
//! transport. Malformed values inside a matched frame are left absent.

use super::{
    frame::FrameKind,
    layouts,
    pattern::{MatchCursor, Matcher},
    position::{keys, DeviceId, Position},
    reconcile,
};
use crate::session::{AckSettings, IdentityRegistry, PositionStore, ReplyChannel};
use std::sync::Arc;
use tracing::{debug, trace};

pub const PROTOCOL: &str = "gl200";

pub struct Gl200Decoder {
    registry: Arc<dyn IdentityRegistry>,
    store: Arc<dyn PositionStore>,
    settings: Arc<dyn AckSettings>,
}

impl Gl200Decoder {
    pub fn new(
        registry: Arc<dyn IdentityRegistry>,
        store: Arc<dyn PositionStore>,
        settings: Arc<dyn AckSettings>,
    ) -> Self {
        Self {
            registry,
            store,
            settings,
        }
    }

    /// Decode one sentence, writing any acknowledgment to `channel`.
    pub fn decode(
        &self,
        sentence: &str,
        channel: Option<&mut dyn ReplyChannel>,
    ) -> Option<Position> {
        let Some(kind) = FrameKind::classify(sentence) else {
            debug!(sentence, "Unroutable frame");
            return None;
        };
        trace!(code = kind.code(), sentence, "Decoding frame");

        match kind {
            FrameKind::Heartbeat => {
                self.decode_heartbeat(sentence, channel);
                None
            }
            FrameKind::Info => self.decode_info(sentence),
            FrameKind::Diagnostics => self.decode_diagnostics(sentence),
            FrameKind::Generic(_) => self.decode_location(sentence, channel),
        }
    }

    fn decode_heartbeat(&self, sentence: &str, channel: Option<&mut dyn ReplyChannel>) {
        let Some(mut cursor) = matched(&layouts::HEARTBEAT, "heartbeat", sentence) else {
            return;
        };
        if let (Some(channel), Some(version), Some(count)) = (channel, cursor.next(), cursor.next())
        {
            channel.write_reply(&format!("+SACK:GTHBD,{},{}$", version, count));
        }
    }

    fn decode_info(&self, sentence: &str) -> Option<Position> {
        let mut cursor = matched(&layouts::INFO, "info", sentence)?;
        let mut position = self.identify(&mut cursor)?;

        position.set(keys::STATUS, cursor.next());
        position.set(keys::POWER, cursor.next_i64());
        position.set(keys::BATTERY, cursor.next_f64());
        position.set(keys::CHARGE, cursor.next_bool());

        let time = cursor.next_date_time();
        let last = self.store.last_position(position.device_id);
        reconcile::fall_back_to_last(&mut position, last.as_ref(), time);

        position.set(keys::INDEX, cursor.next());

        Some(position)
    }

    fn decode_diagnostics(&self, sentence: &str) -> Option<Position> {
        let mut cursor = matched(&layouts::DIAGNOSTICS, "diagnostics", sentence)?;
        let mut position = self.identify(&mut cursor)?;

        position.set(keys::RPM, cursor.next_i64());
        position.set(keys::OBD_SPEED, cursor.next_i64());
        position.set(keys::COOLANT_TEMP, cursor.next_i64());
        position.set(keys::FUEL_CONSUMPTION, cursor.next_f64());
        position.set(keys::DTCS_CLEARED_DISTANCE, cursor.next_i64());
        position.set(keys::OBD_CONNECT, cursor.next_bool());
        position.set(keys::DTCS_NUMBER, cursor.next_i64());
        position.set(keys::DTCS_CODES, cursor.next());
        position.set(keys::THROTTLE, cursor.next_i64());
        position.set(keys::FUEL, cursor.next_i64());
        position.set(keys::OBD_ODOMETER, cursor.next_i64());

        self.decode_fix(&mut cursor, &mut position);
        decode_cell(&mut cursor, &mut position);

        position.set(keys::ODOMETER, cursor.next_f64());

        decode_alternate_time(&mut cursor, &mut position);

        Some(position)
    }

    fn decode_location(
        &self,
        sentence: &str,
        channel: Option<&mut dyn ReplyChannel>,
    ) -> Option<Position> {
        let (mut cursor, primary) = match layouts::LOCATION.matches(sentence) {
            Some(cursor) => (cursor, true),
            None => (
                matched(&layouts::LOCATION_BACKUP, "location", sentence)?,
                false,
            ),
        };
        let mut position = self.identify(&mut cursor)?;

        self.decode_fix(&mut cursor, &mut position);

        if primary {
            decode_cell(&mut cursor, &mut position);
            position.set(keys::BATTERY, cursor.next_i64());
            decode_alternate_time(&mut cursor, &mut position);

            if let Some(channel) = channel {
                if self.settings.ack_enabled(PROTOCOL) {
                    if let Some(count) = cursor.next() {
                        channel.write_reply(&format!("+SACK:{}$", count));
                    }
                }
            }
        }

        Some(position)
    }

    /// Resolve the identity group into a fresh record.
    fn identify(&self, cursor: &mut MatchCursor<'_>) -> Option<Position> {
        let unique_id = cursor.next()?;
        let device_id: DeviceId = self.registry.identify(unique_id)?;
        Some(Position::new(PROTOCOL, device_id))
    }

    /// Speed, course and altitude, then the 8-group GPS block or a fallback.
    ///
    /// A GPS block with an impossible date counts as no fix at all.
    fn decode_fix(&self, cursor: &mut MatchCursor<'_>, position: &mut Position) {
        position.speed = reconcile::knots_from_kph(cursor.next_f64().unwrap_or_default());
        position.course = cursor.next_f64().unwrap_or_default();
        position.altitude = cursor.next_f64().unwrap_or_default();

        let fix = if cursor.has_next(8) {
            let longitude = cursor.next_f64();
            let latitude = cursor.next_f64();
            let time = cursor.next_date_time();
            longitude.zip(latitude).zip(time)
        } else {
            None
        };

        match fix {
            Some(((longitude, latitude), time)) => {
                reconcile::apply_fix(position, longitude, latitude, time);
            }
            None => {
                debug!(device_id = %position.device_id, "No usable fix, using last position");
                let last = self.store.last_position(position.device_id);
                reconcile::fall_back_to_last(position, last.as_ref(), None);
            }
        }
    }
}

fn matched<'s>(matcher: &Matcher, layout: &str, sentence: &'s str) -> Option<MatchCursor<'s>> {
    let cursor = matcher.matches(sentence);
    if cursor.is_none() && tracing::enabled!(tracing::Level::DEBUG) {
        debug!(
            layout,
            matched = matcher.matched_prefix(sentence),
            segments = matcher.segment_count(),
            sentence,
            "Layout mismatch"
        );
    }
    cursor
}

fn decode_cell(cursor: &mut MatchCursor<'_>, position: &mut Position) {
    if cursor.has_next(4) {
        position.set(keys::MCC, cursor.next_i64());
        position.set(keys::MNC, cursor.next_i64());
        position.set(keys::LAC, cursor.next_i64_radix(16));
        position.set(keys::CID, cursor.next_i64_radix(16));
    }
}

fn decode_alternate_time(cursor: &mut MatchCursor<'_>, position: &mut Position) {
    if cursor.has_next(6) {
        if let Some(time) = cursor.next_date_time() {
            reconcile::prefer_earlier_time(position, time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::position::AttributeValue;
    use crate::session::{DeviceRegistry, LastPositionStore};
    use chrono::{DateTime, TimeZone, Utc};

    struct Acks(bool);

    impl AckSettings for Acks {
        fn ack_enabled(&self, protocol: &str) -> bool {
            self.0 && protocol == PROTOCOL
        }
    }

    const LOCATION: &str = "+RESP:GTFRI,0F0106,862193020451183,,0,0,1,1,100.0,92,70.0,\
                            121.354335,31.222073,20090214013254,0460,0000,18d8,6141,00,80,\
                            20090214093254,11F0$";

    const LOCATION_NO_FIX: &str = "+RESP:GTFRI,0F0106,862193020451183,,0,0,1,1,,,,,,,\
                                   0460,0000,18d8,6141,00,80,20090214000000,11F1$";

    const INFO: &str = "+RESP:GTINF,1F0101,135790246811220,1G1JC5444R7252367,,16,\
                        898600810906F8048812,16,0,1,12000,,4.2,0,0,,,20090214013254,,,,,,\
                        +0800,0,20090214093254,11F0$";

    const DIAGNOSTICS: &str = "+RESP:GTOBD,1F0109,864251020141408,1G1JC5444R7252367,gv500,\
                               0,70FFFF,1G1JC5444R7252367,1,13081,981B81C0,787,50,-5,NaN,\
                               13,,1,2,0300C100,32,20,55,12000,0,60.0,180,112.5,\
                               -97.114500,32.940420,20160111090021,0310,0410,5E20,17F8,00,\
                               123.4,20160111085959,0FAB$";

    fn decoder(acks: bool) -> (Gl200Decoder, Arc<LastPositionStore>) {
        let store = Arc::new(LastPositionStore::new());
        let decoder = Gl200Decoder::new(
            Arc::new(DeviceRegistry::new(true)),
            store.clone(),
            Arc::new(Acks(acks)),
        );
        (decoder, store)
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn stored_fix(store: &LastPositionStore, device_id: DeviceId) -> Position {
        let mut last = Position::new(PROTOCOL, device_id);
        reconcile::apply_fix(&mut last, 11.5, 48.1, at(2009, 2, 13, 20, 0, 0));
        last.altitude = 545.4;
        store.update(&last);
        last
    }

    #[test]
    fn test_heartbeat_reply() {
        let (decoder, _) = decoder(false);
        let mut replies: Vec<String> = Vec::new();

        let position = decoder.decode("+ACK:GTHBD,1A0102,...,0004$", Some(&mut replies));

        assert!(position.is_none());
        assert_eq!(replies, vec!["+SACK:GTHBD,1A0102,0004$".to_string()]);
    }

    #[test]
    fn test_heartbeat_without_channel() {
        let (decoder, _) = decoder(true);
        let sentence = "+ACK:GTHBD,1A0102,135790246811220,,20100214093254,11F0$";
        assert!(decoder.decode(sentence, None).is_none());
    }

    #[test]
    fn test_unroutable_frames() {
        let (decoder, _) = decoder(true);
        let mut replies: Vec<String> = Vec::new();

        assert!(decoder.decode("garbage", Some(&mut replies)).is_none());
        assert!(decoder.decode("+RESP:GT", Some(&mut replies)).is_none());
        assert!(decoder
            .decode("+RESP:GTXYZ,not,a,frame$", Some(&mut replies))
            .is_none());
        assert!(replies.is_empty());
    }

    #[test]
    fn test_location_with_fix() {
        let (decoder, _) = decoder(false);
        let position = decoder.decode(LOCATION, None).unwrap();

        assert!(position.valid);
        assert!(!position.outdated);
        assert_eq!(position.protocol, "gl200");
        assert_eq!(position.longitude, 121.354335);
        assert_eq!(position.latitude, 31.222073);
        assert_eq!(position.altitude, 70.0);
        assert_eq!(position.course, 92.0);
        assert!((position.speed - 53.9957).abs() < 1e-4);
        // The alternate time is later than the fix, so the fix time stays.
        assert_eq!(position.fix_time, at(2009, 2, 14, 1, 32, 54));
        assert_eq!(position.get(keys::MCC), Some(&AttributeValue::Integer(460)));
        assert_eq!(position.get(keys::MNC), Some(&AttributeValue::Integer(0)));
        assert_eq!(position.get(keys::LAC), Some(&AttributeValue::Integer(0x18d8)));
        assert_eq!(position.get(keys::CID), Some(&AttributeValue::Integer(0x6141)));
        assert_eq!(position.get(keys::BATTERY), Some(&AttributeValue::Integer(80)));
    }

    #[test]
    fn test_location_prefers_earlier_alternate_time() {
        let (decoder, _) = decoder(false);
        let sentence = LOCATION.replace("20090214093254", "20090214010000");
        let position = decoder.decode(&sentence, None).unwrap();
        assert_eq!(position.fix_time, at(2009, 2, 14, 1, 0, 0));
    }

    #[test]
    fn test_location_falls_back_to_last_fix() {
        let (decoder, store) = decoder(false);
        let device_id = decoder.registry.identify("862193020451183").unwrap();
        let last = stored_fix(&store, device_id);

        let position = decoder.decode(LOCATION_NO_FIX, None).unwrap();

        assert!(!position.valid);
        assert!(position.outdated);
        assert_eq!(position.latitude, last.latitude);
        assert_eq!(position.longitude, last.longitude);
        assert_eq!(position.altitude, last.altitude);
        assert_eq!(position.speed, 0.0);
        // Stale record: the alternate time must not replace the stored time.
        assert_eq!(position.fix_time, last.fix_time);
        assert_eq!(position.server_time, Some(last.fix_time));
        assert_eq!(position.get(keys::MCC), Some(&AttributeValue::Integer(460)));
    }

    #[test]
    fn test_location_ack_enabled() {
        let (decoder, _) = decoder(true);
        let mut replies: Vec<String> = Vec::new();
        assert!(decoder.decode(LOCATION, Some(&mut replies)).is_some());
        assert_eq!(replies, vec!["+SACK:11F0$".to_string()]);

        let mut replies: Vec<String> = Vec::new();
        assert!(decoder.decode(LOCATION_NO_FIX, Some(&mut replies)).is_some());
        assert_eq!(replies, vec!["+SACK:11F1$".to_string()]);
    }

    #[test]
    fn test_location_ack_disabled() {
        let (decoder, _) = decoder(false);
        let mut replies: Vec<String> = Vec::new();
        assert!(decoder.decode(LOCATION, Some(&mut replies)).is_some());
        assert!(replies.is_empty());
    }

    #[test]
    fn test_backup_location_never_replies() {
        let (decoder, _) = decoder(true);
        let mut replies: Vec<String> = Vec::new();
        let sentence = "+BUFF:GTFRI,0F0106,A1B2C3D4E5F601,junk,,12.3,45,100.0,\
                        121.354335,31.222073,20090214013254,??,11F0$";

        let position = decoder.decode(sentence, Some(&mut replies)).unwrap();

        assert!(position.valid);
        assert_eq!(position.longitude, 121.354335);
        assert_eq!(position.latitude, 31.222073);
        assert_eq!(position.altitude, 100.0);
        assert_eq!(position.course, 45.0);
        assert_eq!(position.fix_time, at(2009, 2, 14, 1, 32, 54));
        assert!(position.get(keys::BATTERY).is_none());
        assert!(replies.is_empty());
    }

    #[test]
    fn test_unknown_device_yields_nothing() {
        let decoder = Gl200Decoder::new(
            Arc::new(DeviceRegistry::new(false)),
            Arc::new(LastPositionStore::new()),
            Arc::new(Acks(true)),
        );
        let mut replies: Vec<String> = Vec::new();

        assert!(decoder.decode(LOCATION, Some(&mut replies)).is_none());
        assert!(decoder.decode(DIAGNOSTICS, None).is_none());
        assert!(decoder.decode(INFO, Some(&mut replies)).is_none());
        assert!(replies.is_empty());
    }

    #[test]
    fn test_buffered_location_uses_primary_layout() {
        let (decoder, _) = decoder(true);
        let mut replies: Vec<String> = Vec::new();
        let sentence = LOCATION.replace("+RESP:", "+BUFF:");

        let position = decoder.decode(&sentence, Some(&mut replies)).unwrap();

        assert!(position.valid);
        assert_eq!(position.fix_time, at(2009, 2, 14, 1, 32, 54));
        assert_eq!(position.get(keys::MCC), Some(&AttributeValue::Integer(460)));
        assert_eq!(position.get(keys::BATTERY), Some(&AttributeValue::Integer(80)));
        assert_eq!(replies, vec!["+SACK:11F0$".to_string()]);
    }

    #[test]
    fn test_impossible_fix_date_still_acknowledged() {
        let (decoder, store) = decoder(true);
        let device_id = decoder.registry.identify("862193020451183").unwrap();
        let last = stored_fix(&store, device_id);
        let mut replies: Vec<String> = Vec::new();
        let sentence = LOCATION.replace("20090214013254", "20091341013254");

        let position = decoder.decode(&sentence, Some(&mut replies)).unwrap();

        assert!(!position.valid);
        assert!(position.outdated);
        assert_eq!(position.latitude, last.latitude);
        assert_eq!(position.fix_time, last.fix_time);
        assert_eq!(position.get(keys::BATTERY), Some(&AttributeValue::Integer(80)));
        assert_eq!(replies, vec!["+SACK:11F0$".to_string()]);
    }

    #[test]
    fn test_info_with_impossible_date() {
        let (decoder, _) = decoder(false);
        let sentence = INFO.replace("20090214093254", "20090230093254");

        let position = decoder.decode(&sentence, None).unwrap();

        assert!(!position.valid);
        assert_eq!(position.fix_time, DateTime::<Utc>::default());
        assert_eq!(
            position.get(keys::INDEX),
            Some(&AttributeValue::Text("11F0".to_string()))
        );
    }

    #[test]
    fn test_info_uses_last_fix_with_frame_time() {
        let (decoder, store) = decoder(true);
        let device_id = decoder.registry.identify("135790246811220").unwrap();
        let last = stored_fix(&store, device_id);
        let mut replies: Vec<String> = Vec::new();

        let position = decoder.decode(INFO, Some(&mut replies)).unwrap();

        assert!(!position.valid);
        assert_eq!(position.latitude, last.latitude);
        assert_eq!(position.longitude, last.longitude);
        assert_eq!(position.fix_time, at(2009, 2, 14, 9, 32, 54));
        assert_eq!(position.server_time, Some(last.fix_time));
        assert_eq!(
            position.get(keys::STATUS),
            Some(&AttributeValue::Text("16".to_string()))
        );
        assert_eq!(position.get(keys::POWER), Some(&AttributeValue::Integer(12000)));
        assert_eq!(position.get(keys::BATTERY), Some(&AttributeValue::Number(4.2)));
        assert_eq!(position.get(keys::CHARGE), Some(&AttributeValue::Bool(false)));
        assert_eq!(
            position.get(keys::INDEX),
            Some(&AttributeValue::Text("11F0".to_string()))
        );
        assert!(replies.is_empty());
    }

    #[test]
    fn test_diagnostics_with_fix() {
        let (decoder, _) = decoder(true);
        let position = decoder.decode(DIAGNOSTICS, None).unwrap();

        assert!(position.valid);
        assert_eq!(position.longitude, -97.1145);
        assert_eq!(position.latitude, 32.94042);
        assert_eq!(position.altitude, 112.5);
        assert_eq!(position.course, 180.0);
        assert!((position.speed - 60.0 / 1.852).abs() < 1e-9);
        // Alternate time is earlier than the fix time.
        assert_eq!(position.fix_time, at(2016, 1, 11, 8, 59, 59));

        assert_eq!(position.get(keys::RPM), Some(&AttributeValue::Integer(787)));
        assert_eq!(position.get(keys::OBD_SPEED), Some(&AttributeValue::Integer(50)));
        assert_eq!(position.get(keys::COOLANT_TEMP), Some(&AttributeValue::Integer(-5)));
        assert!(position.get(keys::FUEL_CONSUMPTION).is_none());
        assert_eq!(
            position.get(keys::DTCS_CLEARED_DISTANCE),
            Some(&AttributeValue::Integer(13))
        );
        assert_eq!(position.get(keys::OBD_CONNECT), Some(&AttributeValue::Bool(true)));
        assert_eq!(position.get(keys::DTCS_NUMBER), Some(&AttributeValue::Integer(2)));
        assert_eq!(
            position.get(keys::DTCS_CODES),
            Some(&AttributeValue::Text("0300C100".to_string()))
        );
        assert_eq!(position.get(keys::THROTTLE), Some(&AttributeValue::Integer(32)));
        assert_eq!(position.get(keys::FUEL), Some(&AttributeValue::Integer(55)));
        assert_eq!(
            position.get(keys::OBD_ODOMETER),
            Some(&AttributeValue::Integer(12000))
        );
        assert_eq!(position.get(keys::MCC), Some(&AttributeValue::Integer(310)));
        assert_eq!(position.get(keys::MNC), Some(&AttributeValue::Integer(410)));
        assert_eq!(position.get(keys::LAC), Some(&AttributeValue::Integer(0x5E20)));
        assert_eq!(position.get(keys::CID), Some(&AttributeValue::Integer(0x17F8)));
        assert_eq!(position.get(keys::ODOMETER), Some(&AttributeValue::Number(123.4)));
    }

    #[test]
    fn test_diagnostics_infinite_fuel_consumption() {
        let (decoder, _) = decoder(false);
        let sentence = DIAGNOSTICS.replace(",NaN,", ",Inf,");
        let position = decoder.decode(&sentence, None).unwrap();
        assert!(position.get(keys::FUEL_CONSUMPTION).is_none());

        let sentence = DIAGNOSTICS.replace(",NaN,", ",7.5,");
        let position = decoder.decode(&sentence, None).unwrap();
        assert_eq!(
            position.get(keys::FUEL_CONSUMPTION),
            Some(&AttributeValue::Number(7.5))
        );
    }

    #[test]
    fn test_diagnostics_without_fix() {
        let (decoder, store) = decoder(false);
        let device_id = decoder.registry.identify("864251020141408").unwrap();
        let last = stored_fix(&store, device_id);
        let sentence = DIAGNOSTICS.replace(
            "60.0,180,112.5,-97.114500,32.940420,20160111090021,0310,0410,5E20,17F8,",
            ",,,,,,,,,,",
        );

        let position = decoder.decode(&sentence, None).unwrap();

        assert!(!position.valid);
        assert_eq!(position.latitude, last.latitude);
        assert_eq!(position.longitude, last.longitude);
        assert_eq!(position.altitude, last.altitude);
        assert_eq!(position.fix_time, last.fix_time);
        assert!(position.get(keys::MCC).is_none());
        assert_eq!(position.get(keys::ODOMETER), Some(&AttributeValue::Number(123.4)));
    }
}
