use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};

use super::Serializer;
use crate::error::Result;
use crate::Error;

const TIMESTAMP_SIZE: usize = 12;

/// UTC timestamps as `i64` seconds since the epoch followed by `u32`
/// sub-second nanoseconds. Big-endian keeps byte order equal to time order
/// for dates after the epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampSerializer;

impl Serializer<DateTime<Utc>> for TimestampSerializer {
    fn serialize(&self, value: &DateTime<Utc>, out: &mut [u8]) -> Result<usize> {
        if out.len() < TIMESTAMP_SIZE {
            return Err(Error::ValueTooLong(TIMESTAMP_SIZE, out.len()));
        }
        BigEndian::write_i64(&mut out[0..8], value.timestamp());
        BigEndian::write_u32(&mut out[8..12], value.timestamp_subsec_nanos());
        Ok(TIMESTAMP_SIZE)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<DateTime<Utc>> {
        if bytes.len() < TIMESTAMP_SIZE {
            return Err(Error::Serialize(format!(
                "timestamp needs {} bytes, got {}",
                TIMESTAMP_SIZE,
                bytes.len()
            )));
        }
        let secs = BigEndian::read_i64(&bytes[0..8]);
        let nanos = BigEndian::read_u32(&bytes[8..12]);
        DateTime::from_timestamp(secs, nanos)
            .ok_or_else(|| Error::Serialize(format!("timestamp out of range: {}s", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip() {
        let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let mut out = [0u8; 32];
        let n = TimestampSerializer.serialize(&when, &mut out).unwrap();
        assert_eq!(n, TIMESTAMP_SIZE);
        assert_eq!(TimestampSerializer.deserialize(&out).unwrap(), when);
    }

    #[test]
    fn test_timestamp_keeps_nanos() {
        let when = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let mut out = [0u8; TIMESTAMP_SIZE];
        TimestampSerializer.serialize(&when, &mut out).unwrap();
        assert_eq!(TimestampSerializer.deserialize(&out).unwrap(), when);
    }

    #[test]
    fn test_timestamp_byte_order_follows_time() {
        let earlier = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut a = [0u8; TIMESTAMP_SIZE];
        let mut b = [0u8; TIMESTAMP_SIZE];
        TimestampSerializer.serialize(&earlier, &mut a).unwrap();
        TimestampSerializer.serialize(&later, &mut b).unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_timestamp_region_too_small() {
        let mut out = [0u8; 8];
        let result = TimestampSerializer.serialize(&Utc::now(), &mut out);
        assert!(matches!(result, Err(Error::ValueTooLong(12, 8))));
        assert!(TimestampSerializer.deserialize(&out).is_err());
    }
}
