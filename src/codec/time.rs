//! Date, timestamp, and duration bodies.
//!
//! - LOCAL_DATE: `i32` days since 1970-01-01, proleptic Gregorian.
//! - TIMESTAMP: `i64` milliseconds since the Unix epoch, UTC.
//! - DURATION: `i64` seconds then `i32` nanos, normalized so the nano part
//!   is always in `0..1_000_000_000`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta};

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};

/// `num_days_from_ce()` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const NANOS_PER_SEC: i32 = 1_000_000_000;

pub(crate) fn write_date(buf: &mut ByteBuffer, date: &NaiveDate) -> Result<()> {
    buf.write_i32(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

pub(crate) fn read_date(buf: &mut ByteBuffer) -> Result<NaiveDate> {
    let days = buf.read_i32()?;
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or(Error::InvalidDate)
}

pub(crate) fn write_timestamp(buf: &mut ByteBuffer, ts: &NaiveDateTime) -> Result<()> {
    buf.write_i64(ts.and_utc().timestamp_millis())
}

pub(crate) fn read_timestamp(buf: &mut ByteBuffer) -> Result<NaiveDateTime> {
    let millis = buf.read_i64()?;
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .ok_or(Error::InvalidDate)
}

pub(crate) fn write_duration(buf: &mut ByteBuffer, d: &TimeDelta) -> Result<()> {
    let mut secs = d.num_seconds();
    let mut nanos = d.subsec_nanos();
    if nanos < 0 {
        secs -= 1;
        nanos += NANOS_PER_SEC;
    }
    buf.write_i64(secs)?;
    buf.write_i32(nanos)
}

pub(crate) fn read_duration(buf: &mut ByteBuffer) -> Result<TimeDelta> {
    let secs = buf.read_i64()?;
    let nanos = buf.read_i32()?;
    if !(0..NANOS_PER_SEC).contains(&nanos) {
        return Err(Error::InvalidDate);
    }
    TimeDelta::new(secs, nanos as u32).ok_or(Error::InvalidDate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_is_day_zero() {
        let mut buf = ByteBuffer::new();
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        write_date(&mut buf, &epoch).unwrap();
        assert_eq!(buf.as_slice(), &[0, 0, 0, 0]);
        assert_eq!(read_date(&mut buf).unwrap(), epoch);
    }

    #[test]
    fn dates_roundtrip_across_the_epoch() {
        for (y, m, d) in [(1969, 12, 31), (1970, 1, 2), (2000, 2, 29), (2038, 1, 19), (1900, 1, 1)] {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let mut buf = ByteBuffer::new();
            write_date(&mut buf, &date).unwrap();
            assert_eq!(read_date(&mut buf).unwrap(), date, "{y}-{m}-{d}");
        }
    }

    #[test]
    fn known_day_offset() {
        // 1970-01-02 is day 1.
        let mut buf = ByteBuffer::new();
        write_date(&mut buf, &NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()).unwrap();
        assert_eq!(buf.read_i32().unwrap(), 1);
    }

    #[test]
    fn timestamp_millisecond_precision() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123)
            .unwrap()
            .naive_utc();
        let mut buf = ByteBuffer::new();
        write_timestamp(&mut buf, &ts).unwrap();
        assert_eq!(read_timestamp(&mut buf).unwrap(), ts);
    }

    #[test]
    fn negative_timestamps() {
        let ts = DateTime::from_timestamp_millis(-86_400_000).unwrap().naive_utc();
        let mut buf = ByteBuffer::new();
        write_timestamp(&mut buf, &ts).unwrap();
        assert_eq!(read_timestamp(&mut buf).unwrap(), ts);
    }

    #[test]
    fn duration_normalizes_negative_nanos() {
        let d = TimeDelta::milliseconds(-1_500);
        let mut buf = ByteBuffer::new();
        write_duration(&mut buf, &d).unwrap();
        // -1.5 s normalizes to (-2 s, +500_000_000 ns).
        assert_eq!(buf.read_i64().unwrap(), -2);
        assert_eq!(buf.read_i32().unwrap(), 500_000_000);
        buf.rewind();
        assert_eq!(read_duration(&mut buf).unwrap(), d);
    }

    #[test]
    fn duration_roundtrip() {
        for d in [
            TimeDelta::zero(),
            TimeDelta::seconds(5),
            TimeDelta::nanoseconds(1),
            TimeDelta::nanoseconds(-1),
            TimeDelta::seconds(86_400) + TimeDelta::nanoseconds(999_999_999),
        ] {
            let mut buf = ByteBuffer::new();
            write_duration(&mut buf, &d).unwrap();
            assert_eq!(read_duration(&mut buf).unwrap(), d);
        }
    }

    #[test]
    fn out_of_range_nanos_rejected() {
        let mut buf = ByteBuffer::new();
        buf.write_i64(0).unwrap();
        buf.write_i32(NANOS_PER_SEC).unwrap();
        assert!(matches!(read_duration(&mut buf), Err(Error::InvalidDate)));
    }
}
