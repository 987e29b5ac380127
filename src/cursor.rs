//! Opaque keyset-pagination cursors.
//!
//! A cursor wraps the creation timestamp of the last account on a page and,
//! optionally, that account's id. Pages are ordered by `(created_at, id)`, so
//! the id breaks ties between accounts created in the same instant. A keyed
//! cursor is the timestamp cursor followed by `.` and the id in simple form.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use uuid::Uuid;

const KEY_SEPARATOR: char = '.';
const FIELD_SEPARATOR: char = '_';
const NANOS_PER_SECOND: u64 = 1_000_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid cursor")]
pub struct InvalidCursor;

/// Decoded pagination boundary: rows strictly after this position follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: OffsetDateTime,
    pub id: Option<Uuid>,
}

pub fn encode(created_at: OffsetDateTime) -> String {
    URL_SAFE_NO_PAD.encode(format_timestamp(created_at))
}

pub fn encode_with_key(created_at: OffsetDateTime, id: Uuid) -> String {
    format!("{}{}{}", encode(created_at), KEY_SEPARATOR, id.simple())
}

/// An empty string means "from the beginning" and decodes to `None`.
pub fn decode(cursor: &str) -> Result<Option<Cursor>, InvalidCursor> {
    if cursor.is_empty() {
        return Ok(None);
    }
    let (ts, id) = match cursor.split_once(KEY_SEPARATOR) {
        Some((ts, id)) => (ts, Some(Uuid::parse_str(id).map_err(|_| InvalidCursor)?)),
        None => (cursor, None),
    };
    let bytes = URL_SAFE_NO_PAD.decode(ts).map_err(|_| InvalidCursor)?;
    let raw = String::from_utf8(bytes).map_err(|_| InvalidCursor)?;
    let created_at = parse_timestamp(&raw).ok_or(InvalidCursor)?;

    Ok(Some(Cursor { created_at, id }))
}

// `<julian day>_<nanos since midnight>_<offset seconds>`: the local date,
// time and offset as stored, so every representable value survives without
// an offset conversion that could leave the supported date range.
fn format_timestamp(ts: OffsetDateTime) -> String {
    let (h, m, s, ns) = ts.time().as_hms_nano();
    let secs = u64::from(h) * 3600 + u64::from(m) * 60 + u64::from(s);
    let nanos_of_day = secs * NANOS_PER_SECOND + u64::from(ns);
    format!(
        "{}{sep}{}{sep}{}",
        ts.date().to_julian_day(),
        nanos_of_day,
        ts.offset().whole_seconds(),
        sep = FIELD_SEPARATOR
    )
}

fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let mut fields = raw.split(FIELD_SEPARATOR);
    let julian_day: i32 = fields.next()?.parse().ok()?;
    let nanos_of_day: u64 = fields.next()?.parse().ok()?;
    let offset_secs: i32 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }

    let secs = nanos_of_day / NANOS_PER_SECOND;
    let time = Time::from_hms_nano(
        u8::try_from(secs / 3600).ok()?,
        (secs / 60 % 60) as u8,
        (secs % 60) as u8,
        (nanos_of_day % NANOS_PER_SECOND) as u32,
    )
    .ok()?;
    let date = Date::from_julian_day(julian_day).ok()?;
    let offset = UtcOffset::from_whole_seconds(offset_secs).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_offset(offset))
}
