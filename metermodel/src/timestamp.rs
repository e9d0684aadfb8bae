//! Serde support for backend timestamps.
//!
//! The meter backend is not consistent about how it renders a point in time.
//! Depending on the endpoint it answers with RFC 3339, an RFC 2822 HTTP-date,
//! a naive `YYYY-MM-DD HH:MM:SS` string (UTC), or seconds since the epoch.
//! Values are always serialized back out as RFC 3339.
//!
//! ```ignore
//! #[derive(Deserialize, Serialize)]
//! struct Example {
//!     #[serde(with = "metermodel::timestamp")]
//!     timestamp: OffsetDateTime,
//! }
//! ```

use serde::{de, Deserialize, Deserializer, Serializer};
use time::{
	format_description::{
		well_known::{Rfc2822, Rfc3339},
		FormatItem,
	},
	macros::format_description,
	OffsetDateTime, PrimitiveDateTime,
};

const NAIVE_FORMATS: &[&[FormatItem<'_>]] = &[
	format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
	format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
	format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
	format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
];

/// Parses any timestamp representation the backend is known to produce.
pub fn parse(value: &str) -> Option<OffsetDateTime> {
	let value = value.trim();

	if let Ok(dt) = OffsetDateTime::parse(value, &Rfc3339) {
		return Some(dt);
	}

	if let Ok(dt) = OffsetDateTime::parse(value, &Rfc2822) {
		return Some(dt);
	}

	// HTTP-dates carry a "GMT" zone name rather than a numeric offset.
	if let Some(stripped) = value.strip_suffix(" GMT") {
		if let Ok(dt) = OffsetDateTime::parse(&format!("{stripped} +0000"), &Rfc2822) {
			return Some(dt);
		}
	}

	NAIVE_FORMATS
		.iter()
		.find_map(|format| PrimitiveDateTime::parse(value, format).ok())
		.map(PrimitiveDateTime::assume_utc)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
	Text(String),
	Seconds(i64),
	FractionalSeconds(f64),
}

pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
	time::serde::rfc3339::serialize(value, serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
	match RawTimestamp::deserialize(deserializer)? {
		RawTimestamp::Text(text) => parse(&text)
			.ok_or_else(|| de::Error::custom(format!("unrecognised timestamp: {text}"))),
		RawTimestamp::Seconds(seconds) => {
			OffsetDateTime::from_unix_timestamp(seconds).map_err(de::Error::custom)
		}
		RawTimestamp::FractionalSeconds(seconds) => {
			OffsetDateTime::from_unix_timestamp_nanos((seconds * 1e9) as i128)
				.map_err(de::Error::custom)
		}
	}
}
