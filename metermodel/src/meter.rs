use crate::lenient;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::{error, fmt};

/// Identifies a single meter by its meter number.
///
/// Deserializes from a string or an integer, so unquoted meter numbers in
/// configuration files are accepted.
#[derive(Clone, Debug, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(into = "String")]
pub struct MeterIdentity {
	meter_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyMeterNumber;

impl fmt::Display for EmptyMeterNumber {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("meter number must not be empty")
	}
}

impl error::Error for EmptyMeterNumber {}

impl MeterIdentity {
	/// Creates an identity, trimming surrounding whitespace.
	pub fn new(meter_number: impl AsRef<str>) -> Result<Self, EmptyMeterNumber> {
		let meter_number = meter_number.as_ref().trim();
		if meter_number.is_empty() {
			return Err(EmptyMeterNumber);
		}
		Ok(Self {
			meter_number: meter_number.to_string(),
		})
	}

	#[inline(always)]
	pub fn meter_number(&self) -> &str {
		&self.meter_number
	}
}

impl fmt::Display for MeterIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.meter_number)
	}
}

impl TryFrom<String> for MeterIdentity {
	type Error = EmptyMeterNumber;
	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl<'de> Deserialize<'de> for MeterIdentity {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let meter_number = lenient::identifier(deserializer)?;
		Self::new(meter_number).map_err(de::Error::custom)
	}
}

impl From<MeterIdentity> for String {
	fn from(value: MeterIdentity) -> Self {
		value.meter_number
	}
}
