use crate::RelayState;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Power budget of a meter as reported by `/api/current_power`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PowerSnapshot {
	/// Current power draw in kWh.
	#[serde(deserialize_with = "crate::lenient::number")]
	pub current_power: f64,
	/// Energy allocated to the meter in kWh.
	#[serde(deserialize_with = "crate::lenient::number")]
	pub total_allocated: f64,
	/// Energy consumed against the allocation in kWh.
	#[serde(deserialize_with = "crate::lenient::number")]
	pub total_consumed: f64,
}

impl PowerSnapshot {
	/// Allocation left over, never negative.
	pub fn remaining(&self) -> f64 {
		(self.total_allocated - self.total_consumed).max(0.0)
	}
}

/// Most recent reading taken at the meter.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct MeterReading {
	#[serde(with = "crate::timestamp")]
	pub timestamp: OffsetDateTime,
	/// Consumption in kWh.
	#[serde(deserialize_with = "crate::lenient::number")]
	pub consumption: f64,
	/// Voltage in Volts.
	#[serde(deserialize_with = "crate::lenient::number")]
	pub voltage: f64,
	/// Current in Amps.
	#[serde(deserialize_with = "crate::lenient::number")]
	pub current: f64,
}

/// One row of a meter's port report.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReportEntry {
	#[serde(with = "crate::timestamp")]
	pub timestamp: OffsetDateTime,
	#[serde(deserialize_with = "crate::lenient::number")]
	pub consumption: f64,
	#[serde(deserialize_with = "crate::lenient::number")]
	pub voltage: f64,
	#[serde(deserialize_with = "crate::lenient::number")]
	pub current: f64,
	#[serde(default, deserialize_with = "crate::lenient::optional_number")]
	pub power_factor: Option<f64>,
	/// Relay state at the time of the reading.
	pub status: RelayState,
}

#[cfg(test)]
mod tests {
	use super::{MeterReading, PowerSnapshot, ReportEntry};
	use crate::RelayState;
	use pretty_assertions::assert_eq;
	use time::macros::datetime;

	#[test]
	fn power_snapshot_from_backend() {
		let snapshot: PowerSnapshot = serde_json::from_str(
			r#"{"current_power": 5, "total_allocated": "100", "total_consumed": 40.0}"#,
		)
		.unwrap();
		assert_eq!(
			snapshot,
			PowerSnapshot {
				current_power: 5.0,
				total_allocated: 100.0,
				total_consumed: 40.0,
			}
		);
		assert_eq!(snapshot.remaining(), 60.0);
	}

	#[test]
	fn power_snapshot_requires_every_field() {
		let result =
			serde_json::from_str::<PowerSnapshot>(r#"{"current_power": 5, "total_allocated": 100}"#);
		assert!(result.is_err());
	}

	#[test]
	fn meter_reading_from_backend() {
		let reading: MeterReading = serde_json::from_str(
			r#"{"timestamp": "2024-05-01 08:00:00", "consumption": 1.5, "voltage": 229.8, "current": 0.4}"#,
		)
		.unwrap();
		assert_eq!(reading.timestamp, datetime!(2024-05-01 08:00:00 UTC));
		assert_eq!(reading.voltage, 229.8);
	}

	#[test]
	fn report_entry_without_power_factor() {
		let entry: ReportEntry = serde_json::from_str(
			r#"{"timestamp": "2024-05-01T08:00:00Z", "consumption": 1.5, "voltage": 230, "current": 0.4, "power_factor": null, "status": "off"}"#,
		)
		.unwrap();
		assert_eq!(entry.power_factor, None);
		assert_eq!(entry.status, RelayState::Off);

		let entry: ReportEntry = serde_json::from_str(
			r#"{"timestamp": "2024-05-01T08:00:00Z", "consumption": 1.5, "voltage": 230, "current": 0.4, "status": "on"}"#,
		)
		.unwrap();
		assert_eq!(entry.power_factor, None);
	}
}
