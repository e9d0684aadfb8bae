use meterapi::MeterBackend;
use metermodel::{MeterIdentity, RelayState, ReportEntry};
use serde::Serialize;
use std::{io, sync::Arc};
use time::{format_description::FormatItem, macros::format_description, UtcOffset};

const DATE_FORMAT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[FormatItem<'_>] = format_description!("[hour]:[minute]:[second]");

/// Fetches the whole port report for a meter.
pub async fn fetch<B: MeterBackend + ?Sized>(
	backend: &B,
	meter: &MeterIdentity,
) -> meterapi::Result<Report> {
	let entries = backend.fetch_port_report(meter).await?;
	tracing::debug!("fetched {} report entries for meter {meter}", entries.len());
	Ok(Report::new(entries))
}

/// The local UTC offset, or UTC when it can't be determined.
///
/// Call this before the runtime starts any worker threads; the platform
/// refuses to report the offset from a multi-threaded process.
pub fn local_offset() -> UtcOffset {
	UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// An ordered, read-only port report. Cloning is cheap.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
	entries: Arc<[ReportEntry]>,
}

impl Default for Report {
	fn default() -> Self {
		Self::new(Vec::new())
	}
}

impl Report {
	pub fn new(entries: Vec<ReportEntry>) -> Self {
		Self {
			entries: entries.into(),
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Relay state recorded by the most recent entry.
	pub fn latest_status(&self) -> Option<RelayState> {
		self.entries.first().map(|entry| entry.status)
	}

	/// Display rows with timestamps shown at `offset`.
	pub fn rows(&self, offset: UtcOffset) -> Vec<ReportRow> {
		self.entries
			.iter()
			.map(|entry| ReportRow::from_entry(entry, offset))
			.collect()
	}

	/// Writes the raw entries as CSV with a header row.
	pub fn write_csv<W: io::Write>(&self, writer: W) -> csv::Result<()> {
		let mut writer = csv::WriterBuilder::new()
			.has_headers(true)
			.from_writer(writer);
		for entry in self.entries.iter() {
			writer.serialize(entry)?;
		}
		writer.flush()?;
		Ok(())
	}
}

/// One report entry, formatted for display.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ReportRow {
	pub date: String,
	pub time: String,
	pub consumption: String,
	pub voltage: String,
	pub current: String,
	pub power_factor: String,
	pub status: String,
}

impl ReportRow {
	pub fn from_entry(entry: &ReportEntry, offset: UtcOffset) -> Self {
		let timestamp = entry.timestamp.to_offset(offset);
		Self {
			date: timestamp
				.format(DATE_FORMAT)
				.unwrap_or_else(|_| timestamp.date().to_string()),
			time: timestamp
				.format(TIME_FORMAT)
				.unwrap_or_else(|_| timestamp.time().to_string()),
			consumption: format!("{} kWh", entry.consumption),
			voltage: format!("{} V", entry.voltage),
			current: format!("{} A", entry.current),
			power_factor: entry
				.power_factor
				.map(|factor| factor.to_string())
				.unwrap_or_else(|| "N/A".to_string()),
			status: entry.status.connection_label().to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::{fetch, Report, ReportRow};
	use meterapi::{Client, ClientOptions};
	use metermodel::{MeterIdentity, RelayState, ReportEntry};
	use pretty_assertions::assert_eq;
	use time::macros::{datetime, offset};
	use wiremock::{
		matchers::{method, path},
		Mock, MockServer, ResponseTemplate,
	};

	fn entry(status: RelayState, power_factor: Option<f64>) -> ReportEntry {
		ReportEntry {
			timestamp: datetime!(2024-05-01 22:30:00 UTC),
			consumption: 1.5,
			voltage: 230.0,
			current: 0.25,
			power_factor,
			status,
		}
	}

	#[test]
	fn row_formatting() {
		let row = ReportRow::from_entry(&entry(RelayState::On, Some(0.98)), offset!(+2));
		assert_eq!(
			row,
			ReportRow {
				date: "2024-05-02".into(),
				time: "00:30:00".into(),
				consumption: "1.5 kWh".into(),
				voltage: "230 V".into(),
				current: "0.25 A".into(),
				power_factor: "0.98".into(),
				status: "Connected".into(),
			}
		);
	}

	#[test]
	fn row_without_power_factor() {
		let row = ReportRow::from_entry(&entry(RelayState::Off, None), offset!(UTC));
		assert_eq!(row.power_factor, "N/A");
		assert_eq!(row.status, "Disconnected");
	}

	#[test]
	fn latest_status_is_first_entry() {
		let report = Report::new(vec![
			entry(RelayState::Off, None),
			entry(RelayState::On, None),
		]);
		assert_eq!(report.latest_status(), Some(RelayState::Off));
		assert_eq!(Report::default().latest_status(), None);
	}

	#[test]
	fn csv_export() {
		let report = Report::new(vec![entry(RelayState::Off, None)]);
		let mut output = Vec::new();
		report.write_csv(&mut output).unwrap();
		assert_eq!(
			String::from_utf8(output).unwrap(),
			"timestamp,consumption,voltage,current,power_factor,status\n\
			 2024-05-01T22:30:00Z,1.5,230.0,0.25,,off\n"
		);
	}

	#[tokio::test]
	async fn empty_report_is_not_an_error() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/api/port_report/12345678"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
			.mount(&server)
			.await;

		let client = Client::new(server.uri(), ClientOptions::default()).unwrap();
		let meter = MeterIdentity::new("12345678").unwrap();
		let report = fetch(&client, &meter).await.unwrap();
		assert!(report.is_empty());
	}
}
