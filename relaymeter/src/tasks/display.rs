use history::Report;
use metermodel::MeterIdentity;
use relaymeter::{
	notice::{Notice, Severity},
	relay::{RelayPhase, RelayView},
	telemetry::TelemetryState,
};
use std::{
	fmt,
	io::{self, Write},
};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime, UtcOffset};
use tokio::{
	sync::{mpsc, watch},
	task::JoinHandle,
};

const TIMESTAMP_FORMAT: &[FormatItem<'_>] =
	format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Page {
	lines: Vec<String>,
}

impl fmt::Display for Page {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for line in &self.lines {
			writeln!(f, "{line}")?;
		}
		Ok(())
	}
}

fn timestamp(value: OffsetDateTime, offset: UtcOffset) -> String {
	let value = value.to_offset(offset);
	value
		.format(TIMESTAMP_FORMAT)
		.unwrap_or_else(|_| value.to_string())
}

pub fn dashboard_page(
	meter: &MeterIdentity,
	telemetry: &TelemetryState,
	refreshing: bool,
	relay: &RelayView,
	offset: UtcOffset,
) -> Page {
	let mut lines = vec![format!("Meter {meter}")];

	lines.push(match relay.phase {
		RelayPhase::Pending { requested, .. } => format!(
			"Power Status: {} (switching {requested}...)",
			relay.state.connection_label()
		),
		_ => format!("Power Status: {}", relay.state.connection_label()),
	});

	if !telemetry.is_loaded() && refreshing {
		lines.push("Loading dashboard data...".to_string());
	}

	match &telemetry.power {
		Some(power) => {
			lines.push(format!("Current Power: {} kWh", power.current_power));
			lines.push(format!("Total Allocated: {} kWh", power.total_allocated));
			lines.push(format!("Total Consumed: {} kWh", power.total_consumed));
			lines.push(format!("Remaining: {} kWh", power.remaining()));
		}
		None => lines.push("Current Power: --".to_string()),
	}

	match &telemetry.reading {
		Some(reading) => {
			lines.push(format!(
				"Latest Reading: {}",
				timestamp(reading.timestamp, offset)
			));
			lines.push(format!("  Consumption: {} kWh", reading.consumption));
			lines.push(format!("  Voltage: {} V", reading.voltage));
			lines.push(format!("  Current: {} A", reading.current));
		}
		None => lines.push("No reading data available".to_string()),
	}

	if let Some(error) = &telemetry.error {
		lines.push(format!("Last refresh failed: {error}"));
	} else if let Some(updated_at) = telemetry.updated_at {
		lines.push(format!("Updated {}", timestamp(updated_at, offset)));
	}

	let relay_action = if !relay.accepts_commands() {
		"[t] (relay busy)".to_string()
	} else if relay.state.is_connected() {
		"[t] disconnect".to_string()
	} else {
		"[t] connect".to_string()
	};
	lines.push(format!("[r] refresh  {relay_action}  [q] quit"));

	Page { lines }
}

pub fn report_page(report: &Report, offset: UtcOffset) -> Page {
	if report.is_empty() {
		return Page {
			lines: vec!["No port report data available".to_string()],
		};
	}

	let mut lines = vec![format!(
		"{:<10}  {:<8}  {:>12}  {:>9}  {:>9}  {:>6}  {}",
		"Date", "Time", "Consumption", "Voltage", "Current", "PF", "Status"
	)];
	lines.extend(report.rows(offset).into_iter().map(|row| {
		format!(
			"{:<10}  {:<8}  {:>12}  {:>9}  {:>9}  {:>6}  {}",
			row.date, row.time, row.consumption, row.voltage, row.current, row.power_factor, row.status
		)
	}));

	Page { lines }
}

pub fn notice_line(notice: &Notice) -> String {
	match notice.severity {
		Severity::Info => format!("{}: {}", notice.title, notice.message),
		Severity::Error => format!("! {}: {}", notice.title, notice.message),
	}
}

pub fn print(page: &Page) -> io::Result<()> {
	let mut stdout = io::stdout().lock();
	write!(stdout, "{page}")?;
	stdout.flush()
}

/// Everything the dashboard display reacts to.
pub struct Feeds {
	pub telemetry: watch::Receiver<TelemetryState>,
	pub refreshing: watch::Receiver<bool>,
	pub relay: watch::Receiver<RelayView>,
	pub notices: mpsc::UnboundedReceiver<Notice>,
}

pub fn create_task(
	meter: MeterIdentity,
	offset: UtcOffset,
	feeds: Feeds,
	shutdown: watch::Receiver<bool>,
) -> JoinHandle<anyhow::Result<()>> {
	tracing::info!("starting dashboard display task");
	tokio::spawn(start_task(meter, offset, feeds, shutdown))
}

pub async fn start_task(
	meter: MeterIdentity,
	offset: UtcOffset,
	mut feeds: Feeds,
	mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
	loop {
		let page = dashboard_page(
			&meter,
			&feeds.telemetry.borrow_and_update(),
			*feeds.refreshing.borrow_and_update(),
			&feeds.relay.borrow_and_update(),
			offset,
		);
		println!();
		print(&page)?;

		tokio::select! {
			Ok(()) = feeds.telemetry.changed() => {}
			Ok(()) = feeds.relay.changed() => {}
			Ok(()) = feeds.refreshing.changed() => {}
			Some(notice) = feeds.notices.recv() => {
				println!("{}", notice_line(&notice));
			}
			_ = shutdown.changed() => {
				tracing::info!("shutting down display task");
				break;
			}
			else => break,
		}
	}
	Ok(())
}
