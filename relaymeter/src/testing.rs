//! Scripted in-memory backend for exercising the workflows without a network.

use async_trait::async_trait;
use meterapi::{MeterBackend, Result};
use metermodel::{MeterIdentity, MeterReading, PowerSnapshot, RelayState, ReportEntry};
use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Mutex,
	},
	time::Duration,
};
use time::macros::datetime;

pub fn meter() -> MeterIdentity {
	MeterIdentity::new("12345678").unwrap()
}

pub fn power(current_power: f64, total_allocated: f64, total_consumed: f64) -> PowerSnapshot {
	PowerSnapshot {
		current_power,
		total_allocated,
		total_consumed,
	}
}

pub fn reading(consumption: f64) -> MeterReading {
	MeterReading {
		timestamp: datetime!(2024-05-01 08:00:00 UTC),
		consumption,
		voltage: 230.0,
		current: 0.4,
	}
}

pub fn report_entry(status: RelayState) -> ReportEntry {
	ReportEntry {
		timestamp: datetime!(2024-05-01 08:00:00 UTC),
		consumption: 1.5,
		voltage: 230.0,
		current: 0.4,
		power_factor: Some(0.95),
		status,
	}
}

#[derive(Debug)]
pub struct FakeBackend {
	delay: Duration,
	power: Mutex<Result<PowerSnapshot>>,
	reading: Mutex<Result<MeterReading>>,
	report: Mutex<Result<Vec<ReportEntry>>>,
	/// `None` confirms whatever state is requested.
	relay: Mutex<Option<Result<RelayState>>>,
	relay_requests: Mutex<Vec<RelayState>>,
	pub power_calls: AtomicUsize,
	pub reading_calls: AtomicUsize,
	pub report_calls: AtomicUsize,
}

impl FakeBackend {
	pub fn new() -> Self {
		Self {
			delay: Duration::ZERO,
			power: Mutex::new(Ok(power(5.0, 100.0, 40.0))),
			reading: Mutex::new(Ok(reading(1.5))),
			report: Mutex::new(Ok(Vec::new())),
			relay: Mutex::new(None),
			relay_requests: Mutex::new(Vec::new()),
			power_calls: AtomicUsize::new(0),
			reading_calls: AtomicUsize::new(0),
			report_calls: AtomicUsize::new(0),
		}
	}

	/// Every call takes `delay` to answer.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	pub fn set_power(&self, value: Result<PowerSnapshot>) {
		*self.power.lock().unwrap() = value;
	}

	pub fn set_reading(&self, value: Result<MeterReading>) {
		*self.reading.lock().unwrap() = value;
	}

	pub fn set_report(&self, value: Result<Vec<ReportEntry>>) {
		*self.report.lock().unwrap() = value;
	}

	pub fn set_relay(&self, value: Option<Result<RelayState>>) {
		*self.relay.lock().unwrap() = value;
	}

	pub fn relay_requests(&self) -> Vec<RelayState> {
		self.relay_requests.lock().unwrap().clone()
	}

	pub fn fetch_pairs(&self) -> (usize, usize) {
		(
			self.power_calls.load(Ordering::SeqCst),
			self.reading_calls.load(Ordering::SeqCst),
		)
	}

	async fn wait(&self) {
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
	}
}

#[async_trait]
impl MeterBackend for FakeBackend {
	async fn fetch_current_power(&self, _meter: &MeterIdentity) -> Result<PowerSnapshot> {
		self.power_calls.fetch_add(1, Ordering::SeqCst);
		self.wait().await;
		self.power.lock().unwrap().clone()
	}

	async fn fetch_latest_reading(&self, _meter: &MeterIdentity) -> Result<MeterReading> {
		self.reading_calls.fetch_add(1, Ordering::SeqCst);
		self.wait().await;
		self.reading.lock().unwrap().clone()
	}

	async fn fetch_port_report(&self, _meter: &MeterIdentity) -> Result<Vec<ReportEntry>> {
		self.report_calls.fetch_add(1, Ordering::SeqCst);
		self.wait().await;
		self.report.lock().unwrap().clone()
	}

	async fn set_relay_state(
		&self,
		_meter: &MeterIdentity,
		desired: RelayState,
	) -> Result<RelayState> {
		self.relay_requests.lock().unwrap().push(desired);
		self.wait().await;
		self.relay.lock().unwrap().clone().unwrap_or(Ok(desired))
	}
}
