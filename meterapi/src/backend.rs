//! The part of the backend the telemetry and relay workflows depend on.
//!
//! [`Client`] is the production implementation. Anything else implementing
//! [`MeterBackend`] (an in-memory fake, a recorded session) can drive the same
//! workflows without a network.

use crate::{Client, Result};
use async_trait::async_trait;
use metermodel::{MeterIdentity, MeterReading, PowerSnapshot, RelayState, ReportEntry};
use std::sync::Arc;

#[async_trait]
pub trait MeterBackend: Send + Sync {
	async fn fetch_current_power(&self, meter: &MeterIdentity) -> Result<PowerSnapshot>;

	async fn fetch_latest_reading(&self, meter: &MeterIdentity) -> Result<MeterReading>;

	async fn fetch_port_report(&self, meter: &MeterIdentity) -> Result<Vec<ReportEntry>>;

	/// Returns the state the backend confirms, which may differ from `desired`.
	async fn set_relay_state(&self, meter: &MeterIdentity, desired: RelayState)
		-> Result<RelayState>;
}

#[async_trait]
impl MeterBackend for Client {
	async fn fetch_current_power(&self, meter: &MeterIdentity) -> Result<PowerSnapshot> {
		Client::fetch_current_power(self, meter).await
	}

	async fn fetch_latest_reading(&self, meter: &MeterIdentity) -> Result<MeterReading> {
		Client::fetch_latest_reading(self, meter).await
	}

	async fn fetch_port_report(&self, meter: &MeterIdentity) -> Result<Vec<ReportEntry>> {
		Client::fetch_port_report(self, meter).await
	}

	async fn set_relay_state(
		&self,
		meter: &MeterIdentity,
		desired: RelayState,
	) -> Result<RelayState> {
		Client::set_relay_state(self, meter, desired).await
	}
}

#[async_trait]
impl<B: MeterBackend + ?Sized> MeterBackend for Arc<B> {
	async fn fetch_current_power(&self, meter: &MeterIdentity) -> Result<PowerSnapshot> {
		(**self).fetch_current_power(meter).await
	}

	async fn fetch_latest_reading(&self, meter: &MeterIdentity) -> Result<MeterReading> {
		(**self).fetch_latest_reading(meter).await
	}

	async fn fetch_port_report(&self, meter: &MeterIdentity) -> Result<Vec<ReportEntry>> {
		(**self).fetch_port_report(meter).await
	}

	async fn set_relay_state(
		&self,
		meter: &MeterIdentity,
		desired: RelayState,
	) -> Result<RelayState> {
		(**self).set_relay_state(meter, desired).await
	}
}
