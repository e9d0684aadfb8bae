//! Keeps a meter's power snapshot and latest reading fresh.
//!
//! A refresh cycle fetches both values concurrently and publishes them
//! together once both have settled. If either fetch fails nothing is
//! replaced; the previous values stay visible next to the error. Requests
//! that arrive while a cycle is running join that cycle instead of starting
//! another one.

use crate::notice::Notifier;
use futures::{
	future::{BoxFuture, Shared},
	FutureExt,
};
use meterapi::MeterBackend;
use metermodel::{MeterIdentity, MeterReading, PowerSnapshot};
use std::{
	sync::{Arc, Mutex, MutexGuard, PoisonError},
	time::Duration,
};
use time::OffsetDateTime;
use tokio::{
	sync::watch,
	task::JoinHandle,
	time::{interval, MissedTickBehavior},
};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TelemetryState {
	pub power: Option<PowerSnapshot>,
	pub reading: Option<MeterReading>,
	/// Set by a failed cycle, cleared by the next successful one.
	pub error: Option<String>,
	/// Number of cycles published so far.
	pub generation: u64,
	/// When `power` and `reading` were last replaced.
	pub updated_at: Option<OffsetDateTime>,
}

impl TelemetryState {
	pub fn is_loaded(&self) -> bool {
		self.power.is_some() && self.reading.is_some()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// Both values were replaced.
	Updated,
	/// At least one fetch failed; the previous values were kept.
	Failed,
	/// The synchronizer was deactivated before the cycle finished.
	Discarded,
}

type Flight = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct Slot {
	/// Sequence number of the most recently launched cycle.
	launched: u64,
	flight: Option<(u64, Flight)>,
}

struct Inner<B> {
	backend: Arc<B>,
	meter: MeterIdentity,
	notifier: Notifier,
	state: watch::Sender<TelemetryState>,
	refreshing: watch::Sender<bool>,
	active: watch::Sender<bool>,
	slot: Mutex<Slot>,
}

pub struct TelemetrySynchronizer<B> {
	inner: Arc<Inner<B>>,
}

impl<B> Clone for TelemetrySynchronizer<B> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<B: MeterBackend + 'static> TelemetrySynchronizer<B> {
	/// Creates an active synchronizer with nothing loaded yet.
	pub fn new(backend: Arc<B>, meter: MeterIdentity, notifier: Notifier) -> Self {
		Self {
			inner: Arc::new(Inner {
				backend,
				meter,
				notifier,
				state: watch::Sender::new(TelemetryState::default()),
				refreshing: watch::Sender::new(false),
				active: watch::Sender::new(true),
				slot: Mutex::new(Slot::default()),
			}),
		}
	}

	pub fn meter(&self) -> &MeterIdentity {
		&self.inner.meter
	}

	pub fn subscribe(&self) -> watch::Receiver<TelemetryState> {
		self.inner.state.subscribe()
	}

	/// Whether a cycle is currently running.
	pub fn refreshing(&self) -> watch::Receiver<bool> {
		self.inner.refreshing.subscribe()
	}

	pub fn state(&self) -> TelemetryState {
		self.inner.state.borrow().clone()
	}

	pub fn is_active(&self) -> bool {
		*self.inner.active.borrow()
	}

	/// Runs a refresh cycle, or waits for the one already in flight.
	pub async fn refresh(&self) -> RefreshOutcome {
		self.refresh_from(0).await
	}

	/// Runs a cycle that starts after this call. A cycle already in flight
	/// may have fetched stale values, so it is waited out rather than joined.
	pub async fn refresh_after_change(&self) -> RefreshOutcome {
		let since = self.inner.slot().launched;
		self.refresh_from(since + 1).await
	}

	/// Joins the cycle in flight if it was launched at or after `first`,
	/// otherwise waits for it and tries again.
	async fn refresh_from(&self, first: u64) -> RefreshOutcome {
		loop {
			let (sequence, flight) = {
				let mut slot = self.inner.slot();
				if !self.is_active() {
					tracing::debug!("ignoring refresh of inactive meter {}", self.inner.meter);
					return RefreshOutcome::Discarded;
				}

				match slot.flight.clone() {
					Some(flight) => {
						tracing::debug!(
							"joining refresh already in flight for meter {}",
							self.inner.meter
						);
						flight
					}
					None => self.launch(&mut slot),
				}
			};

			let outcome = flight.await;
			if sequence >= first {
				return outcome;
			}
		}
	}

	fn launch(&self, slot: &mut Slot) -> (u64, Flight) {
		self.inner.refreshing.send_replace(true);

		let inner = Arc::clone(&self.inner);
		let handle = tokio::spawn(async move {
			let result = inner.fetch_both().await;
			inner.settle(result)
		});

		let flight = async move {
			handle.await.unwrap_or_else(|error| {
				tracing::error!("refresh task failed: {error}");
				RefreshOutcome::Discarded
			})
		}
		.boxed()
		.shared();

		slot.launched += 1;
		slot.flight = Some((slot.launched, flight.clone()));
		(slot.launched, flight)
	}

	/// Refreshes now and then every `period` until the returned timer is
	/// cancelled, dropped, or the synchronizer is deactivated.
	pub fn start(&self, period: Duration) -> RefreshTimer {
		let period = if period.is_zero() {
			tracing::warn!("refresh period must be positive, using the default");
			DEFAULT_REFRESH_INTERVAL
		} else {
			period
		};
		let (cancel, cancelled) = watch::channel(false);
		tracing::info!(
			"refreshing meter {} every {}s",
			self.inner.meter,
			period.as_secs()
		);
		let handle = tokio::spawn(run_timer(self.clone(), period, cancelled));
		RefreshTimer { cancel, handle }
	}

	/// Stops all refreshing. A cycle in flight finishes without publishing.
	pub fn deactivate(&self) {
		if self.inner.active.send_replace(false) {
			tracing::info!("deactivated telemetry for meter {}", self.inner.meter);
		}
	}
}

impl<B: MeterBackend> Inner<B> {
	fn slot(&self) -> MutexGuard<'_, Slot> {
		self.slot.lock().unwrap_or_else(PoisonError::into_inner)
	}

	async fn fetch_both(
		&self,
	) -> Option<(
		meterapi::Result<PowerSnapshot>,
		meterapi::Result<MeterReading>,
	)> {
		let mut active = self.active.subscribe();
		let fetches = async {
			tokio::join!(
				self.backend.fetch_current_power(&self.meter),
				self.backend.fetch_latest_reading(&self.meter),
			)
		};

		tokio::select! {
			result = fetches => Some(result),
			_ = active.wait_for(|active| !active) => None,
		}
	}

	fn settle(
		&self,
		result: Option<(
			meterapi::Result<PowerSnapshot>,
			meterapi::Result<MeterReading>,
		)>,
	) -> RefreshOutcome {
		self.slot().flight.take();
		self.refreshing.send_replace(false);

		let Some((power, reading)) = result.filter(|_| *self.active.borrow()) else {
			tracing::debug!("discarding refresh of inactive meter {}", self.meter);
			return RefreshOutcome::Discarded;
		};

		match (power, reading) {
			(Ok(power), Ok(reading)) => {
				tracing::debug!(
					"meter {}: {} kWh remaining, latest reading {} kWh",
					self.meter,
					power.remaining(),
					reading.consumption
				);
				self.state.send_modify(|state| {
					state.power = Some(power);
					state.reading = Some(reading);
					state.error = None;
					state.generation += 1;
					state.updated_at = Some(OffsetDateTime::now_utc());
				});
				RefreshOutcome::Updated
			}
			(Err(error), _) | (_, Err(error)) => {
				self.notifier
					.error("Error", format!("Failed to load dashboard data: {error}"));
				self.state.send_modify(|state| {
					state.error = Some(error.to_string());
					state.generation += 1;
				});
				RefreshOutcome::Failed
			}
		}
	}
}

/// Handle to a periodic refresh. Dropping it stops the timer.
#[derive(Debug)]
pub struct RefreshTimer {
	cancel: watch::Sender<bool>,
	handle: JoinHandle<()>,
}

impl RefreshTimer {
	pub fn cancel(&self) {
		self.cancel.send_replace(true);
	}

	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}
}

impl Drop for RefreshTimer {
	fn drop(&mut self) {
		self.cancel();
		self.handle.abort();
	}
}

async fn run_timer<B: MeterBackend + 'static>(
	synchronizer: TelemetrySynchronizer<B>,
	period: Duration,
	mut cancelled: watch::Receiver<bool>,
) {
	let mut active = synchronizer.inner.active.subscribe();
	let mut ticks = interval(period);
	ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			biased;
			_ = cancelled.wait_for(|cancelled| *cancelled).map(|_| ()) => break,
			_ = active.wait_for(|active| !active).map(|_| ()) => break,
			_ = ticks.tick() => {
				synchronizer.refresh().await;
			}
		}
	}

	tracing::debug!("refresh timer for meter {} stopped", synchronizer.inner.meter);
}
