//! Optimistic relay switching.
//!
//! A command flips the displayed state immediately and moves to
//! [`RelayPhase::Pending`]. The backend's answer either confirms a state or
//! rolls the display back to what it was before the command. While a command
//! is pending no other command is accepted.

use crate::{notice::Notifier, telemetry::TelemetrySynchronizer};
use meterapi::MeterBackend;
use metermodel::{MeterIdentity, RelayState};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
	/// The backend confirmed this state.
	Confirmed(RelayState),
	/// The command failed and the state was restored.
	RolledBack(RelayState),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayPhase {
	Idle,
	Pending {
		previous: RelayState,
		requested: RelayState,
	},
	Settled(Settlement),
}

/// What the presentation layer shows for the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayView {
	pub state: RelayState,
	pub phase: RelayPhase,
}

impl RelayView {
	pub fn idle(state: RelayState) -> Self {
		Self {
			state,
			phase: RelayPhase::Idle,
		}
	}

	/// Whether a new command would be accepted.
	pub fn accepts_commands(&self) -> bool {
		self.phase == RelayPhase::Idle
	}

	pub fn is_pending(&self) -> bool {
		matches!(self.phase, RelayPhase::Pending { .. })
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayEvent {
	/// Request the opposite of the current state.
	Toggle,
	/// Request a specific state.
	Set(RelayState),
	/// The backend accepted the command and reports this state.
	Confirmed(RelayState),
	/// The command failed.
	Failed,
	/// The outcome has been acted on.
	Acknowledged,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
	#[error("a relay command is already in progress")]
	Busy,

	#[error("relay cannot handle {event:?} while {phase:?}")]
	InvalidTransition { phase: RelayPhase, event: RelayEvent },

	#[error("relay command was aborted")]
	Aborted,
}

/// The relay state machine.
pub fn transition(view: RelayView, event: RelayEvent) -> Result<RelayView, RelayError> {
	let requested = match event {
		RelayEvent::Toggle => Some(view.state.toggled()),
		RelayEvent::Set(state) => Some(state),
		_ => None,
	};

	match (view.phase, requested, event) {
		(RelayPhase::Idle, Some(requested), _) => Ok(RelayView {
			state: requested,
			phase: RelayPhase::Pending {
				previous: view.state,
				requested,
			},
		}),
		(RelayPhase::Pending { .. } | RelayPhase::Settled(_), Some(_), _) => Err(RelayError::Busy),
		(RelayPhase::Pending { .. }, None, RelayEvent::Confirmed(state)) => Ok(RelayView {
			state,
			phase: RelayPhase::Settled(Settlement::Confirmed(state)),
		}),
		(RelayPhase::Pending { previous, .. }, None, RelayEvent::Failed) => Ok(RelayView {
			state: previous,
			phase: RelayPhase::Settled(Settlement::RolledBack(previous)),
		}),
		(RelayPhase::Settled(_), None, RelayEvent::Acknowledged) => Ok(RelayView::idle(view.state)),
		(phase, _, event) => Err(RelayError::InvalidTransition { phase, event }),
	}
}

struct Inner<B> {
	backend: Arc<B>,
	meter: MeterIdentity,
	notifier: Notifier,
	view: watch::Sender<RelayView>,
	telemetry: Option<TelemetrySynchronizer<B>>,
}

impl<B> Inner<B> {
	fn apply(&self, event: RelayEvent) -> Result<RelayView, RelayError> {
		let mut outcome = Err(RelayError::Busy);
		self.view.send_if_modified(|view| {
			outcome = transition(*view, event);
			match outcome {
				Ok(next) => {
					*view = next;
					true
				}
				Err(_) => false,
			}
		});
		outcome
	}
}

pub struct RelayController<B> {
	inner: Arc<Inner<B>>,
}

impl<B: MeterBackend + 'static> RelayController<B> {
	pub fn new(
		backend: Arc<B>,
		meter: MeterIdentity,
		initial: RelayState,
		notifier: Notifier,
	) -> Self {
		Self {
			inner: Arc::new(Inner {
				backend,
				meter,
				notifier,
				view: watch::Sender::new(RelayView::idle(initial)),
				telemetry: None,
			}),
		}
	}

	/// Refresh `telemetry` after every confirmed command.
	pub fn with_telemetry(
		backend: Arc<B>,
		initial: RelayState,
		telemetry: TelemetrySynchronizer<B>,
		notifier: Notifier,
	) -> Self {
		Self {
			inner: Arc::new(Inner {
				backend,
				meter: telemetry.meter().clone(),
				notifier,
				view: watch::Sender::new(RelayView::idle(initial)),
				telemetry: Some(telemetry),
			}),
		}
	}

	pub fn view(&self) -> RelayView {
		*self.inner.view.borrow()
	}

	pub fn subscribe(&self) -> watch::Receiver<RelayView> {
		self.inner.view.subscribe()
	}

	/// Switches the relay to the opposite of its displayed state.
	pub async fn toggle(&self) -> Result<Settlement, RelayError> {
		self.dispatch(RelayEvent::Toggle).await
	}

	/// Switches the relay to `desired`, even if it already shows that state.
	pub async fn set(&self, desired: RelayState) -> Result<Settlement, RelayError> {
		self.dispatch(RelayEvent::Set(desired)).await
	}

	async fn dispatch(&self, request: RelayEvent) -> Result<Settlement, RelayError> {
		let pending = self.inner.apply(request)?;

		// The command runs in its own task so it settles even if the caller
		// stops waiting.
		let inner = Arc::clone(&self.inner);
		let handle = tokio::spawn(async move { settle(&inner, pending.state).await });
		match handle.await {
			Ok(result) => result,
			Err(error) => {
				tracing::error!("relay command task failed: {error}");
				Err(RelayError::Aborted)
			}
		}
	}
}

async fn settle<B: MeterBackend + 'static>(
	inner: &Inner<B>,
	requested: RelayState,
) -> Result<Settlement, RelayError> {
	tracing::info!("switching relay of meter {} {}", inner.meter, requested);

	let event = match inner.backend.set_relay_state(&inner.meter, requested).await {
		Ok(confirmed) => RelayEvent::Confirmed(confirmed),
		Err(error) => {
			inner
				.notifier
				.error("Error", format!("Failed to toggle relay: {error}"));
			RelayEvent::Failed
		}
	};

	let settled = inner.apply(event)?;
	let RelayPhase::Settled(settlement) = settled.phase else {
		return Err(RelayError::InvalidTransition {
			phase: settled.phase,
			event,
		});
	};

	if let Settlement::Confirmed(state) = settlement {
		inner.notifier.info(
			"Success",
			format!("Relay turned {}", state.as_str().to_ascii_uppercase()),
		);
		if let Some(telemetry) = &inner.telemetry {
			telemetry.refresh_after_change().await;
		}
	}

	inner.apply(RelayEvent::Acknowledged)?;
	Ok(settlement)
}
