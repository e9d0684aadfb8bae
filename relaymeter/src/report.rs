use crate::notice::Notifier;
use history::Report;
use meterapi::MeterBackend;
use metermodel::MeterIdentity;
use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};
use tokio::sync::watch;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportState {
	/// The last report fetched successfully.
	pub report: Option<Report>,
	pub loading: bool,
	/// Set by a failed fetch, cleared by the next successful one.
	pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReportView<'a> {
	NotLoaded,
	/// The backend has no entries for the meter.
	Empty,
	Entries(&'a Report),
}

impl ReportState {
	pub fn view(&self) -> ReportView<'_> {
		match &self.report {
			None => ReportView::NotLoaded,
			Some(report) if report.is_empty() => ReportView::Empty,
			Some(report) => ReportView::Entries(report),
		}
	}
}

/// Fetches the port report on demand and keeps the last good copy.
///
/// Refreshes may overlap. Only the most recently issued one updates the
/// state, so an older response never replaces a newer one.
pub struct ReportRetriever<B> {
	backend: Arc<B>,
	meter: MeterIdentity,
	notifier: Notifier,
	state: watch::Sender<ReportState>,
	issued: AtomicU64,
}

impl<B: MeterBackend> ReportRetriever<B> {
	pub fn new(backend: Arc<B>, meter: MeterIdentity, notifier: Notifier) -> Self {
		Self {
			backend,
			meter,
			notifier,
			state: watch::Sender::new(ReportState::default()),
			issued: AtomicU64::new(0),
		}
	}

	pub fn subscribe(&self) -> watch::Receiver<ReportState> {
		self.state.subscribe()
	}

	pub fn state(&self) -> ReportState {
		self.state.borrow().clone()
	}

	pub async fn refresh(&self) -> meterapi::Result<Report> {
		let request = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
		self.state.send_modify(|state| state.loading = true);

		let result = history::fetch(self.backend.as_ref(), &self.meter).await;
		if let Err(error) = &result {
			self.notifier
				.error("Error", format!("Failed to load port report: {error}"));
		}

		if self.issued.load(Ordering::SeqCst) != request {
			tracing::debug!("port report request {request} superseded, not publishing");
			return result;
		}

		match &result {
			Ok(report) => {
				if report.is_empty() {
					tracing::info!("no port report data for meter {}", self.meter);
				}
				self.state.send_modify(|state| {
					state.report = Some(report.clone());
					state.loading = false;
					state.error = None;
				});
			}
			Err(error) => {
				self.state.send_modify(|state| {
					state.loading = false;
					state.error = Some(error.to_string());
				});
			}
		}
		result
	}
}

#[cfg(test)]
mod tests {
	use super::{ReportRetriever, ReportView};
	use crate::{
		notice::{Notifier, Severity},
		testing::{meter, report_entry, FakeBackend},
	};
	use meterapi::Error;
	use metermodel::RelayState;
	use pretty_assertions::assert_eq;
	use std::{sync::Arc, time::Duration};
	use tokio::time::sleep;

	#[tokio::test]
	async fn empty_report_is_not_an_error() {
		let backend = Arc::new(FakeBackend::new());
		let (notifier, mut notices) = Notifier::channel();
		let retriever = ReportRetriever::new(backend, meter(), notifier);

		assert_eq!(retriever.state().view(), ReportView::NotLoaded);

		let report = retriever.refresh().await.unwrap();
		assert!(report.is_empty());

		let state = retriever.state();
		assert_eq!(state.view(), ReportView::Empty);
		assert_eq!(state.error, None);
		assert!(!state.loading);
		assert!(notices.try_recv().is_err());
	}

	#[tokio::test]
	async fn failure_keeps_last_report() {
		let backend = Arc::new(FakeBackend::new());
		backend.set_report(Ok(vec![
			report_entry(RelayState::Off),
			report_entry(RelayState::On),
		]));
		let (notifier, mut notices) = Notifier::channel();
		let retriever = ReportRetriever::new(Arc::clone(&backend), meter(), notifier);
		retriever.refresh().await.unwrap();

		backend.set_report(Err(Error::Network("connection refused".into())));
		let error = retriever.refresh().await.unwrap_err();
		assert_eq!(error, Error::Network("connection refused".into()));

		let state = retriever.state();
		let ReportView::Entries(report) = state.view() else {
			panic!("expected entries, got {:?}", state.view());
		};
		assert_eq!(report.len(), 2);
		assert_eq!(report.latest_status(), Some(RelayState::Off));
		assert_eq!(
			state.error.as_deref(),
			Some("network error: connection refused")
		);

		let notice = notices.try_recv().unwrap();
		assert_eq!(notice.severity, Severity::Error);
		assert!(notices.try_recv().is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn superseded_request_does_not_publish() {
		let backend = Arc::new(FakeBackend::new().with_delay(Duration::from_secs(2)));
		backend.set_report(Ok(vec![report_entry(RelayState::On)]));
		let (notifier, _notices) = Notifier::channel();
		let retriever = Arc::new(ReportRetriever::new(Arc::clone(&backend), meter(), notifier));

		let first = tokio::spawn({
			let retriever = Arc::clone(&retriever);
			async move { retriever.refresh().await }
		});
		sleep(Duration::from_secs(1)).await;
		let second = tokio::spawn({
			let retriever = Arc::clone(&retriever);
			async move { retriever.refresh().await }
		});

		// The first answer arrives while the second request is outstanding.
		sleep(Duration::from_millis(1500)).await;
		assert_eq!(first.await.unwrap().unwrap().len(), 1);
		let state = retriever.state();
		assert!(state.loading);
		assert_eq!(state.view(), ReportView::NotLoaded);

		backend.set_report(Ok(vec![
			report_entry(RelayState::Off),
			report_entry(RelayState::On),
		]));
		assert_eq!(second.await.unwrap().unwrap().len(), 2);

		let state = retriever.state();
		assert!(!state.loading);
		let ReportView::Entries(report) = state.view() else {
			panic!("expected entries, got {:?}", state.view());
		};
		assert_eq!(report.latest_status(), Some(RelayState::Off));
	}
}
