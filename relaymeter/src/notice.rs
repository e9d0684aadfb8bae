use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
	Info,
	Error,
}

/// A message for the operator. Every failure produces exactly one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
	pub severity: Severity,
	pub title: String,
	pub message: String,
}

/// Sends notices to whichever presentation layer holds the receiver.
///
/// The channel is unbounded so a component never waits on a slow or absent
/// reader.
#[derive(Clone, Debug)]
pub struct Notifier {
	tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}

	pub fn info(&self, title: impl Into<String>, message: impl Into<String>) {
		self.publish(Notice {
			severity: Severity::Info,
			title: title.into(),
			message: message.into(),
		});
	}

	pub fn error(&self, title: impl Into<String>, message: impl Into<String>) {
		self.publish(Notice {
			severity: Severity::Error,
			title: title.into(),
			message: message.into(),
		});
	}

	fn publish(&self, notice: Notice) {
		match notice.severity {
			Severity::Info => tracing::info!("{}: {}", notice.title, notice.message),
			Severity::Error => tracing::warn!("{}: {}", notice.title, notice.message),
		}

		if self.tx.send(notice).is_err() {
			tracing::trace!("notice dropped, no presentation layer is listening");
		}
	}
}
