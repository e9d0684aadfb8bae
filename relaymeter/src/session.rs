//! The logged-in user, kept between invocations.
//!
//! A session is read once at startup and handed to whatever needs it. It
//! holds the backend's session cookie, so the file store creates its file
//! readable by the owner only.

use meterapi::SessionResult;
use metermodel::MeterIdentity;
use serde::{Deserialize, Serialize};
use std::{
	fs, io,
	path::{Path, PathBuf},
	sync::{Mutex, PoisonError},
};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Session {
	pub username: String,
	#[serde(default)]
	pub role: Option<String>,
	#[serde(default)]
	pub meter_number: Option<MeterIdentity>,
	#[serde(default)]
	pub cookie: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub logged_in_at: OffsetDateTime,
}

impl Session {
	/// Builds a session from a login. The meter number comes from the user
	/// record when the backend sends one, otherwise from `fallback`.
	pub fn from_login(login: SessionResult, fallback: Option<MeterIdentity>) -> Self {
		let meter_number = login
			.user
			.as_ref()
			.and_then(|user| user.get("meter_number"))
			.and_then(|value| match value {
				serde_json::Value::String(number) => MeterIdentity::new(number).ok(),
				serde_json::Value::Number(number) => MeterIdentity::new(number.to_string()).ok(),
				_ => None,
			})
			.or(fallback);

		Self {
			username: login.username,
			role: login.role,
			meter_number,
			cookie: login.cookie,
			logged_in_at: OffsetDateTime::now_utc(),
		}
	}

	pub fn is_admin(&self) -> bool {
		self.role.as_deref() == Some("admin")
	}
}

#[derive(Error, Debug)]
pub enum SessionError {
	#[error("session storage: {0}")]
	Io(#[from] io::Error),

	#[error("stored session is corrupt: {0}")]
	Corrupt(#[from] serde_json::Error),
}

pub trait SessionStore {
	fn load(&self) -> Result<Option<Session>, SessionError>;

	fn save(&self, session: &Session) -> Result<(), SessionError>;

	/// Forgets the stored session. Clearing an empty store is not an error.
	fn clear(&self) -> Result<(), SessionError>;
}

/// A session stored as JSON at a fixed path.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
	path: PathBuf,
}

impl FileSessionStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl SessionStore for FileSessionStore {
	fn load(&self) -> Result<Option<Session>, SessionError> {
		let contents = match fs::read(&self.path) {
			Ok(contents) => contents,
			Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(error) => return Err(error.into()),
		};
		let session = serde_json::from_slice(&contents)?;
		Ok(Some(session))
	}

	fn save(&self, session: &Session) -> Result<(), SessionError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent)?;
		}

		let mut options = fs::OpenOptions::new();
		options.write(true).create(true).truncate(true);
		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;
			options.mode(0o600);
		}

		let file = options.open(&self.path)?;
		serde_json::to_writer_pretty(file, session).map_err(io::Error::from)?;
		tracing::debug!("saved session to {}", self.path.display());
		Ok(())
	}

	fn clear(&self) -> Result<(), SessionError> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(error) => Err(error.into()),
		}
	}
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
	session: Mutex<Option<Session>>,
}

impl SessionStore for MemorySessionStore {
	fn load(&self) -> Result<Option<Session>, SessionError> {
		Ok(self
			.session
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone())
	}

	fn save(&self, session: &Session) -> Result<(), SessionError> {
		*self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
		Ok(())
	}

	fn clear(&self) -> Result<(), SessionError> {
		self.session
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();
		Ok(())
	}
}
