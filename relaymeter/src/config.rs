use metermodel::{MeterIdentity, RelayState};
use relaymeter::telemetry::DEFAULT_REFRESH_INTERVAL;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use url::Url;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub api: ApiConfig,

	/// Meter to operate on when none is given on the command line.
	#[serde(default)]
	pub meter_number: Option<MeterIdentity>,

	#[serde(default = "default_refresh_interval")]
	pub refresh_interval_secs: u64,

	/// Relay state shown before the backend has reported one.
	#[serde(default = "default_initial_relay")]
	pub initial_relay: RelayState,

	#[serde(default)]
	pub session_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
	pub base_url: Url,

	#[serde(default = "default_timeout")]
	pub timeout_secs: u64,
}

fn default_refresh_interval() -> u64 {
	DEFAULT_REFRESH_INTERVAL.as_secs()
}

fn default_initial_relay() -> RelayState {
	RelayState::On
}

fn default_timeout() -> u64 {
	meterapi::DEFAULT_TIMEOUT.as_secs()
}

impl Config {
	pub fn refresh_interval(&self) -> Duration {
		Duration::from_secs(self.refresh_interval_secs)
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.api.timeout_secs)
	}

	/// Where the session is stored; `~/.relaymeter/session.json` by default.
	pub fn session_path(&self) -> PathBuf {
		if let Some(path) = &self.session_path {
			return path.clone();
		}
		match std::env::var_os("HOME") {
			Some(home) => PathBuf::from(home).join(".relaymeter").join("session.json"),
			None => PathBuf::from(".relaymeter-session.json"),
		}
	}

	pub fn validate(&self) -> anyhow::Result<()> {
		anyhow::ensure!(
			self.refresh_interval_secs > 0,
			"refresh_interval_secs must be greater than zero"
		);
		anyhow::ensure!(
			self.api.timeout_secs > 0,
			"api.timeout_secs must be greater than zero"
		);
		Ok(())
	}
}
