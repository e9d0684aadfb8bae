use crate::{response, Client, Error, Result};
use metermodel::{MeterIdentity, MeterReading, PowerSnapshot, ReportEntry};

impl Client {
	/// Fetches the power budget of a meter.
	pub async fn fetch_current_power(&self, meter: &MeterIdentity) -> Result<PowerSnapshot> {
		let url = self.endpoint(["api", "current_power", meter.meter_number()])?;
		tracing::debug!("fetching current power for meter {meter}");
		let response = self.client.get(url).send().await?;
		response::decode(response).await
	}

	/// Fetches the most recent reading of a meter.
	pub async fn fetch_latest_reading(&self, meter: &MeterIdentity) -> Result<MeterReading> {
		let url = self.endpoint(["api", "latest-reading", meter.meter_number()])?;
		tracing::debug!("fetching latest reading for meter {meter}");
		let response = self.client.get(url).send().await?;
		response::decode(response).await
	}

	/// Fetches the whole port report of a meter, in the order the backend
	/// returns it.
	///
	/// Some deployments answer with an object carrying an `error` instead of
	/// an empty list when a meter has no history; that is reported as a server
	/// error so it is not mistaken for an empty report.
	pub async fn fetch_port_report(&self, meter: &MeterIdentity) -> Result<Vec<ReportEntry>> {
		let url = self.endpoint(["api", "port_report", meter.meter_number()])?;
		tracing::debug!("fetching port report for meter {meter}");
		let response = self.client.get(url).send().await?;
		let body = response::read(response).await?;

		match body.json::<serde_json::Value>()? {
			value @ serde_json::Value::Array(_) => {
				let entries: Vec<ReportEntry> = serde_json::from_value(value).map_err(|error| {
					tracing::error!("failed to deserialise port report from '{}': {error}", body.url);
					Error::MalformedResponse(error.to_string())
				})?;
				tracing::debug!("port report for meter {meter} has {} entries", entries.len());
				Ok(entries)
			}
			serde_json::Value::Object(object) => {
				let message = ["error", "message"]
					.into_iter()
					.find_map(|key| object.get(key).and_then(|value| value.as_str()));
				match message {
					Some(message) => Err(Error::Server {
						status: body.status.as_u16(),
						message: message.to_string(),
					}),
					None => Err(Error::MalformedResponse(
						"expected a list of report entries".into(),
					)),
				}
			}
			_ => Err(Error::MalformedResponse(
				"expected a list of report entries".into(),
			)),
		}
	}
}
