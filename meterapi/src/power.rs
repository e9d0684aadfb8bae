use crate::{response, Client, Error, Result};
use metermodel::{
	payload::{Ack, ConsumptionUpdate, RelayCommand, RelayConfirmation},
	MeterIdentity, RelayState,
};

impl Client {
	/// Commands the meter's relay into `desired` and returns the state the
	/// backend confirms.
	///
	/// When the backend acknowledges without naming a state, the requested
	/// state is taken as confirmed. A `success: false` body is a server error.
	pub async fn set_relay_state(
		&self,
		meter: &MeterIdentity,
		desired: RelayState,
	) -> Result<RelayState> {
		let command = RelayCommand {
			meter_number: meter.meter_number(),
			status: desired,
		};

		tracing::debug!("commanding relay of meter {meter} {desired}");
		let response = self
			.client
			.post(self.endpoint(["api", "relay_control"])?)
			.json(&command)
			.send()
			.await?;

		let body = response::read(response).await?;
		let confirmation: RelayConfirmation = if body.is_blank() {
			RelayConfirmation::default()
		} else {
			body.json()?
		};

		if let Some(reason) = confirmation.rejection() {
			tracing::warn!("relay command for meter {meter} rejected: {reason}");
			return Err(Error::Server {
				status: body.status.as_u16(),
				message: reason.to_string(),
			});
		}

		let confirmed = confirmation.confirmed_state().unwrap_or(desired);
		if confirmed != desired {
			tracing::warn!("relay of meter {meter} settled {confirmed}, {desired} was requested");
		}
		Ok(confirmed)
	}

	/// Reports a consumption figure for a meter.
	pub async fn update_consumption(&self, update: &ConsumptionUpdate) -> Result<Ack> {
		tracing::debug!("updating consumption of meter {}", update.meter_number);
		let response = self
			.client
			.post(self.endpoint(["api", "update_consumption"])?)
			.json(update)
			.send()
			.await?;

		response::acknowledge(response).await
	}
}
