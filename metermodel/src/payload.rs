//! Request and response bodies exchanged with the meter backend.

use crate::RelayState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// {"success": true, "user": {"username": "paci", ...}, "role": "user"}
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginResponse {
	#[serde(default)]
	pub success: bool,
	/// The backend does not pin down the shape of the user object.
	#[serde(default)]
	pub user: Option<serde_json::Value>,
	#[serde(default)]
	pub role: Option<String>,
	#[serde(default)]
	pub error: Option<String>,
}

/// Account details submitted to `/register`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
	pub username: String,
	pub password: String,
	pub email: String,
	pub full_name: String,
	pub meter_number: String,
	pub phone_number: String,
}

impl Registration {
	/// Form fields in the order and spelling the backend expects.
	pub fn form_fields(&self) -> [(&'static str, &str); 6] {
		[
			("username", &self.username),
			("password", &self.password),
			("email", &self.email),
			("fullName", &self.full_name),
			("meterNumber", &self.meter_number),
			("phoneNumber", &self.phone_number),
		]
	}
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RelayCommand<'a> {
	pub meter_number: &'a str,
	pub status: RelayState,
}

/// Response to a relay command.
///
/// Deployments answer with either `status` or `relay_status`; some only send
/// `success`/`message`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RelayConfirmation {
	#[serde(default)]
	pub success: Option<bool>,
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default)]
	pub relay_status: Option<String>,
	#[serde(default)]
	pub message: Option<String>,
	#[serde(default)]
	pub error: Option<String>,
}

impl RelayConfirmation {
	/// The relay state the backend reports, if it reports one.
	pub fn confirmed_state(&self) -> Option<RelayState> {
		[self.relay_status.as_deref(), self.status.as_deref()]
			.into_iter()
			.flatten()
			.find_map(|literal| RelayState::try_from(literal).ok())
	}

	/// The rejection message when the backend refused the command.
	pub fn rejection(&self) -> Option<&str> {
		if self.success == Some(false) || self.error.is_some() {
			Some(
				self.error
					.as_deref()
					.or(self.message.as_deref())
					.unwrap_or("relay command rejected"),
			)
		} else {
			None
		}
	}
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ConsumptionUpdate {
	pub meter_number: String,
	pub consumption: f64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub voltage: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub current: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub power_factor: Option<f64>,
}

/// A user account as listed by the admin API.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct UserRecord {
	#[serde(deserialize_with = "crate::lenient::identifier")]
	pub id: String,
	pub username: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub full_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub meter_number: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone_number: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	/// Any other columns the backend includes.
	#[serde(flatten)]
	pub extra: BTreeMap<String, serde_json::Value>,
}

/// Fields to change on a user account. Unset fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct UserUpdate {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub full_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub meter_number: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub phone_number: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
}

impl UserUpdate {
	pub fn is_empty(&self) -> bool {
		self == &Self::default()
	}
}

/// Generic acknowledgement payload.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Ack {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl Ack {
	/// The failure message when the backend reported one in a 2xx response.
	pub fn failure(&self) -> Option<&str> {
		if self.success == Some(false) || self.error.is_some() {
			Some(
				self.error
					.as_deref()
					.or(self.message.as_deref())
					.unwrap_or("request was not accepted"),
			)
		} else {
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn relay_confirmation_prefers_relay_status() {
		let confirmation: RelayConfirmation =
			serde_json::from_str(r#"{"status": "success", "relay_status": "off"}"#).unwrap();
		assert_eq!(confirmation.confirmed_state(), Some(RelayState::Off));
		assert_eq!(confirmation.rejection(), None);
	}

	#[test]
	fn relay_confirmation_without_state() {
		let confirmation: RelayConfirmation =
			serde_json::from_str(r#"{"message": "Relay updated"}"#).unwrap();
		assert_eq!(confirmation.confirmed_state(), None);
	}

	#[test]
	fn relay_confirmation_rejected() {
		let confirmation: RelayConfirmation =
			serde_json::from_str(r#"{"success": false, "message": "meter offline"}"#).unwrap();
		assert_eq!(confirmation.rejection(), Some("meter offline"));
	}

	#[test]
	fn relay_command_body() {
		let command = RelayCommand {
			meter_number: "12345678",
			status: RelayState::Off,
		};
		assert_eq!(
			serde_json::to_value(&command).unwrap(),
			serde_json::json!({"meter_number": "12345678", "status": "off"})
		);
	}

	#[test]
	fn user_record_keeps_unknown_columns() {
		let user: UserRecord = serde_json::from_str(
			r#"{"id": 7, "username": "paci", "meter_number": "12345678", "created_at": "2024-01-01"}"#,
		)
		.unwrap();
		assert_eq!(user.id, "7");
		assert_eq!(user.meter_number.as_deref(), Some("12345678"));
		assert_eq!(
			user.extra.get("created_at"),
			Some(&serde_json::json!("2024-01-01"))
		);
	}

	#[test]
	fn user_update_omits_unset_fields() {
		let update = UserUpdate {
			email: Some("paci@example.com".into()),
			..Default::default()
		};
		assert!(!update.is_empty());
		assert_eq!(
			serde_json::to_value(&update).unwrap(),
			serde_json::json!({"email": "paci@example.com"})
		);
	}

	#[test]
	fn ack_failure() {
		let ack: Ack = serde_json::from_str(r#"{"success": false, "error": "duplicate"}"#).unwrap();
		assert_eq!(ack.failure(), Some("duplicate"));
		assert_eq!(Ack::default().failure(), None);
	}
}
