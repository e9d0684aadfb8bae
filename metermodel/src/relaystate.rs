use serde::{Deserialize, Serialize};
use std::{borrow::Cow, error, fmt};

/// Switching state of a meter's relay.
///
/// On the wire the state is the lowercase literal `"on"` or `"off"`. Parsing
/// is case-insensitive.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum RelayState {
	On,
	Off,
}

impl RelayState {
	/// The wire literal for this state.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::On => "on",
			Self::Off => "off",
		}
	}

	/// Returns the opposite state.
	#[must_use]
	pub fn toggled(self) -> Self {
		match self {
			Self::On => Self::Off,
			Self::Off => Self::On,
		}
	}

	/// Whether the circuit is connected in this state.
	pub fn is_connected(&self) -> bool {
		matches!(self, Self::On)
	}

	/// Human label for the circuit in this state.
	pub fn connection_label(&self) -> &'static str {
		match self {
			Self::On => "Connected",
			Self::Off => "Disconnected",
		}
	}
}

impl fmt::Display for RelayState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug)]
pub struct UnknownRelayStateLiteral<'a>(Cow<'a, str>);

impl<'a> fmt::Display for UnknownRelayStateLiteral<'a> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let Self(literal) = self;
		write!(f, "Unknown literal for RelayState: {literal}")
	}
}

impl<'a> error::Error for UnknownRelayStateLiteral<'a> {}

impl<'a> TryFrom<&'a str> for RelayState {
	type Error = UnknownRelayStateLiteral<'a>;
	fn try_from(value: &'a str) -> Result<Self, Self::Error> {
		match value.trim().to_ascii_lowercase().as_str() {
			"on" => Ok(RelayState::On),
			"off" => Ok(RelayState::Off),
			_ => Err(UnknownRelayStateLiteral(Cow::Borrowed(value))),
		}
	}
}

impl TryFrom<String> for RelayState {
	type Error = UnknownRelayStateLiteral<'static>;
	fn try_from(value: String) -> Result<Self, Self::Error> {
		match value.trim().to_ascii_lowercase().as_str() {
			"on" => Ok(RelayState::On),
			"off" => Ok(RelayState::Off),
			_ => Err(UnknownRelayStateLiteral(Cow::Owned(value))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::RelayState;

	#[test]
	fn toggled_flips_state() {
		assert_eq!(RelayState::On.toggled(), RelayState::Off);
		assert_eq!(RelayState::Off.toggled(), RelayState::On);
	}

	#[test]
	fn parses_literals_case_insensitively() {
		assert_eq!(RelayState::try_from("ON").unwrap(), RelayState::On);
		assert_eq!(RelayState::try_from(" off ").unwrap(), RelayState::Off);
		assert!(RelayState::try_from("maybe").is_err());
	}

	#[test]
	fn serializes_lowercase() {
		assert_eq!(serde_json::to_string(&RelayState::Off).unwrap(), r#""off""#);
		let state: RelayState = serde_json::from_str(r#""On""#).unwrap();
		assert_eq!(state, RelayState::On);
	}
}
