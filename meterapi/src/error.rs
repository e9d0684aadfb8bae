use thiserror::Error;

/// Failures surfaced by the meter backend client.
///
/// Messages are kept as strings so a single failure can be handed to every
/// caller waiting on the same request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	/// No connectivity, DNS failure, connection reset.
	#[error("network error: {0}")]
	Network(String),

	/// The request exceeded the client timeout.
	#[error("request timed out")]
	Timeout,

	/// The backend rejected the request.
	#[error("server error {status}: {message}")]
	Server { status: u16, message: String },

	/// Invalid credentials, or a login response that could not be understood.
	#[error("authentication failed: {0}")]
	Auth(String),

	/// The response body could not be decoded.
	#[error("malformed response: {0}")]
	MalformedResponse(String),

	/// The base URL or stored session cannot be used to build requests.
	#[error("invalid client configuration: {0}")]
	Config(String),
}

impl From<reqwest::Error> for Error {
	fn from(error: reqwest::Error) -> Self {
		if error.is_timeout() {
			Self::Timeout
		} else if error.is_decode() {
			Self::MalformedResponse(error.to_string())
		} else {
			Self::Network(error.to_string())
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
