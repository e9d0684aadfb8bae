use crate::{Error, Result};
use bytes::Bytes;
use metermodel::payload::Ack;
use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use url::Url;

/// Longest slice of a non-JSON error body carried into an error message.
const MAX_ERROR_TEXT: usize = 200;

#[derive(Deserialize)]
struct ErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	message: Option<String>,
}

/// A successful response, fully read.
pub(crate) struct Body {
	pub url: Url,
	pub status: StatusCode,
	pub bytes: Bytes,
}

impl Body {
	pub fn is_blank(&self) -> bool {
		self.bytes.iter().all(u8::is_ascii_whitespace)
	}

	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		parse_json(&self.url, &self.bytes)
	}
}

/// Reads the response body, turning non-2xx statuses into [`Error::Server`].
pub(crate) async fn read(response: Response) -> Result<Body> {
	let url = response.url().clone();
	let status = response.status();
	let bytes = response.bytes().await?;

	if !status.is_success() {
		let message = error_message(&bytes).unwrap_or_else(|| {
			status
				.canonical_reason()
				.unwrap_or("request failed")
				.to_string()
		});
		tracing::error!("'{url}' responded {status}: {message}");
		return Err(Error::Server {
			status: status.as_u16(),
			message,
		});
	}

	tracing::trace!("'{url}' responded {status}, {} bytes", bytes.len());
	Ok(Body { url, status, bytes })
}

/// Reads and decodes a JSON response.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
	read(response).await?.json()
}

pub(crate) fn parse_json<T: DeserializeOwned>(url: &Url, body: &[u8]) -> Result<T> {
	match serde_json::from_slice(body) {
		Ok(value) => Ok(value),
		Err(error) => {
			tracing::error!("failed to deserialise response from '{url}': {error}");
			Err(Error::MalformedResponse(error.to_string()))
		}
	}
}

/// Decodes an acknowledgement, treating a reported failure as a server error.
/// An empty body is a plain acknowledgement.
pub(crate) async fn acknowledge(response: Response) -> Result<Ack> {
	let body = read(response).await?;
	let ack: Ack = if body.is_blank() {
		Ack::default()
	} else {
		body.json()?
	};

	match ack.failure() {
		Some(message) => Err(Error::Server {
			status: body.status.as_u16(),
			message: message.to_string(),
		}),
		None => Ok(ack),
	}
}

/// Picks the most useful message out of an error response body.
fn error_message(body: &[u8]) -> Option<String> {
	if let Ok(ErrorBody { error, message }) = serde_json::from_slice(body) {
		if let Some(text) = error.or(message) {
			return Some(text);
		}
	}

	let text = String::from_utf8_lossy(body);
	let text = text.trim();
	if text.is_empty() {
		None
	} else {
		Some(text.chars().take(MAX_ERROR_TEXT).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::error_message;

	#[test]
	fn error_message_prefers_json_fields() {
		assert_eq!(
			error_message(br#"{"error": "Meter not found"}"#).as_deref(),
			Some("Meter not found")
		);
		assert_eq!(
			error_message(br#"{"message": "Invalid status"}"#).as_deref(),
			Some("Invalid status")
		);
	}

	#[test]
	fn error_message_falls_back_to_text() {
		assert_eq!(
			error_message(b"  Internal Server Error \n").as_deref(),
			Some("Internal Server Error")
		);
		assert_eq!(error_message(b"   "), None);
	}
}
