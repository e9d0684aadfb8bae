use crate::{Error, Result};
use reqwest::{
	cookie::Jar,
	header::{HeaderMap, HeaderValue, ACCEPT},
	ClientBuilder, IntoUrl,
};
use std::{sync::Arc, time::Duration};
use url::Url;

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct ClientOptions {
	/// Upper bound on every request, connect to last byte.
	pub timeout: Duration,
	/// A `name=value; name2=value2` cookie string from a stored session.
	pub session_cookie: Option<String>,
}

impl Default for ClientOptions {
	fn default() -> Self {
		Self {
			timeout: DEFAULT_TIMEOUT,
			session_cookie: None,
		}
	}
}

#[derive(Clone, Debug)]
pub struct Client {
	pub(crate) client: reqwest::Client,
	host: Url,
}

impl Client {
	/// Creates a new meter backend client.
	///
	/// # Arguments
	/// * `host` - The base URL of the backend, e.g. `http://192.168.1.72:5000`.
	/// * `options` - Timeout and optional stored session cookie.
	///
	/// # Errors
	/// Returns an error if the URL is invalid or cannot carry a path.
	///
	pub fn new(host: impl IntoUrl, options: ClientOptions) -> Result<Self> {
		let host = host
			.into_url()
			.map_err(|error| Error::Config(error.to_string()))?;
		if host.cannot_be_a_base() {
			return Err(Error::Config(host.to_string()));
		}

		// Create the default header set.
		//
		let mut default_headers = HeaderMap::new();
		default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

		// Seed the cookie store with the stored session. The backend may
		// replace these cookies, and the store sends back whatever it set last.
		//
		let cookies = Arc::new(Jar::default());
		if let Some(cookie) = options.session_cookie.as_deref() {
			for pair in cookie.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
				cookies.add_cookie_str(pair, &host);
			}
		}

		// Build the HTTP client. This will be reused for all requests.
		//
		let client = ClientBuilder::new()
			.gzip(true)
			.cookie_provider(cookies)
			.timeout(options.timeout)
			.default_headers(default_headers)
			.build()?;

		Ok(Self { client, host })
	}

	/// Builds the URL of an endpoint below the base URL. Each segment is
	/// percent-encoded, so meter numbers and ids can't escape their segment.
	pub(crate) fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
		let mut url = self.host.clone();
		url.path_segments_mut()
			.map_err(|_| Error::Config(self.host.to_string()))?
			.pop_if_empty()
			.extend(segments);
		Ok(url)
	}
}

#[cfg(test)]
mod tests {
	use super::{Client, ClientOptions};
	use metermodel::MeterIdentity;
	use wiremock::{
		matchers::{header, method, path},
		Mock, MockServer, ResponseTemplate,
	};

	#[test]
	fn endpoint_appends_to_base_path() {
		let client = Client::new("http://meter.local:5000/", ClientOptions::default()).unwrap();
		assert_eq!(
			client
				.endpoint(["api", "current_power", "12345678"])
				.unwrap()
				.as_str(),
			"http://meter.local:5000/api/current_power/12345678"
		);

		let client = Client::new("http://meter.local/backend", ClientOptions::default()).unwrap();
		assert_eq!(
			client.endpoint(["login"]).unwrap().as_str(),
			"http://meter.local/backend/login"
		);
	}

	#[test]
	fn endpoint_encodes_segments() {
		let client = Client::new("http://meter.local", ClientOptions::default()).unwrap();
		assert_eq!(
			client
				.endpoint(["api", "port_report", "12/34 56"])
				.unwrap()
				.as_str(),
			"http://meter.local/api/port_report/12%2F34%2056"
		);
	}

	#[test]
	fn rejects_urls_without_a_path() {
		assert!(Client::new("mailto:meter@example.com", ClientOptions::default()).is_err());
		assert!(Client::new("not a url", ClientOptions::default()).is_err());
	}

	#[tokio::test]
	async fn stored_cookie_is_replaced_by_backend() {
		let server = MockServer::start().await;
		let body = serde_json::json!({
			"current_power": 5,
			"total_allocated": 100,
			"total_consumed": 40
		});
		Mock::given(method("GET"))
			.and(path("/api/current_power/12345678"))
			.and(header("cookie", "session=stored"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("set-cookie", "session=rotated; Path=/")
					.set_body_json(body.clone()),
			)
			.up_to_n_times(1)
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/api/current_power/12345678"))
			.and(header("cookie", "session=rotated"))
			.respond_with(ResponseTemplate::new(200).set_body_json(body))
			.expect(1)
			.mount(&server)
			.await;

		let client = Client::new(
			server.uri(),
			ClientOptions {
				session_cookie: Some("session=stored".into()),
				..ClientOptions::default()
			},
		)
		.unwrap();
		let meter = MeterIdentity::new("12345678").unwrap();
		client.fetch_current_power(&meter).await.unwrap();
		client.fetch_current_power(&meter).await.unwrap();
	}
}
