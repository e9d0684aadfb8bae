use crate::{response, Client, Error, Result};
use metermodel::payload::{Ack, LoginResponse, Registration};
use reqwest::{
	header::{HeaderMap, SET_COOKIE},
	multipart::Form,
};

/// Outcome of a successful login.
#[derive(Clone, Debug)]
pub struct SessionResult {
	pub username: String,
	/// User object as returned by the backend.
	pub user: Option<serde_json::Value>,
	pub role: Option<String>,
	/// Session cookies set by the backend, as a `Cookie` header value.
	pub cookie: Option<String>,
}

impl Client {
	/// Logs in with a username and password.
	///
	/// The backend only accepts multipart form bodies on its account endpoints.
	/// Any failure status, a `success: false` body, or a body that can't be
	/// decoded is reported as [`Error::Auth`].
	pub async fn authenticate(&self, username: &str, password: &str) -> Result<SessionResult> {
		let form = Form::new()
			.text("username", username.to_string())
			.text("password", password.to_string());

		tracing::debug!("logging in as '{username}'");
		let response = self
			.client
			.post(self.endpoint(["login"])?)
			.multipart(form)
			.send()
			.await?;

		let cookie = session_cookie(response.headers());
		let login: LoginResponse = match response::decode(response).await {
			Ok(login) => login,
			Err(Error::Server { message, .. }) | Err(Error::MalformedResponse(message)) => {
				return Err(Error::Auth(message))
			}
			Err(error) => return Err(error),
		};

		if !login.success {
			let reason = login
				.error
				.unwrap_or_else(|| "invalid username or password".to_string());
			tracing::warn!("login rejected for '{username}': {reason}");
			return Err(Error::Auth(reason));
		}

		tracing::info!("logged in as '{username}'");
		Ok(SessionResult {
			username: username.to_string(),
			user: login.user,
			role: login.role,
			cookie,
		})
	}

	/// Creates a new account.
	pub async fn register(&self, registration: &Registration) -> Result<Ack> {
		let form = registration
			.form_fields()
			.into_iter()
			.fold(Form::new(), |form, (name, value)| {
				form.text(name, value.to_string())
			});

		tracing::debug!("registering '{}'", registration.username);
		let response = self
			.client
			.post(self.endpoint(["register"])?)
			.multipart(form)
			.send()
			.await?;

		response::acknowledge(response).await
	}
}

/// Collects the `name=value` part of every `Set-Cookie` header.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
	let pairs: Vec<&str> = headers
		.get_all(SET_COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.filter_map(|value| value.split(';').next())
		.map(str::trim)
		.filter(|pair| !pair.is_empty())
		.collect();

	if pairs.is_empty() {
		None
	} else {
		Some(pairs.join("; "))
	}
}
