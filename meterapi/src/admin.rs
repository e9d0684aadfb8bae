use crate::{response, Client, Error, Result};
use metermodel::payload::{Ack, UserRecord, UserUpdate};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum UserList {
	Bare(Vec<UserRecord>),
	Wrapped { users: Vec<UserRecord> },
}

impl Client {
	/// Lists user accounts, optionally filtered by a search term.
	pub async fn list_users(&self, search: &str) -> Result<Vec<UserRecord>> {
		let mut url = self.endpoint(["admin", "api", "users"])?;
		url.query_pairs_mut().append_pair("search", search);

		tracing::debug!("listing users matching '{search}'");
		let response = self.client.get(url).send().await?;
		let users = match response::decode(response).await? {
			UserList::Bare(users) | UserList::Wrapped { users } => users,
		};
		Ok(users)
	}

	/// Updates the fields of a user account that are set in `update`.
	pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<Ack> {
		if update.is_empty() {
			return Err(Error::Config("no user fields to update".into()));
		}

		tracing::debug!("updating user {id}");
		let response = self
			.client
			.post(self.endpoint(["admin", "api", "users", id, "update"])?)
			.json(update)
			.send()
			.await?;

		response::acknowledge(response).await
	}

	/// Deletes a user account.
	pub async fn delete_user(&self, id: &str) -> Result<Ack> {
		tracing::debug!("deleting user {id}");
		let response = self
			.client
			.delete(self.endpoint(["admin", "api", "users", id, "delete"])?)
			.send()
			.await?;

		response::acknowledge(response).await
	}
}

#[cfg(test)]
mod tests {
	use crate::{Client, ClientOptions, Error};
	use metermodel::payload::UserUpdate;
	use wiremock::{
		matchers::{body_json, method, path, query_param},
		Mock, MockServer, ResponseTemplate,
	};

	#[tokio::test]
	async fn list_users_with_search() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/admin/api/users"))
			.and(query_param("search", "pac"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
				{"id": 1, "username": "paci", "meter_number": "12345678"},
				{"id": 2, "username": "pacific"}
			])))
			.expect(1)
			.mount(&server)
			.await;

		let client = Client::new(server.uri(), ClientOptions::default()).unwrap();
		let users = client.list_users("pac").await.unwrap();
		assert_eq!(users.len(), 2);
		assert_eq!(users[0].id, "1");
		assert_eq!(users[1].meter_number, None);
	}

	#[tokio::test]
	async fn list_users_wrapped() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/admin/api/users"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"users": [{"id": "u-1", "username": "paci"}]
			})))
			.mount(&server)
			.await;

		let client = Client::new(server.uri(), ClientOptions::default()).unwrap();
		let users = client.list_users("").await.unwrap();
		assert_eq!(users[0].id, "u-1");
	}

	#[tokio::test]
	async fn update_user_posts_changed_fields() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/admin/api/users/7/update"))
			.and(body_json(serde_json::json!({"role": "admin"})))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
			.expect(1)
			.mount(&server)
			.await;

		let client = Client::new(server.uri(), ClientOptions::default()).unwrap();
		let update = UserUpdate {
			role: Some("admin".into()),
			..Default::default()
		};
		client.update_user("7", &update).await.unwrap();
	}

	#[tokio::test]
	async fn update_user_requires_a_field() {
		let client = Client::new("http://meter.local", ClientOptions::default()).unwrap();
		let error = client
			.update_user("7", &UserUpdate::default())
			.await
			.unwrap_err();
		assert!(matches!(error, Error::Config(_)));
	}

	#[tokio::test]
	async fn delete_user_accepts_empty_body() {
		let server = MockServer::start().await;
		Mock::given(method("DELETE"))
			.and(path("/admin/api/users/7/delete"))
			.respond_with(ResponseTemplate::new(204))
			.expect(1)
			.mount(&server)
			.await;

		let client = Client::new(server.uri(), ClientOptions::default()).unwrap();
		let ack = client.delete_user("7").await.unwrap();
		assert_eq!(ack.failure(), None);
	}
}
