//! Demonstrates the relay recovering three concurrent requests from an expired access token with a
//! single refresh, using the default reqwest transport and the in-memory credential store.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::Value;
// self
use session_relay::{
	auth::Credentials,
	config::RelayConfig,
	relay::Relay,
	store::{CredentialStore, MemoryStore},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path_prefix("/v1/").header("authorization", "Bearer demo-access-1");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh/").json_body(serde_json::json!({
				"refresh": "demo-refresh-1"
			}));
			then.status(200).header("content-type", "application/json").body(
				"{\"access\":\"demo-access-2\",\"refresh\":\"demo-refresh-2\"}",
			);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path_prefix("/v1/").header("authorization", "Bearer demo-access-2");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"owner\":\"demo-user\"}");
		})
		.await;
	let config = RelayConfig::builder()
		.base_url(Url::parse(&server.url("/v1/"))?)
		.refresh_endpoint(Url::parse(&server.url("/auth/refresh/"))?)
		.build()?;
	let credentials = Credentials::new("demo-access-1", "demo-refresh-1");
	let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::with_credentials(credentials));
	let relay = Relay::new(config, store)?;

	relay.register_session_expired_handler(|| println!("Session expired; sign in again."));

	let (profile, inbox, settings) =
		tokio::join!(relay.get("profile"), relay.get("inbox"), relay.get("settings"));

	for (name, response) in [("profile", profile?), ("inbox", inbox?), ("settings", settings?)] {
		println!("{name}: {} {}.", response.status, response.json::<Value>()?);
	}

	let credentials = relay.credentials().await?;

	println!(
		"Rotated refresh token stored: {}.",
		credentials.refresh_token.as_ref().map(|t| t.expose()).unwrap_or("none")
	);
	println!("Refresh attempts: {}.", relay.refresh_metrics().attempts());

	refresh.assert_async().await;
	expired.assert_hits_async(3).await;
	fresh.assert_hits_async(3).await;

	Ok(())
}
