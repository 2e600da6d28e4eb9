#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use session_relay::{
	auth::Credentials,
	config::RelayConfig,
	error::{Error, RefreshFailure},
	http::StatusCode,
	relay::Relay,
	store::{MemoryStore, TokenKind},
	url::Url,
};

#[derive(Debug, serde::Deserialize, PartialEq)]
struct Profile {
	name: String,
}

fn build_relay(server: &MockServer) -> (Relay, MemoryStore) {
	let config = RelayConfig::builder()
		.base_url(Url::parse(&server.url("/v1/")).expect("Mock base URL should parse."))
		.refresh_endpoint(
			Url::parse(&server.url("/auth/refresh/")).expect("Mock refresh URL should parse."),
		)
		.build()
		.expect("Loopback config should build.");
	let store = MemoryStore::with_credentials(Credentials::new("T1", "R1"));
	let relay = Relay::new(config, Arc::new(store.clone())).expect("Reqwest relay should build.");

	(relay, store)
}

#[tokio::test]
async fn reqwest_relay_refreshes_and_replays_against_live_server() {
	let server = MockServer::start_async().await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/profile").header("authorization", "Bearer T1");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/refresh/")
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "refresh": "R1" }));
			then.status(200)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "access": "T2", "refresh": "R2" }));
		})
		.await;
	let profile = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/profile").header("authorization", "Bearer T2");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "name": "Ada" }));
		})
		.await;
	let (relay, store) = build_relay(&server);
	let response = relay.get("profile").await.expect("Relay should recover from the 401.");

	assert_eq!(response.status, StatusCode::OK);
	assert_eq!(
		response.json::<Profile>().expect("Profile body should decode."),
		Profile { name: "Ada".into() }
	);

	expired.assert_async().await;
	refresh.assert_async().await;
	profile.assert_async().await;

	assert_eq!(store.peek(TokenKind::Access).map(|t| t.expose().to_owned()), Some("T2".into()));
	assert_eq!(store.peek(TokenKind::Refresh).map(|t| t.expose().to_owned()), Some("R2".into()));
}

#[tokio::test]
async fn reqwest_relay_surfaces_refresh_rejection() {
	let server = MockServer::start_async().await;
	let _expired = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/v1/items/3");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh/");
			then.status(400).json_body(serde_json::json!({ "detail": "token_not_valid" }));
		})
		.await;
	let (relay, _store) = build_relay(&server);
	let err = relay.delete("items/3").await.expect_err("Rejected refresh should expire.");

	assert!(matches!(err, Error::SessionExpired(RefreshFailure::Rejected { status: 400 })));

	refresh.assert_async().await;
}

#[tokio::test]
async fn reqwest_transport_reports_unreachable_hosts() {
	let config = RelayConfig::builder()
		.refresh_endpoint(Url::parse("http://127.0.0.1:9/refresh").expect("URL should parse."))
		.build()
		.expect("Loopback config should build.");
	let relay = Relay::new(config, Arc::new(MemoryStore::default()))
		.expect("Reqwest relay should build.");
	let err = relay
		.get("http://127.0.0.1:9/unreachable")
		.await
		.expect_err("Nothing listens on the discard port.");

	assert!(matches!(err, Error::Transport(_)));
}
