//! REST backend and webhook client against a mock HTTP server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use huginn::types::{EventFilters, EventInput, EventStatus, PageOptions};
use huginn::{
    Gateway, HuginnError, QueryCache, QueryConfig, RetryPolicy, VenueClient, WebhookClient,
};

fn event_row(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": format!("Event {id}"),
        "description": "from server",
        "start_date": "2031-05-01T18:00:00Z",
        "status": "active",
    })
}

fn fast_retry_cache(retries: u32) -> QueryCache {
    QueryCache::new(
        QueryConfig::new().retry(
            RetryPolicy::query()
                .max_retries(retries)
                .initial_delay(Duration::from_millis(5)),
        ),
    )
}

// ============================================================================
// Data
// ============================================================================

#[tokio::test]
async fn paged_select_sends_range_order_and_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .and(header("apikey", "anon-key"))
        .and(header("Prefer", "count=exact"))
        .and(query_param("status", "eq.active"))
        .and(query_param("order", "start_date.asc"))
        .and(query_param("offset", "10"))
        .and(query_param("limit", "10"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-range", "10-11/25")
                .set_body_json(json!([event_row("e10"), event_row("e11")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Gateway::rest(server.uri(), "anon-key").unwrap();
    let filters = EventFilters {
        status: Some(EventStatus::Active),
        ..Default::default()
    };
    let page = gateway
        .events()
        .get_all(&PageOptions::new(filters).page(2).limit(10))
        .await
        .unwrap();

    assert_eq!(page.data.len(), 2);
    assert_eq!(page.count, 25);
    assert!(page.has_more);
    assert_eq!(page.data[0].id, "e10");
}

#[tokio::test]
async fn unauthorized_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/speakers"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "JWT expired"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = VenueClient::new(
        Gateway::rest(server.uri(), "anon-key").unwrap(),
        fast_retry_cache(3),
    );
    let err = client.speakers_now(PageOptions::default()).await.unwrap_err();
    assert!(matches!(err, HuginnError::Unauthorized(ref m) if m == "JWT expired"));
}

#[tokio::test]
async fn server_errors_are_retried_then_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "code": "XX000",
            "message": "upstream unavailable"
        })))
        .expect(3)
        .mount(&server)
        .await;

    let client = VenueClient::new(
        Gateway::rest(server.uri(), "anon-key").unwrap(),
        fast_retry_cache(2),
    );
    let err = client.event_now("e1").await.unwrap_err();
    assert!(matches!(err, HuginnError::Api { status: 503, .. }));
}

#[tokio::test]
async fn missing_row_code_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/speakers"))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "code": "PGRST116",
            "message": "JSON object requested, multiple (or no) rows returned"
        })))
        .mount(&server)
        .await;

    let gateway = Gateway::rest(server.uri(), "anon-key").unwrap();
    let input = huginn::types::SpeakerInput {
        name: Some("Ada".into()),
        ..Default::default()
    };
    let err = gateway.speakers().update("s404", &input).await.unwrap_err();
    match err {
        HuginnError::NotFound { resource, id } => {
            assert_eq!(resource, "speaker");
            assert_eq!(id, "s404");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn not_found_without_a_target_id_keeps_the_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/speakers"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "relation \"speakers\" does not exist"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = VenueClient::new(
        Gateway::rest(server.uri(), "anon-key").unwrap(),
        fast_retry_cache(3),
    );
    let err = client
        .speakers_now(PageOptions::default())
        .await
        .unwrap_err();
    match err {
        HuginnError::Api { status, message, .. } => {
            assert_eq!(status, 404);
            assert!(message.contains("does not exist"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn insert_asks_for_the_created_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/events"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({"title": "Launch night"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": "e-new",
            "title": "Launch night",
            "description": "Doors at seven",
            "start_date": "2031-06-01T19:00:00Z",
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Gateway::rest(server.uri(), "anon-key").unwrap();
    let input = EventInput::new("Launch night", "Doors at seven")
        .start_date(chrono::Utc::now() + chrono::Duration::days(30));
    let event = gateway.events().create(&input).await.unwrap();
    assert_eq!(event.id, "e-new");
}

// ============================================================================
// Webhooks
// ============================================================================

#[tokio::test]
async fn archive_sweep_parses_report() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/archive-events"))
        .and(header("Authorization", "Bearer service-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "processed": 1,
            "total": 4,
            "events": [{"id": "e1", "title": "Old talk"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let webhooks = WebhookClient::new(
        format!("{}/functions/v1/archive-events", server.uri()),
        format!("{}/functions/v1/save-event", server.uri()),
    )
    .unwrap()
    .with_token("service-token");

    let report = webhooks.archive_sweep().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.total, 4);
    assert_eq!(report.events[0].title.as_deref(), Some("Old talk"));
}

#[tokio::test]
async fn save_event_wraps_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/save-event"))
        .and(body_partial_json(json!({
            "isNew": false,
            "eventData": {"title": "Moved"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": event_row("e7"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let webhooks = WebhookClient::new(
        format!("{}/functions/v1/archive-events", server.uri()),
        format!("{}/functions/v1/save-event", server.uri()),
    )
    .unwrap();
    let input = EventInput {
        title: Some("Moved".into()),
        ..Default::default()
    };
    let event = webhooks.save_event(&input, false).await.unwrap();
    assert_eq!(event.id, "e7");
}

#[tokio::test]
async fn missing_extension_is_distinguished() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/save-event"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "pg_net extension is not enabled",
            "code": "EXTENSION_MISSING"
        })))
        .mount(&server)
        .await;

    let webhooks = WebhookClient::new(
        format!("{}/functions/v1/archive-events", server.uri()),
        format!("{}/functions/v1/save-event", server.uri()),
    )
    .unwrap();
    let err = webhooks
        .save_event(&EventInput::new("T", "D"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::MissingExtension(_)));
}

#[tokio::test]
async fn archive_through_client_invalidates_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/archive-events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "processed": 0,
            "total": 0,
            "events": []
        })))
        .mount(&server)
        .await;

    let webhooks = WebhookClient::new(
        format!("{}/functions/v1/archive-events", server.uri()),
        format!("{}/functions/v1/save-event", server.uri()),
    )
    .unwrap();
    let memory = std::sync::Arc::new(huginn::MemoryBackend::new());
    let client =
        VenueClient::new(Gateway::memory(memory), QueryCache::default()).with_webhooks(webhooks);
    let featured = huginn::keys::events::featured();
    client.cache().set_query_data(&featured, Vec::<huginn::types::Event>::new()).unwrap();

    client.archive_events().await.unwrap();
    assert_eq!(client.cache().is_stale(&featured), Some(true));
}
