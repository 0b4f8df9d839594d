//! Service clients against a local HTTP server.
//!
//! Each test mounts the upstream API's answer on a `wiremock::MockServer`
//! and checks both the request the client sends and how the answer is
//! classified.

use adreel_adapters::{
    EmailNotifier, HttpVideoRenderer, OpenAiCopyGenerator, PostgrestPreferenceStore,
};
use adreel_core::{CopywriterConfig, EmailConfig, PreferenceStoreConfig, RendererConfig};
use adreel_proto::{
    AdCopy, CampaignError, CopyGenerator, Notifier, PreferenceStore, PreferenceValue,
    RenderHandle, RenderStatus, UserPreferences, VideoArtifact, VideoRenderer,
};
use serde_json::json;
use wiremock::matchers::{bearer_token, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "test-key";

fn preference_store(server: &MockServer) -> PostgrestPreferenceStore {
    let config = PreferenceStoreConfig {
        base_url: server.uri(),
        ..PreferenceStoreConfig::default()
    };
    PostgrestPreferenceStore::new(&config, KEY.to_string()).unwrap()
}

fn copywriter(server: &MockServer) -> OpenAiCopyGenerator {
    let config = CopywriterConfig {
        base_url: server.uri(),
        ..CopywriterConfig::default()
    };
    OpenAiCopyGenerator::new(&config, KEY.to_string()).unwrap()
}

fn renderer(server: &MockServer) -> HttpVideoRenderer {
    let config = RendererConfig {
        base_url: server.uri(),
        ..RendererConfig::default()
    };
    HttpVideoRenderer::new(&config, KEY.to_string()).unwrap()
}

fn notifier(server: &MockServer) -> EmailNotifier {
    let config = EmailConfig {
        base_url: server.uri(),
        ..EmailConfig::default()
    };
    EmailNotifier::new(&config, KEY.to_string()).unwrap()
}

fn artifact() -> VideoArtifact {
    VideoArtifact {
        url: "https://cdn/x.mp4".to_string(),
        duration_seconds: Some(15.0),
    }
}

// Preference store

#[tokio::test]
async fn test_preferences_use_postgrest_equality_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/user_preferences"))
        .and(query_param("user_id", "eq.u1"))
        .and(query_param("limit", "1"))
        .and(header("apikey", KEY))
        .and(bearer_token(KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 3, "user_id": "u1", "tone": "playful", "age": 29}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let prefs = preference_store(&server).fetch("u1").await.unwrap().unwrap();

    assert_eq!(prefs.user_id, "u1");
    assert_eq!(prefs.attributes.len(), 2);
    assert_eq!(prefs.attributes["tone"], PreferenceValue::Text("playful".into()));
}

#[tokio::test]
async fn test_preferences_empty_result_is_unknown_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/user_preferences"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert_eq!(preference_store(&server).fetch("ghost").await.unwrap(), None);
}

#[tokio::test]
async fn test_preferences_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("db restarting"))
        .mount(&server)
        .await;

    let err = preference_store(&server).fetch("u1").await.unwrap_err();

    assert!(matches!(
        &err,
        CampaignError::UpstreamUnavailable { service, reason }
            if service == "preferences" && reason.contains("db restarting")
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_preferences_auth_failure_is_rejected_not_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "JWT expired"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = preference_store(&server).fetch("u1").await.unwrap_err();

    assert!(matches!(&err, CampaignError::UpstreamRejected { reason, .. } if reason.contains("401")));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_preferences_missing_table_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = preference_store(&server).fetch("u1").await.unwrap_err();
    assert!(matches!(err, CampaignError::UpstreamRejected { .. }));
}

// Copywriter

#[tokio::test]
async fn test_copywriter_returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(bearer_token(KEY))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 120})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Stay warm, ski hard."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let copy = copywriter(&server)
        .generate(
            "SkiJacket",
            "winter athletes",
            "sales",
            &UserPreferences::empty("u1"),
        )
        .await
        .unwrap();

    assert_eq!(copy.text, "Stay warm, ski hard.");
}

#[tokio::test]
async fn test_copywriter_throttling_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = copywriter(&server)
        .generate("SkiJacket", "winter athletes", "sales", &UserPreferences::empty("u1"))
        .await
        .unwrap_err();

    assert!(matches!(err, CampaignError::UpstreamUnavailable { .. }));
}

#[tokio::test]
async fn test_copywriter_bad_request_is_generation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown model"))
        .mount(&server)
        .await;

    let err = copywriter(&server)
        .generate("SkiJacket", "winter athletes", "sales", &UserPreferences::empty("u1"))
        .await
        .unwrap_err();

    assert!(matches!(err, CampaignError::GenerationFailed(reason) if reason.contains("unknown model")));
}

// Renderer

#[tokio::test]
async fn test_renderer_submit_posts_template_and_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/renders"))
        .and(header("x-api-key", KEY))
        .and(body_partial_json(json!({
            "template": "ad-default",
            "text": "Stay warm, ski hard."
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let handle = renderer(&server)
        .submit("ad-default", &AdCopy::new("Stay warm, ski hard."))
        .await
        .unwrap();

    assert_eq!(handle, RenderHandle("r-1".to_string()));
}

#[tokio::test]
async fn test_renderer_rejected_submission_is_render_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/renders"))
        .respond_with(ResponseTemplate::new(400).set_body_string("template not found"))
        .mount(&server)
        .await;

    let err = renderer(&server)
        .submit("missing", &AdCopy::new("Stay warm, ski hard."))
        .await
        .unwrap_err();

    assert!(matches!(err, CampaignError::RenderFailed(reason) if reason.contains("template not found")));
}

#[tokio::test]
async fn test_renderer_outage_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = renderer(&server)
        .submit("ad-default", &AdCopy::new("Stay warm, ski hard."))
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn test_renderer_poll_reads_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/renders/r-1"))
        .and(header("x-api-key", KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "done",
            "url": "https://cdn/x.mp4",
            "duration": 15.0
        })))
        .mount(&server)
        .await;

    let status = renderer(&server)
        .poll(&RenderHandle("r-1".to_string()))
        .await
        .unwrap();

    assert_eq!(status, RenderStatus::Done(artifact()));
}

#[tokio::test]
async fn test_renderer_poll_encodes_handle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/renders/a%2Fb%3Fx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
        .expect(1)
        .mount(&server)
        .await;

    let status = renderer(&server)
        .poll(&RenderHandle("a/b?x".to_string()))
        .await
        .unwrap();

    assert_eq!(status, RenderStatus::Pending);
}

// Email

#[tokio::test]
async fn test_email_without_id_is_still_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(bearer_token(KEY))
        .and(body_partial_json(json!({
            "to": ["a@b.com"],
            "subject": "Your new video ad is ready"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = notifier(&server)
        .send("a@b.com", &AdCopy::new("Stay warm, ski hard."), &artifact())
        .await
        .unwrap();

    assert!(receipt.accepted);
    assert_eq!(receipt.message_id, None);
}

#[tokio::test]
async fn test_email_returns_provider_message_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m-1"})))
        .mount(&server)
        .await;

    let receipt = notifier(&server)
        .send("a@b.com", &AdCopy::new("Stay warm, ski hard."), &artifact())
        .await
        .unwrap();

    assert_eq!(receipt.message_id.as_deref(), Some("m-1"));
}

#[tokio::test]
async fn test_email_validation_error_is_delivery_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid `to` field"))
        .mount(&server)
        .await;

    let err = notifier(&server)
        .send("a@b.com", &AdCopy::new("Stay warm, ski hard."), &artifact())
        .await
        .unwrap_err();

    assert!(matches!(err, CampaignError::DeliveryFailed(_)));
}

#[tokio::test]
async fn test_email_outage_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = notifier(&server)
        .send("a@b.com", &AdCopy::new("Stay warm, ski hard."), &artifact())
        .await
        .unwrap_err();

    assert!(matches!(err, CampaignError::UpstreamUnavailable { service, .. } if service == "email"));
}
