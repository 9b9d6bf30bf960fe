//! Integration tests for the Ngumzo WhatsApp gateway client

use aisha_backend::phone::{NumberingPlan, PhoneNumber};
use aisha_backend::upstream::UpstreamError;
use aisha_backend::whatsapp::{MediaKind, Messenger, NgumzoClient, NgumzoConfig, OutboundContent};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(base_url: &str, timeout: Duration) -> NgumzoClient {
    NgumzoClient::new(NgumzoConfig {
        api_key: "test-ngumzo-key".to_string(),
        base_url: base_url.to_string(),
        sender_id: "AISHA".to_string(),
        timeout,
    })
    .unwrap()
}

fn recipient() -> PhoneNumber {
    NumberingPlan::kenya().normalize("0712345678").unwrap()
}

fn text(body: &str) -> OutboundContent {
    OutboundContent::Text {
        body: body.to_string(),
    }
}

#[tokio::test]
async fn sends_text_and_reads_receipt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send-message"))
        .and(body_json(json!({
            "api_key": "test-ngumzo-key",
            "sender_id": "AISHA",
            "to": "+254712345678",
            "message_type": "text",
            "message": "Karibu!"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "messages": [{ "id": "wamid.HBgM", "message_status": "accepted" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let receipt = client(&mock_server.uri(), Duration::from_secs(5))
        .send(&recipient(), &text("Karibu!"))
        .await
        .unwrap();

    assert_eq!(receipt.message_id, "wamid.HBgM");
    assert_eq!(receipt.status, "accepted");
    assert_eq!(receipt.to, recipient());
}

#[tokio::test]
async fn sends_media_with_caption() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send-message"))
        .and(body_partial_json(json!({
            "message_type": "image",
            "media_url": "https://cdn.example.com/poster.png",
            "caption": "Launching soon"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message_id": "m-42",
            "status": "queued"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let content = OutboundContent::Media {
        kind: MediaKind::Image,
        url: "https://cdn.example.com/poster.png".to_string(),
        caption: Some("Launching soon".to_string()),
    };
    let receipt = client(&mock_server.uri(), Duration::from_secs(5))
        .send(&recipient(), &content)
        .await
        .unwrap();

    assert_eq!(receipt.message_id, "m-42");
    assert_eq!(receipt.status, "queued");
}

#[tokio::test]
async fn unauthorized_is_a_rejection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send-message"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid API key" })),
        )
        .mount(&mock_server)
        .await;

    let err = client(&mock_server.uri(), Duration::from_secs(5))
        .send(&recipient(), &text("hi"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        UpstreamError::Rejected {
            provider: "ngumzo",
            status: 401,
            message: "Invalid API key".to_string(),
        }
    );
}

#[tokio::test]
async fn reported_failure_in_a_success_response_is_a_rejection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send-message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "Recipient not on WhatsApp"
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server.uri(), Duration::from_secs(5))
        .send(&recipient(), &text("hi"))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            UpstreamError::Rejected { ref message, .. } if message == "Recipient not on WhatsApp"
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn server_error_is_a_failure_and_sent_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send-message"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server.uri(), Duration::from_secs(5))
        .send(&recipient(), &text("hi"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, UpstreamError::Failed { status: Some(502), .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn slow_gateway_times_out_as_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send-message"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "message_id": "late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let err = client(&mock_server.uri(), Duration::from_millis(200))
        .send(&recipient(), &text("hi"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, UpstreamError::Unavailable { provider: "ngumzo", .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn garbage_body_is_a_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send-message"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server.uri(), Duration::from_secs(5))
        .send(&recipient(), &text("hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Failed { .. }), "{err:?}");
}
