//! Slack Web API client tests against a mock API root.

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reaction_gate::correlator::{CorrelationMetadata, IdentityResolver};
use reaction_gate::slack::socket::{ReactionAdded, ReactionItem};
use reaction_gate::slack::SlackClient;

async fn client(server: &MockServer) -> SlackClient {
    SlackClient::new("xoxb-test", Some("xapp-test".into()))
        .unwrap()
        .with_base_url(server.uri())
}

mod identity_tests {
    use super::*;

    #[tokio::test]
    async fn test_user_email_resolves_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .and(query_param("user", "U123"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user": { "id": "U123", "profile": { "email": "alice@x.com" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let slack = client(&server).await;
        assert_eq!(slack.resolve("U123").await.unwrap(), "alice@x.com");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "user_not_found" })),
            )
            .mount(&server)
            .await;

        let err = client(&server).await.user_email("U404").await.unwrap_err();
        assert!(err.to_string().contains("user_not_found"));
    }

    #[tokio::test]
    async fn test_missing_email_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user": { "id": "UBOT", "profile": {} }
            })))
            .mount(&server)
            .await;

        assert!(client(&server).await.user_email("UBOT").await.is_err());
    }
}

mod message_tests {
    use super::*;

    fn history(message: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "messages": [message] }))
    }

    #[tokio::test]
    async fn test_metadata_from_attachment_callback_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .and(query_param("channel", "C1"))
            .and(query_param("latest", "1700000000.000100"))
            .and(query_param("inclusive", "true"))
            .and(query_param("limit", "1"))
            .respond_with(history(json!({
                "ts": "1700000000.000100",
                "text": "Deploy?",
                "attachments": [
                    { "callback_id": "{\"request_id\":\"abc\",\"app_name\":\"acme\"}" }
                ]
            })))
            .mount(&server)
            .await;

        let raw = client(&server)
            .await
            .message_metadata("C1", "1700000000.000100")
            .await
            .unwrap()
            .unwrap();
        let meta = CorrelationMetadata::parse(&raw).unwrap();
        assert_eq!(meta.request_id, "abc");
        assert_eq!(meta.app_name.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn test_metadata_from_message_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(history(json!({
                "ts": "1.0",
                "text": "Deploy?",
                "metadata": {
                    "event_type": "reactgate_request",
                    "event_payload": { "message_id": "def" }
                }
            })))
            .mount(&server)
            .await;

        let raw = client(&server)
            .await
            .message_metadata("C1", "1.0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(CorrelationMetadata::parse(&raw).unwrap().request_id, "def");
    }

    #[tokio::test]
    async fn test_plain_message_has_no_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(history(json!({ "ts": "1.0", "text": "just chatting" })))
            .mount(&server)
            .await;

        let meta = client(&server).await.message_metadata("C1", "1.0").await.unwrap();
        assert!(meta.is_none());
    }

    #[tokio::test]
    async fn test_older_message_in_history_is_not_used() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(history(json!({
                "ts": "1700000000.000100",
                "attachments": [
                    { "callback_id": "{\"request_id\":\"OTHER\",\"app_name\":\"acme\"}" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .and(query_param("ts", "1700000000.000200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "messages": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let meta = client(&server)
            .await
            .message_metadata("C1", "1700000000.000200")
            .await
            .unwrap();
        assert!(meta.is_none());
    }

    #[tokio::test]
    async fn test_thread_reply_found_through_replies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(history(json!({
                "ts": "1700000000.000100",
                "attachments": [{ "callback_id": "{\"request_id\":\"PARENT\"}" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.replies"))
            .and(query_param("channel", "C1"))
            .and(query_param("ts", "1700000000.000300"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "messages": [
                    {
                        "ts": "1700000000.000100",
                        "attachments": [{ "callback_id": "{\"request_id\":\"PARENT\"}" }]
                    },
                    {
                        "ts": "1700000000.000300",
                        "thread_ts": "1700000000.000100",
                        "attachments": [{ "callback_id": "{\"request_id\":\"REPLY\"}" }]
                    }
                ]
            })))
            .mount(&server)
            .await;

        let raw = client(&server)
            .await
            .message_metadata("C1", "1700000000.000300")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(CorrelationMetadata::parse(&raw).unwrap().request_id, "REPLY");
    }

    #[tokio::test]
    async fn test_reaction_event_carries_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(history(json!({
                "ts": "1.0",
                "attachments": [{ "callback_id": "{\"request_id\":\"abc\"}" }]
            })))
            .mount(&server)
            .await;

        let event = client(&server)
            .await
            .reaction_event(ReactionAdded {
                user: "U123".into(),
                reaction: "white_check_mark".into(),
                item: ReactionItem {
                    kind: "message".into(),
                    channel: Some("C1".into()),
                    ts: Some("1.0".into()),
                },
            })
            .await;
        assert_eq!(event.user_id, "U123");
        assert_eq!(event.emoji, "white_check_mark");
        assert_eq!(event.metadata.as_deref(), Some("{\"request_id\":\"abc\"}"));
    }

    #[tokio::test]
    async fn test_reaction_event_without_history_has_no_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let event = client(&server)
            .await
            .reaction_event(ReactionAdded {
                user: "U123".into(),
                reaction: "x".into(),
                item: ReactionItem {
                    kind: "message".into(),
                    channel: Some("C1".into()),
                    ts: Some("1.0".into()),
                },
            })
            .await;
        assert!(event.metadata.is_none());
    }
}

mod socket_tests {
    use super::*;

    #[tokio::test]
    async fn test_open_socket_url_uses_app_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps.connections.open"))
            .and(header("authorization", "Bearer xapp-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "url": "wss://wss.slack.test/link/?ticket=1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = client(&server).await.open_socket_url().await.unwrap();
        assert_eq!(url, "wss://wss.slack.test/link/?ticket=1");
    }

    #[tokio::test]
    async fn test_open_socket_url_needs_app_token() {
        let server = MockServer::start().await;
        let slack = SlackClient::new("xoxb-test", None)
            .unwrap()
            .with_base_url(server.uri());
        assert!(slack.open_socket_url().await.is_err());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
