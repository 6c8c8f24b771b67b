//! Relay + HTTP responder against a mock response service.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mockito::Matcher;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wbg_core::{
    domain::{InboundMessage, SenderId},
    errors::Error,
    messaging::port::ChatSender,
    relay::{MessageRelay, RelayOutcome, APOLOGY_TEXT},
    Result,
};
use wbg_responder::HttpResponder;

#[derive(Default)]
struct RecordingSender {
    fail: bool,
    sends: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    fn sent(&self) -> Vec<(String, String)> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSender for RecordingSender {
    async fn send_text(&self, to: &SenderId, text: &str) -> Result<()> {
        self.sends
            .lock()
            .unwrap()
            .push((to.0.clone(), text.to_string()));
        if self.fail {
            return Err(Error::Send("bridge closed".to_string()));
        }
        Ok(())
    }
}

fn message(sender: &str, body: &str, is_group: bool) -> InboundMessage {
    InboundMessage {
        sender: SenderId::from(sender),
        body: body.to_string(),
        is_group,
    }
}

#[tokio::test]
async fn direct_message_is_answered_with_service_reply() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/get_response")
        .match_body(Matcher::Json(json!({"sender": "1234@c.us", "message": "hello"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"response": "hi there"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let sender = Arc::new(RecordingSender::default());
    let responder = Arc::new(HttpResponder::new(&server.url(), None).unwrap());
    let relay = MessageRelay::new(responder, sender.clone());

    let outcome = relay
        .handle_inbound(message("1234@c.us", "hello", false))
        .await;

    assert_eq!(outcome, RelayOutcome::Replied);
    assert_eq!(
        sender.sent(),
        vec![("1234@c.us".to_string(), "hi there".to_string())]
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn service_error_yields_apology() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/get_response")
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create_async()
        .await;

    let sender = Arc::new(RecordingSender::default());
    let responder = Arc::new(HttpResponder::new(&server.url(), None).unwrap());
    let relay = MessageRelay::new(responder, sender.clone());

    let outcome = relay
        .handle_inbound(message("1234@c.us", "hello", false))
        .await;

    assert_eq!(outcome, RelayOutcome::Apologized);
    assert_eq!(
        sender.sent(),
        vec![("1234@c.us".to_string(), APOLOGY_TEXT.to_string())]
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_response_field_yields_apology() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/get_response")
        .with_status(200)
        .with_body(json!({"error": "Invalid request"}).to_string())
        .create_async()
        .await;

    let sender = Arc::new(RecordingSender::default());
    let responder = Arc::new(HttpResponder::new(&server.url(), None).unwrap());
    let relay = MessageRelay::new(responder, sender.clone());

    let outcome = relay
        .handle_inbound(message("1234@c.us", "hello", false))
        .await;

    assert_eq!(outcome, RelayOutcome::Apologized);
    assert_eq!(sender.sent()[0].1, APOLOGY_TEXT);
}

#[tokio::test]
async fn group_message_makes_no_calls() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let sender = Arc::new(RecordingSender::default());
    let responder = Arc::new(HttpResponder::new(&server.url(), None).unwrap());
    let relay = MessageRelay::new(responder, sender.clone());

    let outcome = relay
        .handle_inbound(message("group@g.us", "hello", true))
        .await;

    assert_eq!(outcome, RelayOutcome::IgnoredGroup);
    assert!(sender.sent().is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn failed_apology_does_not_escape() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/get_response")
        .with_status(503)
        .create_async()
        .await;

    let sender = Arc::new(RecordingSender {
        fail: true,
        ..RecordingSender::default()
    });
    let responder = Arc::new(HttpResponder::new(&server.url(), None).unwrap());
    let relay = MessageRelay::new(responder, sender.clone());

    let outcome = relay
        .handle_inbound(message("1234@c.us", "hello", false))
        .await;

    assert_eq!(outcome, RelayOutcome::Dropped);
    assert_eq!(sender.sent().len(), 1);
}

#[tokio::test]
async fn one_failing_message_does_not_affect_the_next() {
    let mut server = mockito::Server::new_async().await;
    let _bad = server
        .mock("POST", "/api/get_response")
        .match_body(Matcher::PartialJson(json!({"message": "boom"})))
        .with_status(500)
        .create_async()
        .await;
    let _good = server
        .mock("POST", "/api/get_response")
        .match_body(Matcher::PartialJson(json!({"message": "hello"})))
        .with_status(200)
        .with_body(json!({"response": "hi there"}).to_string())
        .create_async()
        .await;

    let sender = Arc::new(RecordingSender::default());
    let responder = Arc::new(HttpResponder::new(&server.url(), None).unwrap());
    let relay = Arc::new(MessageRelay::new(responder, sender.clone()));

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(message("1@c.us", "boom", false)).unwrap();
    tx.send(message("2@c.us", "hello", false)).unwrap();
    drop(tx);
    relay.run(rx, CancellationToken::new()).await;

    let mut sent = sender.sent();
    sent.sort();
    assert_eq!(
        sent,
        vec![
            ("1@c.us".to_string(), APOLOGY_TEXT.to_string()),
            ("2@c.us".to_string(), "hi there".to_string()),
        ]
    );
}

#[tokio::test]
async fn empty_service_reply_is_sent_as_is() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/get_response")
        .with_status(200)
        .with_body(json!({"response": ""}).to_string())
        .create_async()
        .await;

    let sender = Arc::new(RecordingSender::default());
    let responder = Arc::new(HttpResponder::new(&server.url(), None).unwrap());
    let relay = MessageRelay::new(responder, sender.clone());

    let outcome = relay
        .handle_inbound(message("1234@c.us", "hello", false))
        .await;

    assert_eq!(outcome, RelayOutcome::Replied);
    assert_eq!(sender.sent(), vec![("1234@c.us".to_string(), String::new())]);
}
