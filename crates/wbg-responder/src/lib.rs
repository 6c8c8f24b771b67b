//! Response-service adapter (HTTP).
//!
//! `POST <base>/api/get_response` with `{sender, message}`; the reply text is the
//! `response` field of the JSON body. Every failure maps to `Error::Forward`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use wbg_core::{
    errors::Error,
    responder::{ResponseReply, ResponseRequest, ResponseService},
    utils::truncate_text,
    Result,
};

const GET_RESPONSE_PATH: &str = "/api/get_response";
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Clone, Debug)]
pub struct HttpResponder {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpResponder {
    /// `timeout: None` keeps the HTTP client's own default (no overall timeout).
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("response service client build failed: {e}")))?;

        Ok(Self {
            endpoint: endpoint_url(base_url),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn endpoint_url(base_url: &str) -> String {
    format!("{}{GET_RESPONSE_PATH}", base_url.trim().trim_end_matches('/'))
}

#[async_trait]
impl ResponseService for HttpResponder {
    async fn get_response(&self, req: &ResponseRequest) -> Result<ResponseReply> {
        debug!(endpoint = %self.endpoint, sender = %req.sender, "forwarding message");

        let resp = self
            .http
            .post(&self.endpoint)
            .json(req)
            .send()
            .await
            .map_err(|e| Error::Forward(format!("response service request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Forward(format!(
                "response service returned {status}: {}",
                truncate_text(&body, ERROR_BODY_PREVIEW)
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Forward(format!("response service json error: {e}")))?;

        let Some(text) = v.get("response").and_then(|t| t.as_str()) else {
            return Err(Error::Forward(format!(
                "response service reply has no string `response` field: {}",
                truncate_text(&v.to_string(), ERROR_BODY_PREVIEW)
            )));
        };

        Ok(ResponseReply {
            response: text.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn request() -> ResponseRequest {
        ResponseRequest {
            sender: "1234@c.us".to_string(),
            message: "hello".to_string(),
            bot_id: None,
        }
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        assert_eq!(
            endpoint_url("http://127.0.0.1:5000/"),
            "http://127.0.0.1:5000/api/get_response"
        );
        assert_eq!(
            endpoint_url("https://bots.example.com/prefix"),
            "https://bots.example.com/prefix/api/get_response"
        );
    }

    #[tokio::test]
    async fn posts_sender_and_message_and_reads_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/get_response")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"sender": "1234@c.us", "message": "hello"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"response": "hi there"}).to_string())
            .create_async()
            .await;

        let client = HttpResponder::new(&server.url(), None).unwrap();
        let reply = client.get_response(&request()).await.unwrap();

        assert_eq!(reply.response, "hi there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn bot_id_is_sent_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/get_response")
            .match_body(Matcher::PartialJson(json!({"bot_id": 9})))
            .with_status(200)
            .with_body(json!({"response": "ok"}).to_string())
            .create_async()
            .await;

        let client = HttpResponder::new(&server.url(), None).unwrap();
        let mut req = request();
        req.bot_id = Some(9);
        client.get_response(&req).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_forward_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/get_response")
            .with_status(404)
            .with_body(json!({"response": "No active bot found"}).to_string())
            .create_async()
            .await;

        let client = HttpResponder::new(&server.url(), None).unwrap();
        let err = client.get_response(&request()).await.unwrap_err();

        assert!(matches!(err, Error::Forward(_)), "{err}");
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn missing_or_non_string_response_field_is_forward_error() {
        for body in [
            json!({"error": "Invalid request"}).to_string(),
            json!({"response": 42}).to_string(),
            "not json".to_string(),
        ] {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("POST", "/api/get_response")
                .with_status(200)
                .with_body(body.clone())
                .create_async()
                .await;

            let client = HttpResponder::new(&server.url(), None).unwrap();
            let err = client.get_response(&request()).await.unwrap_err();
            assert!(matches!(err, Error::Forward(_)), "{body}: {err}");
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_forward_error() {
        // Port 9 (discard) is not expected to accept HTTP connections.
        let client = HttpResponder::new("http://127.0.0.1:9", Some(Duration::from_secs(2))).unwrap();
        let err = client.get_response(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Forward(_)), "{err}");
    }
}
