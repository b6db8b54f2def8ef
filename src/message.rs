use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::client::LarkClient;

/// Messages per throttling band.
pub const BAND_SIZE: usize = 40;
/// Delay step between consecutive bands.
pub const BAND_DELAY: Duration = Duration::from_millis(800);

/// One outbound rich-text message, addressed either to a chat the bot is in
/// or to a custom webhook URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub webhook: Option<String>,
    /// Rich-text ("post") content, passed through to the platform verbatim.
    pub post: Value,
}

impl OutgoingMessage {
    pub fn to_chat(chat_id: impl Into<String>, post: Value) -> Self {
        Self {
            chat_id: Some(chat_id.into()),
            webhook: None,
            post,
        }
    }

    pub fn to_webhook(webhook: impl Into<String>, post: Value) -> Self {
        Self {
            chat_id: None,
            webhook: Some(webhook.into()),
            post,
        }
    }
}

/// Response body of a send, with the platform status pre-checked.
#[derive(Debug, Clone, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Shapes the `content` field for the two delivery paths: webhook targets
/// take a nested object, the messages endpoint takes the same object
/// JSON-encoded as a string.
pub(crate) fn shape_content(post: &Value, via_webhook: bool) -> Value {
    let wrapped = json!({ "zh_cn": post });
    if via_webhook {
        json!({ "post": wrapped })
    } else {
        Value::String(wrapped.to_string())
    }
}

/// Delay applied before dispatching the message at `index`: bands of
/// [`BAND_SIZE`] consecutive messages share one step of [`BAND_DELAY`].
/// Computed from the absolute index, not drift-corrected.
pub fn band_delay(index: usize) -> Duration {
    BAND_DELAY * (index / BAND_SIZE) as u32
}

impl LarkClient {
    /// Sends one message. Returns `None` on any failure (absent token,
    /// transport error, rejected status, non-zero platform code); the error
    /// detail is logged and nothing propagates or retries.
    pub async fn send_message(&self, message: &OutgoingMessage) -> Option<SendReceipt> {
        let token = match self.tenant_access_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!("send aborted: no access token");
                return None;
            }
            Err(e) => {
                error!(error = %e, "send aborted: token fetch failed");
                return None;
            }
        };

        let url = match &message.webhook {
            Some(webhook) => webhook.clone(),
            None => format!(
                "{}/im/v1/messages?receive_id_type=chat_id",
                self.config.base_url
            ),
        };

        #[derive(Serialize)]
        struct MessageBody<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            receive_id: Option<&'a str>,
            msg_type: &'a str,
            post: &'a Value,
            content: Value,
        }

        let body = MessageBody {
            receive_id: message.chat_id.as_deref(),
            msg_type: "post",
            post: &message.post,
            content: shape_content(&message.post, message.webhook.is_some()),
        };

        let response = match self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "message send failed");
                return None;
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(%status, body = %text, "message send rejected");
            return None;
        }

        let receipt: SendReceipt = match serde_json::from_str(&text) {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(error = %e, body = %text, "message response decode failed");
                return None;
            }
        };

        if receipt.code != 0 {
            error!(code = receipt.code, msg = %receipt.msg, "message send returned error");
            return None;
        }

        debug!("message sent");
        Some(receipt)
    }

    /// Sends a sequence of messages in strict input order, one at a time.
    ///
    /// Before each message the band delay for its index is awaited, so a new
    /// band of [`BAND_SIZE`] sends begins no sooner than [`BAND_DELAY`] after
    /// the previous one. Per-message failures are absorbed by
    /// [`send_message`](Self::send_message); the batch always runs to
    /// completion and cannot be cancelled mid-flight.
    pub async fn send_batch(&self, messages: &[OutgoingMessage]) {
        for (index, message) in messages.iter().enumerate() {
            let delay = band_delay(index);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.send_message(message).await;
        }
        debug!(count = messages.len(), "batch dispatched");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use httpmock::Method::POST;
    use httpmock::MockServer;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::Mutex;

    use crate::config::Config;

    use super::*;

    /// Minimal endpoint that records message bodies in arrival order.
    /// Token requests are answered but not recorded.
    async fn spawn_recording_endpoint() -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = recorded.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut raw = Vec::new();
                let body = loop {
                    let mut chunk = [0u8; 4096];
                    let n = match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break None,
                        Ok(n) => n,
                    };
                    raw.extend_from_slice(&chunk[..n]);
                    if let Some(body) = complete_request_body(&raw) {
                        break Some(body);
                    }
                };
                let Some(body) = body else { continue };
                let reply = if String::from_utf8_lossy(&raw).starts_with("POST /auth/") {
                    r#"{"code":0,"msg":"ok","tenant_access_token":"t-1"}"#
                } else {
                    sink.lock().await.push(body);
                    r#"{"code":0,"msg":"ok","data":{"message_id":"om_1"}}"#
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    reply.len(),
                    reply
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        (base_url, recorded)
    }

    fn complete_request_body(raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw);
        let (head, body) = text.split_once("\r\n\r\n")?;
        let content_length: usize = head.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })?;
        (body.len() >= content_length).then(|| body[..content_length].to_string())
    }

    fn mock_token(server: &MockServer) {
        server.mock(|when, then| {
            when.method(POST).path("/auth/v3/tenant_access_token/internal");
            then.status(200)
                .json_body(json!({"code": 0, "msg": "ok", "tenant_access_token": "t-1"}));
        });
    }

    fn client_for(server: &MockServer) -> LarkClient {
        LarkClient::new(Config::new("cli_x", "s").with_base_url(server.base_url()))
    }

    #[test]
    fn webhook_content_is_a_nested_object() {
        let content = shape_content(&json!("hello"), true);
        assert_eq!(content, json!({"post": {"zh_cn": "hello"}}));
    }

    #[test]
    fn chat_content_is_a_json_string() {
        let content = shape_content(&json!("hello"), false);
        assert_eq!(content, Value::String(r#"{"zh_cn":"hello"}"#.to_string()));
    }

    #[test]
    fn band_delay_steps_every_forty_messages() {
        for index in 0..40 {
            assert_eq!(band_delay(index), Duration::ZERO);
        }
        for index in 40..80 {
            assert_eq!(band_delay(index), Duration::from_millis(800));
        }
        for index in 80..85 {
            assert_eq!(band_delay(index), Duration::from_millis(1600));
        }
    }

    #[tokio::test]
    async fn chat_send_routes_through_the_messages_endpoint() {
        let server = MockServer::start_async().await;
        mock_token(&server);
        let send = server.mock(|when, then| {
            when.method(POST)
                .path("/im/v1/messages")
                .query_param("receive_id_type", "chat_id")
                .header("authorization", "Bearer t-1")
                .json_body(json!({
                    "receive_id": "oc_1",
                    "msg_type": "post",
                    "post": "hello",
                    "content": "{\"zh_cn\":\"hello\"}"
                }));
            then.status(200).json_body(json!({
                "code": 0, "msg": "ok",
                "data": {"message_id": "om_42"}
            }));
        });

        let receipt = client_for(&server)
            .send_message(&OutgoingMessage::to_chat("oc_1", json!("hello")))
            .await
            .expect("send should succeed");
        send.assert_async().await;
        assert_eq!(receipt.data.unwrap()["message_id"], "om_42");
    }

    #[tokio::test]
    async fn webhook_send_posts_to_the_webhook_url() {
        let server = MockServer::start_async().await;
        mock_token(&server);
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/hook/abc123")
                .json_body(json!({
                    "msg_type": "post",
                    "post": "hello",
                    "content": {"post": {"zh_cn": "hello"}}
                }));
            then.status(200).json_body(json!({"code": 0, "msg": "success"}));
        });

        let message =
            OutgoingMessage::to_webhook(server.url("/hook/abc123"), json!("hello"));
        let receipt = client_for(&server).send_message(&message).await;
        hook.assert_async().await;
        assert!(receipt.is_some());
    }

    #[tokio::test]
    async fn transport_failure_yields_none() {
        crate::testing::init_tracing();
        let server = MockServer::start_async().await;
        mock_token(&server);
        server.mock(|when, then| {
            when.method(POST).path("/im/v1/messages");
            then.status(502).body("bad gateway");
        });

        let receipt = client_for(&server)
            .send_message(&OutgoingMessage::to_chat("oc_1", json!("hi")))
            .await;
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn platform_error_code_yields_none() {
        crate::testing::init_tracing();
        let server = MockServer::start_async().await;
        mock_token(&server);
        server.mock(|when, then| {
            when.method(POST).path("/im/v1/messages");
            then.status(200).json_body(json!({
                "code": 230002, "msg": "bot not in chat",
                "error": {"field_violations": []}
            }));
        });

        let receipt = client_for(&server)
            .send_message(&OutgoingMessage::to_chat("oc_gone", json!("hi")))
            .await;
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn missing_credentials_abort_the_send() {
        let server = MockServer::start_async().await;
        let send = server.mock(|when, then| {
            when.method(POST).path("/im/v1/messages");
            then.status(200);
        });

        let client = LarkClient::new(Config::new("", "").with_base_url(server.base_url()));
        let receipt = client
            .send_message(&OutgoingMessage::to_chat("oc_1", json!("hi")))
            .await;
        assert!(receipt.is_none());
        send.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn batch_dispatches_every_message() {
        let server = MockServer::start_async().await;
        mock_token(&server);
        let send = server.mock(|when, then| {
            when.method(POST).path("/im/v1/messages");
            then.status(200)
                .json_body(json!({"code": 0, "msg": "ok", "data": {"message_id": "om_1"}}));
        });

        // Three messages stay inside band zero, so no delay is involved.
        let messages: Vec<_> = (0..3)
            .map(|i| OutgoingMessage::to_chat(format!("oc_{i}"), json!(format!("msg {i}"))))
            .collect();
        client_for(&server).send_batch(&messages).await;
        send.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn batch_sends_arrive_in_index_order() {
        let (base_url, recorded) = spawn_recording_endpoint().await;
        let client = LarkClient::new(Config::new("cli_x", "s").with_base_url(base_url));

        let messages: Vec<_> = (0..3)
            .map(|i| OutgoingMessage::to_chat(format!("oc_{i}"), json!(format!("msg {i}"))))
            .collect();
        client.send_batch(&messages).await;

        let bodies = recorded.lock().await;
        let receive_ids: Vec<String> = bodies
            .iter()
            .map(|body| {
                serde_json::from_str::<Value>(body).unwrap()["receive_id"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(receive_ids, ["oc_0", "oc_1", "oc_2"]);
    }
}
