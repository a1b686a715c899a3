//! Minimal Telegram Bot API client.
//!
//! Only the calls the channel needs. Every method answers with the standard
//! envelope `{ "ok": bool, "result": …, "description": …, "error_code": … }`.
//! Request URLs embed the bot token, so transport errors are stripped of
//! their URL before they leave this module.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use pinfs_core::ChannelError;
use pinfs_core::channel::ChannelResult;

/// Response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    pub(crate) fn into_result(self, method: &str) -> ChannelResult<T> {
        if !self.ok {
            return Err(ChannelError::api(
                self.error_code.unwrap_or(0),
                self.description
                    .unwrap_or_else(|| format!("{method} failed")),
            ));
        }
        self.result
            .ok_or_else(|| ChannelError::malformed(format!("{method}: ok without result")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Chat {
    pub id: i64,
    #[serde(default)]
    pub pinned_message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Document {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct File {
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub chat_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageRequest {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct PinRequest {
    pub chat_id: i64,
    pub message_id: i64,
    pub disable_notification: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct FileRequest<'a> {
    pub file_id: &'a str,
}

/// `InputMediaDocument` referencing a multipart attachment.
#[derive(Debug, Serialize)]
pub(crate) struct InputMediaDocument<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media: &'a str,
}

/// Bot API HTTP client.
#[derive(Clone)]
pub(crate) struct BotApi {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

fn transport(err: reqwest::Error) -> ChannelError {
    ChannelError::transport(err.without_url())
}

impl BotApi {
    pub(crate) fn new(http: reqwest::Client, api_url: &str, token: String) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Download URL for a `getFile` path.
    pub(crate) fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }

    /// Call a method with a JSON body.
    pub(crate) async fn call<B, T>(&self, method: &str, body: &B) -> ChannelResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(method, "bot api call");
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(method, response).await
    }

    /// Call a method with a multipart body (file uploads).
    pub(crate) async fn call_multipart<T>(
        &self,
        method: &str,
        form: reqwest::multipart::Form,
    ) -> ChannelResult<T>
    where
        T: DeserializeOwned,
    {
        tracing::debug!(method, "bot api multipart call");
        let response = self
            .http
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(method, response).await
    }

    /// GET a URL, failing on non-success status.
    pub(crate) async fn get(&self, url: &str) -> ChannelResult<reqwest::Response> {
        self.http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(transport)
    }

    async fn decode<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> ChannelResult<T> {
        // Error statuses still carry the JSON envelope with a description.
        let bytes = response.bytes().await.map_err(transport)?;
        let envelope: ApiResponse<T> = serde_json::from_slice(&bytes)
            .map_err(|e| ChannelError::malformed(format!("{method}: {e}")))?;
        envelope.into_result(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_ok() {
        let resp: ApiResponse<Message> = serde_json::from_str(
            r#"{"ok":true,"result":{"message_id":5,"document":{"file_id":"BQAC","file_unique_id":"u"}}}"#,
        )
        .unwrap();
        let msg = resp.into_result("sendDocument").unwrap();
        assert_eq!(msg.message_id, 5);
        assert_eq!(msg.document.unwrap().file_id, "BQAC");
    }

    #[test]
    fn test_envelope_error() {
        let resp: ApiResponse<bool> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: message to delete not found"}"#,
        )
        .unwrap();
        match resp.into_result("deleteMessage") {
            Err(ChannelError::Api { code, description }) => {
                assert_eq!(code, 400);
                assert!(description.contains("not found"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_envelope_ok_without_result() {
        let resp: ApiResponse<bool> = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert!(matches!(
            resp.into_result("pinChatMessage"),
            Err(ChannelError::Malformed(_))
        ));
    }

    #[test]
    fn test_chat_pinned_message() {
        let chat: Chat = serde_json::from_str(
            r#"{"id":-100,"type":"channel","pinned_message":{"message_id":9,"date":0,"document":{"file_id":"X"}}}"#,
        )
        .unwrap();
        assert_eq!(chat.id, -100);
        assert_eq!(chat.pinned_message.unwrap().message_id, 9);

        let bare: Chat = serde_json::from_str(r#"{"id":-100,"type":"channel"}"#).unwrap();
        assert!(bare.pinned_message.is_none());
    }

    #[test]
    fn test_urls() {
        let api = BotApi::new(reqwest::Client::new(), "https://api.telegram.org/", "1:T".into());
        assert_eq!(api.method_url("getChat"), "https://api.telegram.org/bot1:T/getChat");
        assert_eq!(
            api.file_url("documents/file_1.json"),
            "https://api.telegram.org/file/bot1:T/documents/file_1.json"
        );
    }

    #[test]
    fn test_input_media_shape() {
        let media = InputMediaDocument {
            kind: "document",
            media: "attach://document",
        };
        assert_eq!(
            serde_json::to_string(&media).unwrap(),
            r#"{"type":"document","media":"attach://document"}"#
        );
    }
}
