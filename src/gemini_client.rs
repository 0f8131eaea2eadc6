use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("API request failed: {status}")]
    ApiRequest { status: StatusCode, body: String },

    #[error("Invalid response format: {0}")]
    MalformedResponse(String),

    #[error("Failed to reach Gemini API: {0}")]
    Transport(#[source] reqwest::Error),
}

impl GeminiError {
    /// The request URL carries the API key, so it is dropped from the error.
    fn transport(e: reqwest::Error) -> Self {
        GeminiError::Transport(e.without_url())
    }
}

/// Something that can turn a prompt into a single reply.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn ask(&self, prompt: &str, credential: &str) -> Result<String, GeminiError>;
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

pub struct GeminiClient {
    endpoint: Url,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(endpoint: &str) -> eyre::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| eyre::eyre!("Invalid Gemini endpoint {}: {}", endpoint, e))?;

        Ok(Self {
            endpoint,
            client: reqwest::Client::new(),
        })
    }

    fn request_url(&self, credential: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", credential);
        url
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn ask(&self, prompt: &str, credential: &str) -> Result<String, GeminiError> {
        let request_body = GenerateContentRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        debug!("Sending request to {}: {} bytes of prompt", self.endpoint, prompt.len());

        let response = self
            .client
            .post(self.request_url(credential))
            .json(&request_body)
            .send()
            .await
            .map_err(GeminiError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(GeminiError::transport)?;

        if !status.is_success() {
            error!("API request failed with status {}: {}", status, body);
            return Err(GeminiError::ApiRequest { status, body });
        }

        debug!("Received response from Gemini API: {}", body);

        let response_json: Value = serde_json::from_str(&body)
            .map_err(|e| GeminiError::MalformedResponse(format!("body is not JSON: {}", e)))?;

        extract_reply(&response_json)
            .map(str::to_string)
            .ok_or_else(|| {
                GeminiError::MalformedResponse(
                    "missing candidates[0].content.parts[0].text".to_string(),
                )
            })
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a reply.
fn extract_reply(response_json: &Value) -> Option<&str> {
    response_json
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const PATH: &str = "/v1beta/models/gemini-pro:generateContent";

    async fn client_for(server: &mockito::ServerGuard) -> GeminiClient {
        GeminiClient::new(&format!("{}{}", server.url(), PATH)).expect("client")
    }

    /// An endpoint on a port nothing listens on.
    fn unreachable_endpoint() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        format!("http://127.0.0.1:{}{}", port, PATH)
    }

    #[test]
    fn extract_reply_follows_nested_shape() {
        let reply = json!({"candidates": [{"content": {"parts": [{"text": "hi"}, {"text": "ignored"}]}}]});
        assert_eq!(extract_reply(&reply), Some("hi"));

        assert_eq!(extract_reply(&json!({})), None);
        assert_eq!(extract_reply(&json!({"candidates": []})), None);
        assert_eq!(extract_reply(&json!({"candidates": [{"content": {}}]})), None);
        assert_eq!(
            extract_reply(&json!({"candidates": [{"content": {"parts": [{"text": 3}]}}]})),
            None
        );
    }

    #[test]
    fn credential_goes_in_query() {
        let client = GeminiClient::new(DEFAULT_ENDPOINT).expect("client");
        let url = client.request_url("a b&c");
        assert_eq!(url.path(), "/v1beta/models/gemini-pro:generateContent");
        assert_eq!(url.query(), Some("key=a+b%26c"));
    }

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(GeminiClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn returns_reply_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_query(Matcher::UrlEncoded("key".into(), "secret".into()))
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"contents": [{"parts": [{"text": "Hi\nthere"}]}]})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"hello"}]}}]}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let reply = client.ask("Hi\nthere", "secret").await.expect("reply");

        assert_eq!(reply, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error":{"message":"API key not valid"}}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let err = client.ask("hello", "bad").await.expect_err("should fail");

        match err {
            GeminiError::ApiRequest { status, body } => {
                assert_eq!(status.as_u16(), 401);
                assert!(body.contains("API key not valid"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unexpected_shape_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_for(&server).await;
        let err = client.ask("hello", "key").await.expect_err("should fail");
        assert!(matches!(err, GeminiError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let client = client_for(&server).await;
        let err = client.ask("hello", "key").await.expect_err("should fail");
        assert!(matches!(err, GeminiError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn connection_failure_is_transport_without_key() {
        let client = GeminiClient::new(&unreachable_endpoint()).expect("client");

        let err = client.ask("hi", "SUPERSECRET").await.expect_err("should fail");

        assert!(matches!(err, GeminiError::Transport(_)));
        assert!(!format!("{}", err).contains("SUPERSECRET"));
        assert!(!format!("{:?}", err).contains("SUPERSECRET"));
        assert!(!format!("Error calling Gemini API: {}", err).contains("key="));
    }
}
