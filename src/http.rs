use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::CredentialProvider;
use crate::session::SessionService;
use crate::{Conversation, ConversationSummary, Error, Message, Result, SessionGrant};

const DEFAULT_API_BASE: &str = "http://localhost:8000/api/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    chatbot_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: String,
    conversation_id: String,
    #[serde(default)]
    messages: Vec<Message>,
}

/// A [`SessionService`] backed by the chat backend's REST API.
///
/// Endpoints, relative to the API base:
/// - `POST sessions` with `{"chatbot_id", "conversation_id"?}`
/// - `GET chatbots/{id}/conversations`
#[derive(Clone)]
pub struct HttpSessionService {
    client: ReqwestClient,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
    timeout: Duration,
}

impl HttpSessionService {
    /// Create a service against the default API base (`http://localhost:8000/api/`).
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        Self::with_options(credentials, DEFAULT_API_BASE, DEFAULT_TIMEOUT)
    }

    /// Create a service against `base_url` with a per-request timeout.
    pub fn with_options(
        credentials: Arc<dyn CredentialProvider>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        url::Url::parse(&base_url)?;
        Ok(Self {
            client,
            credentials,
            base_url,
            timeout,
        })
    }

    /// The API base every endpoint is resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let token = self
            .credentials
            .auth_token()
            .ok_or_else(|| Error::authentication("no authentication token available"))?;
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::authentication("token is not a valid header value"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.headers(self.headers()?).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(
                    format!("Request timed out: {e}"),
                    Some(self.timeout.as_secs_f64()),
                )
            } else if e.is_connect() {
                Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
            } else {
                Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
            }
        })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {e}"),
                Some(Box::new(e)),
            )
        })
    }

    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        #[derive(Deserialize)]
        struct ErrorBody {
            detail: Option<String>,
            message: Option<String>,
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.detail.or(b.message))
            .unwrap_or(body);

        match status_code {
            401 | 403 => Error::authentication(message),
            408 => Error::timeout(message, None),
            _ => Error::api(status_code, message),
        }
    }

    /// Resolve `segments` under the API base, each as one percent-encoded path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::url(format!("API base cannot carry a path: {}", self.base_url), None))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn create(&self, chatbot_id: &str, conversation_id: Option<&str>) -> Result<SessionGrant> {
        let url = self.endpoint(&["sessions"])?;
        debug!(url = %url, chatbot_id, ?conversation_id, "requesting session");
        let body = CreateSessionRequest {
            chatbot_id,
            conversation_id,
        };
        let created: CreateSessionResponse =
            self.execute(self.client.post(url).json(&body)).await?;
        Ok(SessionGrant {
            session_id: created.session_id,
            conversation: Conversation::with_messages(created.conversation_id, created.messages),
        })
    }
}

#[async_trait::async_trait]
impl SessionService for HttpSessionService {
    async fn create_session(
        &self,
        chatbot_id: &str,
        conversation_id: &str,
    ) -> Result<SessionGrant> {
        self.create(chatbot_id, Some(conversation_id)).await
    }

    async fn create_new_session(&self, chatbot_id: &str) -> Result<SessionGrant> {
        self.create(chatbot_id, None).await
    }

    async fn list_conversations(&self, chatbot_id: &str) -> Result<Vec<ConversationSummary>> {
        let url = self.endpoint(&["chatbots", chatbot_id, "conversations"])?;
        debug!(url = %url, "listing conversations");
        self.execute(self.client.get(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticToken;

    #[test]
    fn base_url_gets_trailing_slash() {
        let service = HttpSessionService::with_options(
            Arc::new(StaticToken::new("t")),
            "https://chat.test/api",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(service.base_url(), "https://chat.test/api/");
    }

    #[test]
    fn conversations_url_encodes_chatbot_id() {
        let service = HttpSessionService::with_options(
            Arc::new(StaticToken::new("t")),
            "https://chat.test/api",
            Duration::from_secs(5),
        )
        .unwrap();
        let url = service
            .endpoint(&["chatbots", "bot1", "conversations"])
            .unwrap();
        assert_eq!(url.as_str(), "https://chat.test/api/chatbots/bot1/conversations");

        for id in ["a/b", "//evil.test/x", "../../admin", "b?x=1", "b#f"] {
            let url = service
                .endpoint(&["chatbots", id, "conversations"])
                .unwrap();
            assert_eq!(url.host_str(), Some("chat.test"), "{id}");
            assert!(url.path().starts_with("/api/chatbots/"), "{id}: {url}");
            assert!(url.path().ends_with("/conversations"), "{id}: {url}");
            assert_eq!(url.path_segments().unwrap().count(), 4, "{id}: {url}");
            assert!(url.query().is_none() && url.fragment().is_none(), "{id}: {url}");
        }
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = HttpSessionService::with_options(
            Arc::new(StaticToken::new("t")),
            "not a url",
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(Error::Url { .. })));
    }

    #[test]
    fn headers_require_token() {
        let service = HttpSessionService::new(Arc::new(StaticToken::absent())).unwrap();
        assert!(service.headers().unwrap_err().is_authentication());

        let service = HttpSessionService::new(Arc::new(StaticToken::new("abc"))).unwrap();
        let headers = service.headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer abc");
    }

    #[test]
    fn session_request_omits_missing_conversation() {
        let body = CreateSessionRequest {
            chatbot_id: "bot1",
            conversation_id: None,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"chatbot_id":"bot1"}"#
        );
    }

    #[test]
    fn session_response_decodes() {
        let created: CreateSessionResponse = serde_json::from_str(
            r#"{"session_id":"s1","conversation_id":"c1","messages":[{"role":"user","content":"hi","timestamp":"2024-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(created.session_id, "s1");
        assert_eq!(created.conversation_id, "c1");
        assert_eq!(created.messages.len(), 1);
        assert!(!created.messages[0].streaming);
    }
}
