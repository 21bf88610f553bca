// API client module: a small blocking HTTP client for the collection
// tracking service. Every call that needs a session takes the bearer
// token explicitly; the publisher owns the session, not the client.

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

const AUTH_PATH: &str = "/api/authentication_token";
const DATA_PATH: &str = "/api/data";
const MAX_DIAGNOSTIC_LEN: usize = 300;

/// Kind of remote resource a row becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Item,
    Wish,
}

impl ResourceKind {
    pub fn collection_path(self) -> &'static str {
        match self {
            ResourceKind::Item => "/api/items",
            ResourceKind::Wish => "/api/wishes",
        }
    }

    /// IRI of one resource, e.g. `/api/items/<id>`.
    pub fn iri(self, id: &str) -> String {
        format!("{}/{}", self.collection_path(), id)
    }

    pub fn image_path(self, id: &str) -> String {
        format!("{}/image", self.iri(id))
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Item => "item",
            ResourceKind::Wish => "wish",
        }
    }
}

/// A text field attached to a resource through `/api/data`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DataField {
    pub item: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub value: String,
    pub visibility: String,
}

impl DataField {
    pub fn text(item: String, label: &str, value: &str, visibility: &str) -> Self {
        DataField {
            item,
            kind: "text".into(),
            label: label.to_string(),
            value: value.to_string(),
            visibility: visibility.to_string(),
        }
    }
}

/// The operations the publisher needs from the remote service.
pub trait CollectionApi {
    /// Exchange credentials for a bearer token.
    fn authenticate(&mut self, credentials: &Credentials) -> Result<String>;

    /// Create one resource and return its identifier.
    fn create(&mut self, token: &str, kind: ResourceKind, payload: &Value) -> Result<String>;

    /// Attach a named field and return the field's identifier.
    fn attach_field(&mut self, token: &str, field: &DataField) -> Result<String>;

    fn upload_image(&mut self, token: &str, kind: ResourceKind, id: &str, path: &Path) -> Result<()>;
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: Option<Value>,
}

/// Blocking client bound to one API base URL.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("card-publisher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The underlying HTTP client, shared with the image fetcher.
    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Authentication("token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// POST `body` as JSON with the bearer token and return the created id.
    fn post_created<T: Serialize + ?Sized>(&self, action: &str, token: &str, path: &str, body: &T) -> Result<String> {
        let res = self
            .client
            .post(self.url(path))
            .headers(Self::auth_headers(token)?)
            .json(body)
            .send()
            .map_err(|e| Error::from_reqwest(action, e))?;
        let res = check_status(action, res)?;
        let created: CreatedResponse = res.json().map_err(|e| Error::from_reqwest(action, e))?;
        identifier(created.id).ok_or_else(|| Error::transport(action, None, "response did not include an id"))
    }
}

impl CollectionApi for ApiClient {
    fn authenticate(&mut self, credentials: &Credentials) -> Result<String> {
        let action = "authenticate";
        let req = AuthRequest {
            username: &credentials.username,
            password: &credentials.password,
        };
        let res = self
            .client
            .post(self.url(AUTH_PATH))
            .json(&req)
            .send()
            .map_err(|e| Error::from_reqwest(action, e))?;
        let res = check_status(action, res)?;
        let body: AuthResponse = res.json().map_err(|e| Error::from_reqwest(action, e))?;
        body.token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::transport(action, None, "response did not include a token"))
    }

    fn create(&mut self, token: &str, kind: ResourceKind, payload: &Value) -> Result<String> {
        let action = format!("create {}", kind.label());
        self.post_created(&action, token, kind.collection_path(), payload)
    }

    fn attach_field(&mut self, token: &str, field: &DataField) -> Result<String> {
        let action = format!("attach {}", field.label);
        self.post_created(&action, token, DATA_PATH, field)
    }

    fn upload_image(&mut self, token: &str, kind: ResourceKind, id: &str, path: &Path) -> Result<()> {
        let action = "upload image";
        let file = File::open(path)?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image.jpg")
            .to_string();

        let part = multipart::Part::reader(file)
            .file_name(file_name)
            .mime_str(mime_for(path))
            .map_err(|e| Error::from_reqwest(action, e))?;
        let form = multipart::Form::new().part("file", part);

        let res = self
            .client
            .post(self.url(&kind.image_path(id)))
            .headers(Self::auth_headers(token)?)
            .multipart(form)
            .send()
            .map_err(|e| Error::from_reqwest(action, e))?;
        check_status(action, res)?;
        Ok(())
    }
}

/// Turn a non-success response into a transport error carrying the
/// best diagnostic the body offers.
fn check_status(action: &str, res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().unwrap_or_default();
    let reason = status.canonical_reason().unwrap_or("request failed");
    Err(Error::transport(action, Some(status.as_u16()), diagnostic(&body, reason)))
}

/// Pick a human readable message out of an error body.
pub fn diagnostic(body: &str, fallback: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for key in ["hydra:description", "detail", "message", "title"] {
            if let Some(msg) = json.get(key).and_then(Value::as_str).filter(|m| !m.trim().is_empty()) {
                return msg.trim().to_string();
            }
        }
    }
    let text = body.trim();
    if text.is_empty() {
        return fallback.to_string();
    }
    match text.char_indices().nth(MAX_DIAGNOSTIC_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Identifiers come back as strings (UUIDs) or numbers.
fn identifier(id: Option<Value>) -> Option<String> {
    match id? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{serve, Canned};
    use serde_json::json;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "alice".into(),
            password: "wonderland".into(),
        }
    }

    #[test]
    fn authenticate_posts_credentials_and_returns_token() {
        let (base, server) = serve(vec![Canned::json(200, r#"{"token":"abc"}"#)]);
        let token = client(&base).authenticate(&credentials()).unwrap();
        assert_eq!(token, "abc");

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /api/authentication_token "));
        assert!(requests[0].contains(r#""username":"alice""#));
    }

    #[test]
    fn rejected_credentials_are_a_401_transport_error() {
        let (base, server) = serve(vec![Canned::json(401, r#"{"code":401,"message":"Invalid credentials."}"#)]);
        let err = client(&base).authenticate(&credentials()).unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("Invalid credentials."));
        server.join().unwrap();
    }

    #[test]
    fn create_sends_bearer_and_maps_401() {
        let (base, server) = serve(vec![
            Canned::json(401, r#"{"code":401,"message":"Expired token"}"#),
            Canned::json(201, r#"{"@id":"/api/items/7","id":7}"#),
        ]);
        let mut api = client(&base);
        let payload = json!({"name": "Flower", "collection": "/api/collections/x", "visibility": "public"});

        let err = api.create("jwt", ResourceKind::Item, &payload).unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "create item failed (401): Expired token");

        let id = api.create("jwt", ResourceKind::Item, &payload).unwrap();
        assert_eq!(id, "7");

        let requests = server.join().unwrap();
        for request in &requests {
            assert!(request.starts_with("POST /api/items "));
            assert!(request.to_ascii_lowercase().contains("authorization: bearer jwt"));
        }
        assert!(requests[1].contains(r#""name":"Flower""#));
    }

    #[test]
    fn created_response_without_id_is_an_error() {
        let (base, server) = serve(vec![Canned::json(201, r#"{"@id":"/api/data/1"}"#)]);
        let field = DataField::text(ResourceKind::Item.iri("7"), "Rarity", "SR", "public");
        let err = client(&base).attach_field("jwt", &field).unwrap_err();
        assert!(matches!(err, Error::Transport { status: None, .. }));

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /api/data "));
        assert!(requests[0].contains(r#""type":"text""#));
    }

    #[test]
    fn upload_sends_multipart_file_part() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Pikachu.png");
        std::fs::write(&path, b"PNGDATA").unwrap();

        let (base, server) = serve(vec![Canned::json(201, "{}")]);
        client(&base)
            .upload_image("jwt", ResourceKind::Item, "42", &path)
            .unwrap();

        let requests = server.join().unwrap();
        let request = &requests[0];
        assert!(request.starts_with("POST /api/items/42/image "));
        assert!(request.to_ascii_lowercase().contains("multipart/form-data; boundary="));
        assert!(request.contains(r#"name="file""#));
        assert!(request.contains(r#"filename="Pikachu.png""#));
        assert!(request.to_ascii_lowercase().contains("content-type: image/png"));
        assert!(request.contains("PNGDATA"));
    }

    #[test]
    fn diagnostic_prefers_structured_messages() {
        let body = r#"{"@type":"hydra:Error","hydra:description":"name: This value should not be blank."}"#;
        assert_eq!(diagnostic(body, "Unprocessable Entity"), "name: This value should not be blank.");

        let body = r#"{"code":401,"message":"Invalid credentials."}"#;
        assert_eq!(diagnostic(body, "Unauthorized"), "Invalid credentials.");
    }

    #[test]
    fn diagnostic_falls_back_to_body_then_reason() {
        assert_eq!(diagnostic("  Bad Gateway from proxy \n", "Bad Gateway"), "Bad Gateway from proxy");
        assert_eq!(diagnostic("", "Internal Server Error"), "Internal Server Error");
        assert_eq!(diagnostic(r#"{"unrelated":true}"#, "x"), r#"{"unrelated":true}"#);

        let long = "e".repeat(1000);
        let msg = diagnostic(&long, "x");
        assert_eq!(msg.len(), MAX_DIAGNOSTIC_LEN + 3);
        assert!(msg.ends_with("..."));
    }

    #[test]
    fn identifiers_accept_strings_and_numbers() {
        assert_eq!(identifier(Some(json!("0190f3c2"))), Some("0190f3c2".into()));
        assert_eq!(identifier(Some(json!(42))), Some("42".into()));
        assert_eq!(identifier(Some(json!(""))), None);
        assert_eq!(identifier(Some(Value::Null)), None);
        assert_eq!(identifier(None), None);
    }

    #[test]
    fn resource_paths() {
        assert_eq!(ResourceKind::Item.iri("abc"), "/api/items/abc");
        assert_eq!(ResourceKind::Wish.image_path("abc"), "/api/wishes/abc/image");
    }

    #[test]
    fn data_field_serializes_type_key() {
        let field = DataField::text(ResourceKind::Item.iri("7"), "Rarity", "SR", "public");
        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(
            value,
            json!({"item": "/api/items/7", "type": "text", "label": "Rarity", "value": "SR", "visibility": "public"})
        );
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for(Path::new("image/Mew.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("image/Mew.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("image/Mew")), "application/octet-stream");
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = ApiClient::new("https://collect.example/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://collect.example");
        assert_eq!(client.url(AUTH_PATH), "https://collect.example/api/authentication_token");
    }
}
