use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::RemoteError;

const CONTENT_EXPAND: &str =
    "body.storage,body.view,version,space,ancestors,metadata.labels,children.attachment";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub space_key: String,
    pub parent_id: Option<String>,
    pub version: u64,
    /// Storage-format markup.
    pub content: String,
    /// Rendered HTML, when the service returned it.
    pub view_content: Option<String>,
    pub url: String,
    pub last_updated: String,
    pub last_updated_by: String,
    pub labels: Vec<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    pub title: String,
    pub space_key: String,
    pub content: String,
    pub parent_id: Option<String>,
}

/// Page operations offered by the remote content service.
pub trait ContentApi {
    fn create_page(&mut self, page: &NewPage) -> Result<Page, RemoteError>;
    fn read_page(&mut self, page_id: &str) -> Result<Page, RemoteError>;
    /// `next_version` must be the page's current version plus one. A `None` title keeps
    /// the current title.
    fn update_page(
        &mut self,
        page_id: &str,
        next_version: u64,
        content: &str,
        title: Option<&str>,
    ) -> Result<Page, RemoteError>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Read,
    Update,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create page",
            Self::Read => "read page",
            Self::Update => "update page",
        }
    }
}

pub struct ConfluenceClient {
    client: Client,
    base_url: String,
    token: String,
    user_agent: String,
    request_count: usize,
}

impl ConfluenceClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build content service HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            user_agent: config.user_agent.clone(),
            request_count: 0,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn content_url(&self, page_id: Option<&str>) -> String {
        match page_id {
            Some(page_id) => format!("{}/rest/api/content/{page_id}", self.base_url),
            None => format!("{}/rest/api/content", self.base_url),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("User-Agent", self.user_agent.clone())
            .header("Accept", "application/json")
    }

    fn send(
        &mut self,
        request: RequestBuilder,
        operation: Operation,
        target: &str,
        requested_version: Option<u64>,
    ) -> Result<Page, RemoteError> {
        self.request_count += 1;
        debug!(operation = operation.as_str(), target, "sending content request");

        let response = request
            .send()
            .map_err(|error| RemoteError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response);
            return Err(classify_status(
                status,
                operation,
                target,
                requested_version,
                detail,
            ));
        }

        let payload: Value = response
            .json()
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        parse_page(&payload, &self.base_url)
    }
}

impl ContentApi for ConfluenceClient {
    fn create_page(&mut self, page: &NewPage) -> Result<Page, RemoteError> {
        let request = self
            .authorized(self.client.post(self.content_url(None)))
            .json(&create_body(page));
        self.send(request, Operation::Create, &page.title, None)
    }

    fn read_page(&mut self, page_id: &str) -> Result<Page, RemoteError> {
        let request = self
            .authorized(self.client.get(self.content_url(Some(page_id))))
            .query(&[("expand", CONTENT_EXPAND)]);
        self.send(request, Operation::Read, page_id, None)
    }

    fn update_page(
        &mut self,
        page_id: &str,
        next_version: u64,
        content: &str,
        title: Option<&str>,
    ) -> Result<Page, RemoteError> {
        let title = match title {
            Some(title) => title.to_string(),
            None => self.read_page(page_id)?.title,
        };
        let request = self
            .authorized(self.client.put(self.content_url(Some(page_id))))
            .json(&update_body(next_version, &title, content));
        self.send(request, Operation::Update, page_id, Some(next_version))
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

pub fn page_url(base_url: &str, page_id: &str) -> String {
    format!(
        "{}/pages/viewpage.action?pageId={page_id}",
        base_url.trim_end_matches('/')
    )
}

fn create_body(page: &NewPage) -> Value {
    let mut body = json!({
        "type": "page",
        "title": page.title,
        "space": { "key": page.space_key },
        "status": "current",
        "body": {
            "storage": {
                "value": page.content,
                "representation": "storage",
            }
        },
    });
    if let Some(parent_id) = page.parent_id.as_deref().filter(|id| !id.trim().is_empty()) {
        body["ancestors"] = json!([{ "id": parent_id }]);
    }
    body
}

fn update_body(next_version: u64, title: &str, content: &str) -> Value {
    json!({
        "version": { "number": next_version },
        "title": title,
        "type": "page",
        "body": {
            "storage": {
                "value": content,
                "representation": "storage",
            }
        },
    })
}

fn error_detail(response: Response) -> String {
    let text = response.text().unwrap_or_default();
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|payload| {
            payload
                .get("message")
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or(text)
}

fn classify_status(
    status: StatusCode,
    operation: Operation,
    target: &str,
    requested_version: Option<u64>,
    detail: String,
) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Auth,
        StatusCode::FORBIDDEN => RemoteError::Permission {
            operation: operation.as_str(),
        },
        StatusCode::NOT_FOUND => RemoteError::NotFound {
            target: target.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        StatusCode::BAD_REQUEST => RemoteError::Validation { detail },
        StatusCode::CONFLICT => match (operation, requested_version) {
            (Operation::Update, Some(requested)) => RemoteError::VersionConflict {
                page_id: target.to_string(),
                requested,
            },
            _ => RemoteError::Conflict { detail },
        },
        other => RemoteError::Http {
            status: other.as_u16(),
        },
    }
}

fn parse_page(payload: &Value, base_url: &str) -> Result<Page, RemoteError> {
    let raw = RawContent::deserialize(payload)
        .map_err(|error| RemoteError::Decode(error.to_string()))?;

    let id = id_string(&raw.id).ok_or_else(|| {
        RemoteError::Decode(format!("unexpected page id in response: {}", raw.id))
    })?;
    let version = raw.version.unwrap_or_default();
    let body = raw.body.unwrap_or_default();

    Ok(Page {
        url: page_url(base_url, &id),
        title: raw.title,
        space_key: raw.space.map(|space| space.key).unwrap_or_default(),
        parent_id: raw
            .ancestors
            .last()
            .and_then(|ancestor| id_string(&ancestor.id)),
        version: version.number,
        content: body.storage.map(|storage| storage.value).unwrap_or_default(),
        view_content: body.view.map(|view| view.value),
        last_updated: version.when.unwrap_or_default(),
        last_updated_by: version
            .by
            .and_then(|by| by.display_name)
            .unwrap_or_default(),
        labels: raw
            .metadata
            .and_then(|metadata| metadata.labels)
            .map(|labels| labels.results.into_iter().map(|label| label.name).collect())
            .unwrap_or_default(),
        attachments: raw
            .children
            .and_then(|children| children.attachment)
            .map(|attachments| {
                attachments
                    .results
                    .into_iter()
                    .map(|item| Attachment {
                        filename: item.title,
                        size: item
                            .extensions
                            .and_then(|extensions| extensions.file_size)
                            .unwrap_or(0),
                        url: format!(
                            "{}{}",
                            base_url.trim_end_matches('/'),
                            item.links.and_then(|links| links.download).unwrap_or_default()
                        ),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        id,
    })
}

// Ids arrive as strings from the REST API but as numbers from some proxies.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(value) if !value.trim().is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RawContent {
    id: Value,
    #[serde(default)]
    title: String,
    space: Option<RawSpace>,
    version: Option<RawVersion>,
    body: Option<RawBody>,
    #[serde(default)]
    ancestors: Vec<RawAncestor>,
    metadata: Option<RawMetadata>,
    children: Option<RawChildren>,
}

#[derive(Debug, Deserialize)]
struct RawSpace {
    key: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawVersion {
    #[serde(default)]
    number: u64,
    when: Option<String>,
    by: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawBody {
    storage: Option<RawBodyValue>,
    view: Option<RawBodyValue>,
}

#[derive(Debug, Deserialize)]
struct RawBodyValue {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawAncestor {
    id: Value,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    labels: Option<RawResults<RawLabel>>,
}

#[derive(Debug, Deserialize)]
struct RawChildren {
    attachment: Option<RawResults<RawAttachment>>,
}

#[derive(Debug, Deserialize)]
struct RawResults<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    #[serde(default)]
    title: String,
    extensions: Option<RawAttachmentExtensions>,
    #[serde(rename = "_links")]
    links: Option<RawLinks>,
}

#[derive(Debug, Deserialize)]
struct RawAttachmentExtensions {
    #[serde(rename = "fileSize")]
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawLinks {
    download: Option<String>,
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use super::{
        NewPage, Operation, classify_status, create_body, page_url, parse_page, update_body,
    };
    use crate::error::RemoteError;

    #[test]
    fn create_body_includes_ancestor_only_when_parent_is_set() {
        let mut page = NewPage {
            title: "Release notes".to_string(),
            space_key: "~ht".to_string(),
            content: "<p>hi</p>".to_string(),
            parent_id: None,
        };
        let body = create_body(&page);
        assert_eq!(body["space"]["key"], "~ht");
        assert_eq!(body["body"]["storage"]["representation"], "storage");
        assert!(body.get("ancestors").is_none());

        page.parent_id = Some("217851921".to_string());
        let body = create_body(&page);
        assert_eq!(body["ancestors"][0]["id"], "217851921");
    }

    #[test]
    fn update_body_names_the_next_version() {
        let body = update_body(7, "Title", "<p>x</p>");
        assert_eq!(body["version"]["number"], 7);
        assert_eq!(body["title"], "Title");
        assert_eq!(body["body"]["storage"]["value"], "<p>x</p>");
    }

    #[test]
    fn status_codes_map_to_remote_errors() {
        assert_eq!(
            classify_status(
                StatusCode::UNAUTHORIZED,
                Operation::Read,
                "1",
                None,
                String::new()
            ),
            RemoteError::Auth
        );
        assert_eq!(
            classify_status(
                StatusCode::NOT_FOUND,
                Operation::Read,
                "123",
                None,
                String::new()
            ),
            RemoteError::NotFound {
                target: "123".to_string()
            }
        );
        assert_eq!(
            classify_status(
                StatusCode::CONFLICT,
                Operation::Update,
                "123",
                Some(4),
                String::new()
            ),
            RemoteError::VersionConflict {
                page_id: "123".to_string(),
                requested: 4
            }
        );
        assert_eq!(
            classify_status(
                StatusCode::CONFLICT,
                Operation::Create,
                "Title",
                None,
                "exists".to_string()
            ),
            RemoteError::Conflict {
                detail: "exists".to_string()
            }
        );
        assert_eq!(
            classify_status(
                StatusCode::TOO_MANY_REQUESTS,
                Operation::Update,
                "1",
                Some(2),
                String::new()
            ),
            RemoteError::RateLimited
        );
        assert_eq!(
            classify_status(
                StatusCode::BAD_GATEWAY,
                Operation::Create,
                "t",
                None,
                String::new()
            ),
            RemoteError::Http { status: 502 }
        );
    }

    #[test]
    fn parse_page_reads_expanded_content() {
        let payload = json!({
            "id": "4242",
            "title": "Runbook",
            "space": { "key": "OPS" },
            "version": {
                "number": 3,
                "when": "2026-01-02T03:04:05.000Z",
                "by": { "displayName": "Dana" }
            },
            "body": {
                "storage": { "value": "<p>stored</p>" },
                "view": { "value": "<p>rendered</p>" }
            },
            "ancestors": [{ "id": "1" }, { "id": "99" }],
            "metadata": { "labels": { "results": [{ "name": "ops" }, { "name": "draft" }] } },
            "children": {
                "attachment": {
                    "results": [{
                        "title": "diagram.png",
                        "extensions": { "fileSize": 2048 },
                        "_links": { "download": "/download/attachments/4242/diagram.png" }
                    }]
                }
            }
        });

        let page = parse_page(&payload, "https://wiki.example.com/").expect("parse");
        assert_eq!(page.id, "4242");
        assert_eq!(page.space_key, "OPS");
        assert_eq!(page.parent_id.as_deref(), Some("99"));
        assert_eq!(page.version, 3);
        assert_eq!(page.content, "<p>stored</p>");
        assert_eq!(page.view_content.as_deref(), Some("<p>rendered</p>"));
        assert_eq!(page.last_updated_by, "Dana");
        assert_eq!(page.labels, vec!["ops", "draft"]);
        assert_eq!(page.attachments.len(), 1);
        assert_eq!(
            page.attachments[0].url,
            "https://wiki.example.com/download/attachments/4242/diagram.png"
        );
        assert_eq!(
            page.url,
            "https://wiki.example.com/pages/viewpage.action?pageId=4242"
        );
    }

    #[test]
    fn parse_page_tolerates_minimal_payload() {
        let page = parse_page(&json!({ "id": 17, "title": "Bare" }), "https://w").expect("parse");
        assert_eq!(page.id, "17");
        assert_eq!(page.version, 0);
        assert!(page.content.is_empty());
        assert!(page.labels.is_empty());
    }

    #[test]
    fn parse_page_rejects_missing_id() {
        let error = parse_page(&json!({ "title": "No id" }), "https://w").expect_err("must fail");
        assert!(matches!(error, RemoteError::Decode(_)));
    }

    #[test]
    fn page_url_strips_trailing_slash() {
        assert_eq!(
            page_url("https://wiki.example.com/", "5"),
            "https://wiki.example.com/pages/viewpage.action?pageId=5"
        );
    }
}
