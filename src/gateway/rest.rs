//! HTTP backend for a hosted PostgREST-style database service.
//!
//! Table access goes through `/rest/v1/{table}`, accounts through
//! `/auth/v1/*` and objects through `/storage/v1/object/*`. Every request
//! carries the project's `apikey`; after sign-in the user's access token
//! replaces the key as the bearer credential.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::backend::{
    AuthBackend, AuthUser, Backend, Credentials, SelectQuery, Selection, Session, SignUp,
    StorageBackend,
};
use crate::keys::Entity;
use crate::types::{Filter, FilterOp};
use crate::{HuginnError, Result};

/// PostgREST error code for "no rows returned" on single-row requests.
const NO_ROWS_CODE: &str = "PGRST116";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP backend for the hosted database, auth and storage APIs.
pub struct RestBackend {
    base_url: String,
    api_key: String,
    http: Client,
    access_token: RwLock<Option<String>>,
}

impl RestBackend {
    /// Create a backend for the project at `base_url`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
            access_token: RwLock::new(None),
        })
    }

    fn bearer(&self) -> String {
        let token = match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        token.unwrap_or_else(|| self.api_key.clone())
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
    }

    fn table_url(&self, table: Entity) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    /// Send a request. `id` names the row a failed request targeted, if any.
    async fn send(
        &self,
        builder: RequestBuilder,
        resource: &str,
        id: Option<&str>,
    ) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response, resource, id).await)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "msg", alias = "error_description", alias = "error")]
    message: Option<String>,
}

/// Map a non-2xx response to a [`HuginnError`].
///
/// "No rows" becomes [`HuginnError::NotFound`] only when the request targeted
/// a known id; otherwise it stays an [`HuginnError::Api`] error.
async fn error_from_response(response: Response, resource: &str, id: Option<&str>) -> HuginnError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body.message.unwrap_or_else(|| {
        if text.is_empty() {
            format!("HTTP {status}")
        } else {
            text.clone()
        }
    });

    let no_rows = body.code.as_deref() == Some(NO_ROWS_CODE) || status == 404;
    if let (true, Some(id)) = (no_rows, id) {
        return HuginnError::not_found(resource, id);
    }
    match status {
        401 | 403 => HuginnError::Unauthorized(message),
        _ => HuginnError::Api {
            status,
            code: body.code,
            message,
        },
    }
}

/// The id an `id = value` filter pins a request to.
fn requested_id(filters: &[Filter]) -> Option<&str> {
    filters
        .iter()
        .find(|f| f.column == "id" && f.op == FilterOp::Eq)
        .and_then(|f| f.value.as_str())
}

/// Render a filter value in PostgREST query syntax.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Render one filter as a `(column, "op.value")` query pair.
fn render_filter(filter: &Filter) -> (String, String) {
    let rendered = match filter.op {
        FilterOp::In => {
            let items: Vec<String> = filter
                .value
                .as_array()
                .map(|values| values.iter().map(render_value).collect())
                .unwrap_or_default();
            format!("in.({})", items.join(","))
        }
        FilterOp::Is => {
            let null = filter.value.as_bool().unwrap_or(true);
            if null {
                "is.null".to_string()
            } else {
                "not.is.null".to_string()
            }
        }
        FilterOp::Ilike => format!("ilike.{}", render_value(&filter.value).replace('%', "*")),
        op => format!("{}.{}", op.as_str(), render_value(&filter.value)),
    };
    (filter.column.clone(), rendered)
}

fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(render_filter).collect()
}

/// Parse the total from a `Content-Range: 0-9/25` header.
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit('/').next().and_then(|total| total.parse().ok())
}

#[async_trait]
impl Backend for RestBackend {
    fn name(&self) -> &str {
        "rest"
    }

    async fn select(&self, table: Entity, query: &SelectQuery) -> Result<Selection> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_pairs(&query.filters));
        if let Some((column, direction)) = &query.order {
            params.push(("order".into(), format!("{column}.{}", direction.as_str())));
        }
        if let Some((offset, limit)) = query.range {
            params.push(("offset".into(), offset.to_string()));
            params.push(("limit".into(), limit.to_string()));
        }

        debug!(table = table.as_str(), ?params, "select");
        let mut request = self.authed(self.http.get(self.table_url(table))).query(&params);
        if query.count {
            request = request.header("Prefer", "count=exact");
        }
        let response = self
            .send(request, table.resource(), requested_id(&query.filters))
            .await?;

        let count = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;
        Ok(Selection { rows, count })
    }

    async fn insert(&self, table: Entity, row: Value) -> Result<Value> {
        let request = self
            .authed(self.http.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(&row);
        let response = self.send(request, table.resource(), None).await?;
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;
        rows.into_iter().next().ok_or_else(|| HuginnError::Api {
            status: 200,
            code: None,
            message: format!("insert into {table} returned no row"),
        })
    }

    async fn update(&self, table: Entity, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        let request = self
            .authed(self.http.patch(self.table_url(table)))
            .query(&filter_pairs(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        let response = self
            .send(request, table.resource(), requested_id(filters))
            .await?;
        response
            .json()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))
    }

    async fn delete(&self, table: Entity, filters: &[Filter]) -> Result<u64> {
        let request = self
            .authed(self.http.delete(self.table_url(table)))
            .query(&filter_pairs(filters))
            .header("Prefer", "return=representation");
        let response = self
            .send(request, table.resource(), requested_id(filters))
            .await?;
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;
        Ok(rows.len() as u64)
    }

    fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }
}

#[derive(Deserialize)]
struct SignUpBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    user: Option<AuthUser>,
    // Without auto-confirm the service returns the bare user object.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[async_trait]
impl AuthBackend for RestBackend {
    async fn sign_up(&self, credentials: &Credentials, metadata: Value) -> Result<SignUp> {
        let url = format!("{}/auth/v1/signup", self.base_url);
        let request = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&json!({
                "email": credentials.email,
                "password": credentials.password,
                "data": metadata,
            }));
        let response = self.send(request, "user", None).await?;
        let body: SignUpBody = response
            .json()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;

        let user = match (body.user, body.id) {
            (Some(user), _) => user,
            (None, Some(id)) => AuthUser {
                id,
                email: body.email,
                user_metadata: metadata,
            },
            (None, None) => {
                return Err(HuginnError::Api {
                    status: 200,
                    code: None,
                    message: "sign-up response carried no user".into(),
                });
            }
        };
        let session = body.access_token.map(|access_token| Session {
            access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
            user: user.clone(),
        });
        Ok(SignUp { user, session })
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let url = format!("{}/auth/v1/token", self.base_url);
        let request = self
            .http
            .post(url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&json!({
                "email": credentials.email,
                "password": credentials.password,
            }));
        let response = match self.send(request, "user", None).await {
            // The token endpoint reports bad credentials as 400.
            Err(HuginnError::Api {
                status: 400,
                message,
                ..
            }) => return Err(HuginnError::Unauthorized(message)),
            other => other?,
        };
        response
            .json()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = format!("{}/auth/v1/logout", self.base_url);
        let request = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {access_token}"));
        self.send(request, "session", None).await?;
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<AuthUser> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let request = self
            .http
            .get(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {access_token}"));
        let response = self.send(request, "user", None).await?;
        response
            .json()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))
    }
}

#[async_trait]
impl StorageBackend for RestBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<String> {
        let url = format!("{}/storage/v1/object/{bucket}/{path}", self.base_url);
        let request = self
            .authed(self.http.post(url))
            .header("Content-Type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes);
        self.send(request, "object", None).await?;
        Ok(path.to_string())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        let url = format!("{}/storage/v1/object/{bucket}", self.base_url);
        let request = self
            .authed(self.http.delete(url))
            .json(&json!({ "prefixes": paths }));
        self.send(request, "object", None).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket}/{}",
            self.base_url,
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_filters_in_postgrest_syntax() {
        assert_eq!(
            render_filter(&Filter::eq("status", "active")),
            ("status".into(), "eq.active".into())
        );
        assert_eq!(
            render_filter(&Filter::eq("is_featured", true)).1,
            "eq.true"
        );
        assert_eq!(render_filter(&Filter::contains("title", "rust")).1, "ilike.*rust*");
        assert_eq!(render_filter(&Filter::is_null("user_id", true)).1, "is.null");
        assert_eq!(
            render_filter(&Filter::in_list("id", vec!["a".into(), "b".into()])).1,
            "in.(a,b)"
        );
    }

    #[test]
    fn requested_id_comes_from_an_id_equality_filter() {
        let filters = vec![Filter::eq("status", "active"), Filter::eq("id", "e7")];
        assert_eq!(requested_id(&filters), Some("e7"));
        assert_eq!(requested_id(&[Filter::neq("id", "e7")]), None);
        assert_eq!(requested_id(&[]), None);
    }

    #[test]
    fn parses_content_range_total() {
        assert_eq!(parse_content_range("0-9/25"), Some(25));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-9/*"), None);
    }

    #[test]
    fn public_url_layout() {
        let backend = RestBackend::new("https://db.example.com/", "anon").unwrap();
        assert_eq!(
            backend.public_url("events", "/covers/a.png"),
            "https://db.example.com/storage/v1/object/public/events/covers/a.png"
        );
    }
}
