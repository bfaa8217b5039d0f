//! In-process backend.
//!
//! Implements the same filter, ordering, range and count semantics as the
//! hosted service over plain JSON rows. Used by tests and by the CLI's
//! `--memory` mode.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::backend::{
    AuthBackend, AuthUser, Backend, Credentials, SelectQuery, Selection, Session, SignUp,
    StorageBackend,
};
use crate::keys::Entity;
use crate::types::{Filter, FilterOp, OrderDirection};
use crate::{HuginnError, Result};

struct Account {
    password: String,
    user: AuthUser,
}

#[derive(Default)]
struct State {
    tables: HashMap<Entity, Vec<Value>>,
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    objects: HashMap<(String, String), Vec<u8>>,
}

/// In-memory tables, accounts and objects.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn generate_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, AtomicOrdering::Relaxed) + 1;
        format!("{prefix}-{n}")
    }

    /// Insert rows verbatim (no id generation).
    pub fn seed(&self, table: Entity, rows: impl IntoIterator<Item = Value>) {
        self.state()
            .tables
            .entry(table)
            .or_default()
            .extend(rows);
    }

    /// Snapshot of every row in a table.
    pub fn rows(&self, table: Entity) -> Vec<Value> {
        self.state().tables.get(&table).cloned().unwrap_or_default()
    }

    /// Whether an object exists in storage.
    pub fn has_object(&self, bucket: &str, path: &str) -> bool {
        self.state()
            .objects
            .contains_key(&(bucket.to_string(), path.to_string()))
    }
}

// ============================================================================
// Filter evaluation
// ============================================================================

fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (as_datetime(a), as_datetime(b)) {
            (Some(dx), Some(dy)) => Some(dx.cmp(&dy)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}

/// SQL `ILIKE` with `%` wildcards.
fn like(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }

    let last = parts.len() - 1;
    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            return text.len() >= pos + part.len() && text.ends_with(part);
        } else {
            match text[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }
    true
}

fn matches(row: &Value, filter: &Filter) -> bool {
    let field = row.get(&filter.column).unwrap_or(&Value::Null);
    let ord = || compare(field, &filter.value);
    match filter.op {
        FilterOp::Eq => loose_eq(field, &filter.value),
        FilterOp::Neq => !loose_eq(field, &filter.value),
        FilterOp::Gt => ord() == Some(Ordering::Greater),
        FilterOp::Gte => matches!(ord(), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => ord() == Some(Ordering::Less),
        FilterOp::Lte => matches!(ord(), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Ilike => match (field.as_str(), filter.value.as_str()) {
            (Some(text), Some(pattern)) => like(text, pattern),
            _ => false,
        },
        FilterOp::Is => field.is_null() == filter.value.as_bool().unwrap_or(true),
        FilterOp::In => filter
            .value
            .as_array()
            .is_some_and(|values| values.iter().any(|v| loose_eq(field, v))),
    }
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(row, f))
}

/// Order rows by `column`, nulls last regardless of direction.
fn sort_rows(rows: &mut [Value], column: &str, direction: OrderDirection) {
    rows.sort_by(|a, b| {
        let x = a.get(column).unwrap_or(&Value::Null);
        let y = b.get(column).unwrap_or(&Value::Null);
        match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = compare(x, y).unwrap_or(Ordering::Equal);
                match direction {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                }
            }
        }
    });
}

fn merge(row: &mut Value, patch: &Value) {
    if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
        for (k, v) in fields {
            target.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn select(&self, table: Entity, query: &SelectQuery) -> Result<Selection> {
        let mut rows: Vec<Value> = self
            .state()
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((column, direction)) = &query.order {
            sort_rows(&mut rows, column, *direction);
        }
        let total = rows.len() as u64;
        if let Some((offset, limit)) = query.range {
            rows = rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
        }

        Ok(Selection {
            rows,
            count: query.count.then_some(total),
        })
    }

    async fn insert(&self, table: Entity, row: Value) -> Result<Value> {
        let Value::Object(mut fields) = row else {
            return Err(HuginnError::Api {
                status: 400,
                code: None,
                message: format!("insert into {table} expects an object"),
            });
        };
        if !fields.contains_key("id") {
            fields.insert("id".into(), Value::String(self.generate_id(table.as_str())));
        }
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let row = Value::Object(fields);
        self.state()
            .tables
            .entry(table)
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: Entity, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        let mut state = self.state();
        let Some(rows) = state.tables.get_mut(&table) else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| matches_all(row, filters)) {
            merge(row, &patch);
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: Entity, filters: &[Filter]) -> Result<u64> {
        let mut state = self.state();
        let Some(rows) = state.tables.get_mut(&table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !matches_all(row, filters));
        Ok((before - rows.len()) as u64)
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_up(&self, credentials: &Credentials, metadata: Value) -> Result<SignUp> {
        let email = credentials.email.trim().to_lowercase();
        if self.state().accounts.contains_key(&email) {
            return Err(HuginnError::Api {
                status: 422,
                code: Some("user_already_exists".into()),
                message: "User already registered".into(),
            });
        }

        let user = AuthUser {
            id: self.generate_id("user"),
            email: Some(email.clone()),
            user_metadata: metadata.clone(),
        };
        let token = self.generate_id("token");
        {
            let mut state = self.state();
            state.accounts.insert(
                email.clone(),
                Account {
                    password: credentials.password.clone(),
                    user: user.clone(),
                },
            );
            state.tokens.insert(token.clone(), email.clone());
        }

        // Mirrors the database trigger that creates a profile for each account.
        let mut profile = Map::new();
        profile.insert("id".into(), json!(user.id));
        profile.insert("email".into(), json!(email));
        profile.insert("name".into(), metadata.get("name").cloned().unwrap_or(Value::Null));
        profile.insert("role".into(), json!("user"));
        self.insert(Entity::Profiles, Value::Object(profile)).await?;

        Ok(SignUp {
            session: Some(Session {
                access_token: token,
                refresh_token: None,
                expires_in: Some(3600),
                user: user.clone(),
            }),
            user,
        })
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let email = credentials.email.trim().to_lowercase();
        let user = {
            let state = self.state();
            match state.accounts.get(&email) {
                Some(account) if account.password == credentials.password => account.user.clone(),
                _ => {
                    return Err(HuginnError::Unauthorized(
                        "invalid login credentials".into(),
                    ));
                }
            }
        };
        let token = self.generate_id("token");
        self.state().tokens.insert(token.clone(), email);
        Ok(Session {
            access_token: token,
            refresh_token: None,
            expires_in: Some(3600),
            user,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.state().tokens.remove(access_token);
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<AuthUser> {
        let state = self.state();
        state
            .tokens
            .get(access_token)
            .and_then(|email| state.accounts.get(email))
            .map(|account| account.user.clone())
            .ok_or_else(|| HuginnError::Unauthorized("invalid or expired session".into()))
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
        upsert: bool,
    ) -> Result<String> {
        let key = (bucket.to_string(), path.to_string());
        let mut state = self.state();
        if !upsert && state.objects.contains_key(&key) {
            return Err(HuginnError::Api {
                status: 409,
                code: Some("Duplicate".into()),
                message: format!("object {bucket}/{path} already exists"),
            });
        }
        state.objects.insert(key, bytes);
        Ok(path.to_string())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        let mut state = self.state();
        for path in paths {
            state.objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{}", path.trim_start_matches('/'))
    }
}
