// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! An in-process stand-in for the hosted backend: the identity endpoints and
//! the `beats` table, enough to exercise the real HTTP clients.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::{net::TcpListener, task::JoinHandle};

use crate::backend::Backend;

pub const API_KEY: &str = "test-anon-key";

#[derive(Clone, Debug)]
struct FakeUser {
    id: String,
    email: String,
    password: String,
    confirmed: bool,
}

impl FakeUser {
    fn json(&self) -> Value {
        json!({ "id": self.id, "email": self.email, "aud": "authenticated" })
    }
}

#[derive(Default)]
struct FakeState {
    users: Vec<FakeUser>,
    /// Access token to user id.
    tokens: HashMap<String, String>,
    beats: Vec<Value>,
    counter: u64,
    reset_requests: Vec<(String, Option<String>)>,
    failing_deletes: HashSet<String>,
    require_confirmation: bool,
}

impl FakeState {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    /// Timestamps sort in creation order.
    fn timestamp(&mut self) -> String {
        let n = self.next();
        format!(
            "2026-10-16T{:02}:{:02}:{:02}+00:00",
            n / 3600,
            (n / 60) % 60,
            n % 60
        )
    }

    fn issue_token(&mut self, user_id: &str) -> String {
        let token = format!("token-{}", self.next());
        self.tokens.insert(token.clone(), user_id.to_string());
        token
    }

    fn session(&mut self, user: &FakeUser) -> Value {
        let token = self.issue_token(&user.id);
        json!({
            "access_token": token,
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": format!("refresh-{}", token),
            "user": user.json(),
        })
    }

    fn user_by_email(&self, email: &str) -> Option<&FakeUser> {
        self.users.iter().find(|user| user.email == email)
    }
}

type Shared = Arc<Mutex<FakeState>>;

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn check_key(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get("apikey").and_then(|value| value.to_str().ok()) {
        Some(API_KEY) => Ok(()),
        _ => Err(reply(
            StatusCode::UNAUTHORIZED,
            json!({ "message": "Invalid API key" }),
        )),
    }
}

/// Resolves the bearer token to a user id.
fn authenticated(state: &FakeState, headers: &HeaderMap) -> Result<String, Response> {
    check_key(headers)?;
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| state.tokens.get(token))
        .cloned()
        .ok_or_else(|| {
            reply(
                StatusCode::UNAUTHORIZED,
                json!({ "msg": "Invalid token: token is expired" }),
            )
        })
}

fn text<'a>(body: &'a Value, key: &str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or_default()
}

async fn sign_up(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = check_key(&headers) {
        return response;
    }
    let mut state = state.lock();
    let (email, password) = (text(&body, "email"), text(&body, "password"));
    if password.len() < 6 {
        return reply(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "msg": "Password should be at least 6 characters." }),
        );
    }
    if state.user_by_email(email).is_some() {
        return reply(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "msg": "User already registered" }),
        );
    }

    let user = FakeUser {
        id: format!("user-{}", state.next()),
        email: email.to_string(),
        password: password.to_string(),
        confirmed: !state.require_confirmation,
    };
    state.users.push(user.clone());
    if user.confirmed {
        let session = state.session(&user);
        reply(StatusCode::OK, session)
    } else {
        reply(StatusCode::OK, user.json())
    }
}

async fn token(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = check_key(&headers) {
        return response;
    }
    if query.get("grant_type").map(String::as_str) != Some("password") {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "unsupported_grant_type" }),
        );
    }

    let mut state = state.lock();
    let user = state
        .user_by_email(text(&body, "email"))
        .filter(|user| user.password == text(&body, "password"))
        .cloned();
    match user {
        Some(user) if !user.confirmed => reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid_grant", "error_description": "Email not confirmed" }),
        ),
        Some(user) => {
            let session = state.session(&user);
            reply(StatusCode::OK, session)
        }
        None => reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" }),
        ),
    }
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(response) = check_key(&headers) {
        return response;
    }
    if let Some(token) = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        state.lock().tokens.remove(token);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn recover(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = check_key(&headers) {
        return response;
    }
    state.lock().reset_requests.push((
        text(&body, "email").to_string(),
        query.get("redirect_to").cloned(),
    ));
    reply(StatusCode::OK, json!({}))
}

async fn get_user(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = state.lock();
    let user_id = match authenticated(&state, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    match state.users.iter().find(|user| user.id == user_id) {
        Some(user) => reply(StatusCode::OK, user.json()),
        None => reply(StatusCode::NOT_FOUND, json!({ "msg": "User not found" })),
    }
}

async fn update_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    let user_id = match authenticated(&state, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let Some(user) = state.users.iter_mut().find(|user| user.id == user_id) else {
        return reply(StatusCode::NOT_FOUND, json!({ "msg": "User not found" }));
    };

    let password = text(&body, "password");
    if password == user.password {
        return reply(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "msg": "New password should be different from the old password." }),
        );
    }
    user.password = password.to_string();
    reply(StatusCode::OK, user.json())
}

/// Applies the `column=eq.value` filters the client sends.
fn matches(row: &Value, query: &HashMap<String, String>) -> bool {
    ["id", "user_id"].iter().all(|column| {
        match query.get(*column).and_then(|filter| filter.strip_prefix("eq.")) {
            Some(value) => row.get(*column).and_then(Value::as_str) == Some(value),
            None => true,
        }
    })
}

fn owned_by(row: &Value, user_id: &str) -> bool {
    row.get("user_id").and_then(Value::as_str) == Some(user_id)
}

async fn list_beats(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let state = state.lock();
    let user_id = match authenticated(&state, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    let mut rows: Vec<Value> = state
        .beats
        .iter()
        .filter(|row| owned_by(row, &user_id) && matches(row, &query))
        .cloned()
        .collect();
    if query.get("order").map(String::as_str) == Some("created_at.desc") {
        rows.sort_by(|a, b| text(b, "created_at").cmp(text(a, "created_at")));
    }
    reply(StatusCode::OK, Value::Array(rows))
}

async fn create_beat(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    let user_id = match authenticated(&state, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let Value::Object(mut row) = body else {
        return reply(StatusCode::BAD_REQUEST, json!({ "message": "expected an object" }));
    };
    if row.get("user_id").and_then(Value::as_str) != Some(user_id.as_str()) {
        return reply(
            StatusCode::FORBIDDEN,
            json!({ "message": "new row violates row-level security policy for table \"beats\"" }),
        );
    }

    let id = format!("beat-{}", state.next());
    let now = state.timestamp();
    row.insert("id".to_string(), json!(id));
    row.insert("created_at".to_string(), json!(now));
    row.insert("updated_at".to_string(), json!(now));
    let row = Value::Object(row);
    state.beats.push(row.clone());
    reply(StatusCode::CREATED, json!([row]))
}

async fn update_beats(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    let user_id = match authenticated(&state, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let Value::Object(changes) = body else {
        return reply(StatusCode::BAD_REQUEST, json!({ "message": "expected an object" }));
    };

    let now = state.timestamp();
    let mut updated = Vec::new();
    for row in state.beats.iter_mut() {
        if !owned_by(row, &user_id) || !matches(row, &query) {
            continue;
        }
        if let Value::Object(fields) = row {
            for (key, value) in changes.iter() {
                let value = match (key.as_str(), value.as_str()) {
                    ("updated_at", Some("now")) => json!(now),
                    _ => value.clone(),
                };
                fields.insert(key.clone(), value);
            }
        }
        updated.push(row.clone());
    }
    reply(StatusCode::OK, Value::Array(updated))
}

async fn delete_beats(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock();
    let user_id = match authenticated(&state, &headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let failing = query
        .get("id")
        .and_then(|filter| filter.strip_prefix("eq."))
        .is_some_and(|id| state.failing_deletes.contains(id));
    if failing {
        return reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "message": "canceling statement due to statement timeout" }),
        );
    }

    let (deleted, kept): (Vec<Value>, Vec<Value>) = state
        .beats
        .drain(..)
        .partition(|row| owned_by(row, &user_id) && matches(row, &query));
    state.beats = kept;
    reply(StatusCode::OK, Value::Array(deleted))
}

/// A running fake backend. The server stops when this is dropped.
pub struct FakeBackend {
    url: String,
    state: Shared,
    server: JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start() -> FakeBackend {
        let state = Shared::default();
        let app = Router::new()
            .route("/auth/v1/signup", post(sign_up))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/logout", post(logout))
            .route("/auth/v1/recover", post(recover))
            .route("/auth/v1/user", get(get_user).put(update_user))
            .route(
                "/rest/v1/beats",
                get(list_beats)
                    .post(create_beat)
                    .patch(update_beats)
                    .delete(delete_beats),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("unable to bind fake backend");
        let address = listener
            .local_addr()
            .expect("fake backend has no address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        FakeBackend {
            url: format!("http://{}", address),
            state,
            server,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// A client configured for this server.
    pub fn backend(&self) -> Backend {
        Backend::new(Some(&self.url), Some(API_KEY)).expect("fake backend URL should parse")
    }

    /// Creates a confirmed account and returns its id.
    pub fn add_user(&self, email: &str, password: &str) -> String {
        let mut state = self.state.lock();
        let id = format!("user-{}", state.next());
        state.users.push(FakeUser {
            id: id.clone(),
            email: email.to_string(),
            password: password.to_string(),
            confirmed: true,
        });
        id
    }

    /// New sign ups must confirm their email before signing in.
    pub fn require_confirmation(&self, required: bool) {
        self.state.lock().require_confirmation = required;
    }

    pub fn password(&self, email: &str) -> Option<String> {
        self.state
            .lock()
            .user_by_email(email)
            .map(|user| user.password.clone())
    }

    /// The link a recovery email would carry for the given account.
    pub fn recovery_link(&self, email: &str) -> Option<String> {
        let mut state = self.state.lock();
        let user_id = state.user_by_email(email)?.id.clone();
        let token = state.issue_token(&user_id);
        Some(format!(
            "http://localhost:3000/#access_token={}&expires_in=3600&refresh_token=refresh-{}&token_type=bearer&type=recovery",
            token, token
        ))
    }

    /// The (email, redirect) pairs password resets were requested for.
    pub fn reset_requests(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().reset_requests.clone()
    }

    pub fn is_token_valid(&self, token: &str) -> bool {
        self.state.lock().tokens.contains_key(token)
    }

    pub fn beats(&self) -> Vec<Value> {
        self.state.lock().beats.clone()
    }

    /// Inserts a row as-is, bypassing validation.
    pub fn insert_beat(&self, row: Value) {
        self.state.lock().beats.push(row);
    }

    /// Makes deleting the given beat fail with a server error.
    pub fn fail_delete(&self, id: &str) {
        self.state.lock().failing_deletes.insert(id.to_string());
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}
