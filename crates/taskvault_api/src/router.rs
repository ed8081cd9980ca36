//! HTTP-shaped request handling for the task API.
//!
//! # Responsibility
//! - Attach the client session when one exists; only `GET /csrf-token`
//!   creates one.
//! - Enforce CSRF on state-changing requests before anything else runs.
//! - Verify the bearer token once and pass the resulting `AuthContext`
//!   explicitly into the task store.
//!
//! # Invariants
//! - CSRF, authentication and validation failures never reach storage.
//! - Every task operation runs through `TaskStore`, which scopes by owner.
//! - Reads without a live `sid` cookie leave the session store untouched.

use crate::cookie::{read_cookie, restricted_cookie, SESSION_COOKIE_NAME};
use crate::error::ApiError;
use crate::validate::{parse_bearer, parse_new_task, parse_task_id, parse_task_patch};
use http::header::{AUTHORIZATION, CONTENT_TYPE, SET_COOKIE};
use http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use log::{error, info, warn};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use taskvault_core::db::{open_db, DbResult};
use taskvault_core::{
    requires_csrf, AppConfig, AuthContext, AuthError, CsrfGuard, FieldCipher, SessionId,
    SessionStore, SqliteTaskRepository, SqliteUserRepository, StoreResult, TaskStore,
    TokenVerifier, CSRF_COOKIE_NAME, CSRF_HEADER_NAME, REQUIRED_REALM_ROLE,
};
use uuid::Uuid;

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("cache-control", "no-store"),
];

enum Route {
    Root,
    CsrfToken,
    Tasks,
    Task(String),
}

/// Successful handler output before headers are applied.
struct Reply {
    status: StatusCode,
    body: Option<Vec<u8>>,
    cookies: Vec<String>,
}

impl Reply {
    fn json(status: StatusCode, value: &impl Serialize) -> Result<Self, ApiError> {
        let body = serde_json::to_vec(value)
            .map_err(|err| ApiError::Internal(format!("failed to encode response: {err}")))?;
        Ok(Self {
            status,
            body: Some(body),
            cookies: Vec::new(),
        })
    }

    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: None,
            cookies: Vec::new(),
        }
    }
}

/// Task API boundary shared by all request handlers.
pub struct TaskApi<V: TokenVerifier> {
    conn: Mutex<Connection>,
    cipher: FieldCipher,
    csrf: CsrfGuard,
    sessions: Arc<SessionStore>,
    verifier: V,
    secure_cookies: bool,
}

impl<V: TokenVerifier> TaskApi<V> {
    /// Builds the boundary around an already migrated connection.
    pub fn new(config: &AppConfig, conn: Connection, verifier: V) -> Self {
        let sessions = Arc::new(
            SessionStore::with_idle_timeout(config.session_idle_timeout)
                .with_max_sessions(config.max_sessions),
        );
        Self {
            conn: Mutex::new(conn),
            cipher: FieldCipher::from_secret(config.field_secret.expose()),
            csrf: CsrfGuard::new(config.csrf_secret.expose(), Arc::clone(&sessions)),
            sessions,
            verifier,
            secure_cookies: config.production,
        }
    }

    /// Opens the configured database and builds the boundary.
    pub fn open(config: &AppConfig, verifier: V) -> DbResult<Self> {
        let conn = open_db(&config.db_path)?;
        Ok(Self::new(config, conn, verifier))
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Handles one request end to end. Never panics on client input.
    pub fn handle(&self, request: &Request<Vec<u8>>) -> Response<Vec<u8>> {
        let started_at = Instant::now();
        let request_id = Uuid::new_v4();
        let session = self.existing_session(request);

        let reply = match self.dispatch(request, session.as_ref()) {
            Ok(reply) => reply,
            Err(err) => self.reject(request, request_id, err),
        };

        info!(
            "event=http_request module=api status={} request_id={} method={} path={} \
             duration_ms={}",
            reply.status.as_u16(),
            request_id,
            request.method(),
            request.uri().path(),
            started_at.elapsed().as_millis()
        );
        build_response(reply)
    }

    /// Resolves the `sid` cookie to a live session, refreshing its idle clock.
    fn existing_session(&self, request: &Request<Vec<u8>>) -> Option<SessionId> {
        let raw = read_cookie(request.headers(), SESSION_COOKIE_NAME)?;
        let id = SessionId::from_client(raw);
        self.sessions.touch(&id).then_some(id)
    }

    fn dispatch(
        &self,
        request: &Request<Vec<u8>>,
        session: Option<&SessionId>,
    ) -> Result<Reply, ApiError> {
        if requires_csrf(request.method().as_str()) {
            self.csrf.validate(
                session,
                read_cookie(request.headers(), CSRF_COOKIE_NAME),
                header_str(request, CSRF_HEADER_NAME),
            )?;
        }

        match (request.method(), parse_route(request.uri().path())) {
            (&Method::GET, Some(Route::Root)) => {
                Reply::json(StatusCode::OK, &json!({ "message": "Task Management API" }))
            }
            (&Method::GET, Some(Route::CsrfToken)) => self.issue_csrf_token(session),
            (&Method::GET, Some(Route::Tasks)) => {
                let auth = self.authenticate(request)?;
                let tasks = self.with_store(|store| store.list(&auth))?;
                Reply::json(StatusCode::OK, &tasks)
            }
            (&Method::POST, Some(Route::Tasks)) => {
                let auth = self.authenticate(request)?;
                let input = parse_new_task(request.body()).map_err(ApiError::Validation)?;
                let task = self.with_store(|store| store.create(&auth, input))?;
                Reply::json(StatusCode::CREATED, &task)
            }
            (&Method::GET, Some(Route::Task(raw_id))) => {
                let auth = self.authenticate(request)?;
                let id = parse_task_id(&raw_id).map_err(ApiError::Validation)?;
                let task = self
                    .with_store(|store| store.get_by_id(&auth, id))?
                    .ok_or(ApiError::TaskNotFound)?;
                Reply::json(StatusCode::OK, &task)
            }
            (&Method::PUT, Some(Route::Task(raw_id))) => {
                let auth = self.authenticate(request)?;
                let id = parse_task_id(&raw_id).map_err(ApiError::Validation)?;
                let patch = parse_task_patch(request.body()).map_err(ApiError::Validation)?;
                let task = self
                    .with_store(|store| store.update(&auth, id, patch))?
                    .ok_or(ApiError::TaskNotFound)?;
                Reply::json(StatusCode::OK, &task)
            }
            (&Method::DELETE, Some(Route::Task(raw_id))) => {
                let auth = self.authenticate(request)?;
                let id = parse_task_id(&raw_id).map_err(ApiError::Validation)?;
                if self.with_store(|store| store.delete(&auth, id))? {
                    Ok(Reply::empty(StatusCode::NO_CONTENT))
                } else {
                    Err(ApiError::TaskNotFound)
                }
            }
            (_, Some(_)) => Err(ApiError::MethodNotAllowed),
            (_, None) => Err(ApiError::RouteNotFound),
        }
    }

    fn issue_csrf_token(&self, session: Option<&SessionId>) -> Result<Reply, ApiError> {
        let mut cookies = Vec::new();
        let session = match session {
            Some(id) => id.clone(),
            None => {
                let (id, _) = self.sessions.create();
                cookies.push(restricted_cookie(
                    SESSION_COOKIE_NAME,
                    id.as_str(),
                    self.secure_cookies,
                ));
                id
            }
        };
        let token = self
            .csrf
            .issue(&session)
            .map_err(|_| ApiError::SessionUnavailable)?;
        let mut reply = Reply::json(StatusCode::OK, &json!({ "csrfToken": token.as_str() }))?;
        reply.cookies = cookies;
        reply.cookies.push(restricted_cookie(
            CSRF_COOKIE_NAME,
            token.as_str(),
            self.secure_cookies,
        ));
        Ok(reply)
    }

    fn authenticate(&self, request: &Request<Vec<u8>>) -> Result<AuthContext, ApiError> {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthenticated(AuthError::MissingToken))?;
        let token =
            parse_bearer(header).ok_or(ApiError::Unauthenticated(AuthError::MissingToken))?;

        let auth = self.verifier.verify(token)?;
        if !auth.has_realm_role(REQUIRED_REALM_ROLE) {
            return Err(ApiError::MissingRole(REQUIRED_REALM_ROLE));
        }
        Ok(auth)
    }

    fn with_store<T, F>(&self, operation: F) -> Result<T, ApiError>
    where
        F: FnOnce(
            &TaskStore<'_, SqliteTaskRepository<'_>, SqliteUserRepository<'_>>,
        ) -> StoreResult<T>,
    {
        let conn = self.conn.lock();
        let conn: &Connection = &conn;
        let store = TaskStore::new(
            SqliteTaskRepository::new(conn),
            SqliteUserRepository::new(conn),
            &self.cipher,
        );
        operation(&store).map_err(ApiError::from)
    }

    fn reject(&self, request: &Request<Vec<u8>>, request_id: Uuid, err: ApiError) -> Reply {
        let status = err.status();
        if status.is_server_error() {
            error!(
                "event=http_reject module=api status=error request_id={} method={} \
                 error_code={} error={}",
                request_id,
                request.method(),
                err.code(),
                err
            );
        } else {
            warn!(
                "event=http_reject module=api status=error request_id={} method={} error_code={}",
                request_id,
                request.method(),
                err.code()
            );
        }

        match serde_json::to_vec(&err.body()) {
            Ok(body) => Reply {
                status,
                body: Some(body),
                cookies: Vec::new(),
            },
            Err(_) => Reply::empty(status),
        }
    }
}

fn parse_route(path: &str) -> Option<Route> {
    let trimmed = path.trim_end_matches('/');
    let mut segments = trimmed.split('/').skip(1);
    match (segments.next(), segments.next(), segments.next()) {
        (None, _, _) => Some(Route::Root),
        (Some("csrf-token"), None, _) => Some(Route::CsrfToken),
        (Some("tasks"), None, _) => Some(Route::Tasks),
        (Some("tasks"), Some(id), None) if !id.is_empty() => Some(Route::Task(id.to_string())),
        _ => None,
    }
}

fn header_str<'r>(request: &'r Request<Vec<u8>>, name: &str) -> Option<&'r str> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

fn build_response(reply: Reply) -> Response<Vec<u8>> {
    let has_body = reply.body.is_some();
    let mut response = Response::new(reply.body.unwrap_or_default());
    *response.status_mut() = reply.status;

    let headers = response.headers_mut();
    if has_body {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    for cookie in reply.cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => error!(
                "event=set_cookie module=api status=error error_code=invalid_header error={err}"
            ),
        }
    }
    response
}
