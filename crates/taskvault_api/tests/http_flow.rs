use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use http::{Method, Request, Response, StatusCode};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::thread;
use std::time::Duration;
use taskvault_api::{TaskApi, SESSION_COOKIE_NAME};
use taskvault_core::db::open_db;
use taskvault_core::{
    AppConfig, AuthContext, AuthError, NewUser, SqliteUserRepository, TokenVerifier,
    UserRepository, UserRole, CSRF_COOKIE_NAME, CSRF_HEADER_NAME,
};
use tempfile::TempDir;

const ALICE: &str = "keycloak-user-1";
const BOB: &str = "keycloak-admin-1";

struct StaticVerifier {
    tokens: HashMap<&'static str, AuthContext>,
}

impl StaticVerifier {
    fn new() -> Self {
        let tokens = HashMap::from([
            (
                "alice-token",
                AuthContext::new("sub-alice")
                    .with_preferred_username(ALICE)
                    .with_realm_roles(["user"]),
            ),
            (
                "bob-token",
                AuthContext::new(BOB).with_realm_roles(["user", "admin"]),
            ),
            (
                "no-role-token",
                AuthContext::new("sub-alice").with_preferred_username(ALICE),
            ),
            (
                "ghost-token",
                AuthContext::new("never-provisioned").with_realm_roles(["user"]),
            ),
        ]);
        Self { tokens }
    }
}

impl TokenVerifier for StaticVerifier {
    fn verify(&self, bearer_token: &str) -> Result<AuthContext, AuthError> {
        self.tokens
            .get(bearer_token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("unknown token".to_string()))
    }
}

struct Harness {
    api: TaskApi<StaticVerifier>,
    inspect: Connection,
    _dir: TempDir,
}

fn config(db_path: &Path) -> AppConfig {
    let db_path = db_path.to_string_lossy().to_string();
    AppConfig::from_lookup(move |name| {
        let value = match name {
            "TASKVAULT_FIELD_SECRET" => "field-secret",
            "TASKVAULT_CSRF_SECRET" => "csrf-secret",
            "KEYCLOAK_URL" => "https://id.example.com",
            "KEYCLOAK_REALM" => "tasks",
            "KEYCLOAK_CLIENT_ID" => "task-api",
            "KEYCLOAK_CLIENT_SECRET" => "client-secret",
            "TASKVAULT_DB_PATH" => db_path.as_str(),
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap()
}

fn setup() -> Harness {
    setup_with(|_| {})
}

fn setup_with(adjust: impl FnOnce(&mut AppConfig)) -> Harness {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("taskvault.sqlite3");

    let inspect = open_db(&db_path).unwrap();
    let users = SqliteUserRepository::new(&inspect);
    users
        .insert_user(&NewUser::new(ALICE, "user1@example.com", UserRole::User))
        .unwrap();
    users
        .insert_user(&NewUser::new(BOB, "admin1@example.com", UserRole::Admin))
        .unwrap();

    let mut config = config(&db_path);
    adjust(&mut config);
    let api = TaskApi::open(&config, StaticVerifier::new()).unwrap();
    Harness {
        api,
        inspect,
        _dir: dir,
    }
}

fn task_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM tasks;", [], |row| row.get(0))
        .unwrap()
}

/// Minimal cookie-jar client.
#[derive(Default)]
struct Client {
    cookies: HashMap<String, String>,
    csrf_token: Option<String>,
}

impl Client {
    fn send(
        &mut self,
        api: &TaskApi<StaticVerifier>,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Response<Vec<u8>> {
        let mut builder = Request::builder().method(method).uri(path);
        if !self.cookies.is_empty() {
            let header = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(COOKIE, header);
        }
        if let Some(token) = self.csrf_token.as_deref() {
            builder = builder.header(CSRF_HEADER_NAME, token);
        }
        if let Some(bearer) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {bearer}"));
        }
        let body = body
            .map(|value| serde_json::to_vec(&value).unwrap())
            .unwrap_or_default();
        let request = builder.body(body).unwrap();

        let response = api.handle(&request);
        for value in response.headers().get_all(SET_COOKIE) {
            let pair = value.to_str().unwrap().split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            self.cookies.insert(name.to_string(), value.to_string());
        }
        response
    }

    fn fetch_csrf_token(&mut self, api: &TaskApi<StaticVerifier>) -> String {
        let response = self.send(api, Method::GET, "/csrf-token", None, None);
        assert_eq!(response.status(), StatusCode::OK);
        let token = json_body(&response)["csrfToken"]
            .as_str()
            .unwrap()
            .to_string();
        self.csrf_token = Some(token.clone());
        token
    }
}

fn json_body(response: &Response<Vec<u8>>) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

fn set_cookies(response: &Response<Vec<u8>>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

#[test]
fn csrf_token_endpoint_issues_session_bound_cookie() {
    let harness = setup();
    let mut client = Client::default();

    let response = client.send(&harness.api, Method::GET, "/csrf-token", None, None);
    assert_eq!(response.status(), StatusCode::OK);
    let token = json_body(&response)["csrfToken"]
        .as_str()
        .unwrap()
        .to_string();

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    for cookie in &cookies {
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(!cookie.contains("Secure"));
    }
    assert!(cookies
        .iter()
        .any(|cookie| cookie.starts_with(&format!("{SESSION_COOKIE_NAME}="))));
    assert_eq!(client.cookies.get(CSRF_COOKIE_NAME), Some(&token));

    let again = client.send(&harness.api, Method::GET, "/csrf-token", None, None);
    assert_eq!(json_body(&again)["csrfToken"], token.as_str());
    assert_eq!(set_cookies(&again).len(), 1);
    assert_eq!(harness.api.sessions().len(), 1);
}

#[test]
fn cookieless_requests_do_not_accumulate_sessions() {
    let harness = setup();

    for _ in 0..500 {
        let mut client = Client::default();
        let response = client.send(&harness.api, Method::GET, "/tasks", Some("alice-token"), None);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).is_empty());
    }
    let mut client = Client::default();
    client.send(&harness.api, Method::GET, "/", None, None);
    client.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("alice-token"),
        Some(json!({ "title": "no session" })),
    );
    assert_eq!(harness.api.sessions().len(), 0);

    let mut stale = Client::default();
    stale
        .cookies
        .insert(SESSION_COOKIE_NAME.to_string(), "bogus".to_string());
    let response = stale.send(&harness.api, Method::GET, "/tasks", Some("alice-token"), None);
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(harness.api.sessions().len(), 0);

    client.fetch_csrf_token(&harness.api);
    assert_eq!(harness.api.sessions().len(), 1);
}

#[test]
fn expired_sessions_are_swept_by_later_requests() {
    let harness = setup_with(|config| {
        config.session_idle_timeout = Some(Duration::from_millis(50));
    });

    for _ in 0..100 {
        Client::default().fetch_csrf_token(&harness.api);
    }
    assert!(harness.api.sessions().len() <= 100);

    thread::sleep(Duration::from_millis(80));
    let mut late = Client::default();
    late.fetch_csrf_token(&harness.api);
    assert_eq!(harness.api.sessions().len(), 1);
}

#[test]
fn session_store_stays_within_configured_cap() {
    let harness = setup_with(|config| config.max_sessions = 3);

    for _ in 0..20 {
        Client::default().fetch_csrf_token(&harness.api);
    }
    assert_eq!(harness.api.sessions().len(), 3);

    let mut latest = Client::default();
    latest.fetch_csrf_token(&harness.api);
    let response = latest.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("alice-token"),
        Some(json!({ "title": "still works" })),
    );
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(harness.api.sessions().len(), 3);
}

#[test]
fn mutations_without_valid_csrf_are_rejected_before_storage() {
    let harness = setup();
    let body = json!({ "title": "Buy milk" });

    let mut anonymous = Client::default();
    let response = anonymous.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("alice-token"),
        Some(body.clone()),
    );
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(&response), json!({ "error": "invalid csrf token" }));

    let mut no_header = Client::default();
    no_header.fetch_csrf_token(&harness.api);
    no_header.csrf_token = None;
    let response = no_header.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("alice-token"),
        Some(body.clone()),
    );
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut mismatched = Client::default();
    mismatched.fetch_csrf_token(&harness.api);
    mismatched.csrf_token = Some("forged.00".to_string());
    let response = mismatched.send(
        &harness.api,
        Method::DELETE,
        "/tasks/1",
        Some("alice-token"),
        None,
    );
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // CSRF is checked before the bearer token.
    let response = anonymous.send(&harness.api, Method::PUT, "/tasks/1", None, Some(body));
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert_eq!(task_count(&harness.inspect), 0);
}

#[test]
fn token_from_another_session_is_rejected() {
    let harness = setup();
    let mut first = Client::default();
    let stolen = first.fetch_csrf_token(&harness.api);

    let mut second = Client::default();
    second.fetch_csrf_token(&harness.api);
    second
        .cookies
        .insert(CSRF_COOKIE_NAME.to_string(), stolen.clone());
    second.csrf_token = Some(stolen);

    let response = second.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("alice-token"),
        Some(json!({ "title": "replayed" })),
    );
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(task_count(&harness.inspect), 0);
}

#[test]
fn reads_do_not_require_csrf() {
    let harness = setup();
    let mut client = Client::default();

    let response = client.send(&harness.api, Method::GET, "/tasks", Some("alice-token"), None);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(&response), json!([]));
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[test]
fn buy_milk_flow_over_http() {
    let harness = setup();
    let mut alice = Client::default();
    alice.fetch_csrf_token(&harness.api);

    let response = alice.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("alice-token"),
        Some(json!({ "title": "Buy milk", "notes": "call mom" })),
    );
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(&response);
    assert_eq!(created["title"], "Buy milk");
    assert_eq!(created["status"], "pending");
    assert_eq!(created["notes"], "call mom");
    let id = created["id"].as_i64().unwrap();

    let stored: String = harness
        .inspect
        .query_row(
            "SELECT encrypted_notes FROM tasks WHERE id = ?1;",
            [id],
            |row| row.get(0),
        )
        .unwrap();
    assert!(!stored.contains("call mom"));

    let path = format!("/tasks/{id}");
    let response = alice.send(&harness.api, Method::GET, &path, Some("alice-token"), None);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(&response)["notes"], "call mom");

    let mut bob = Client::default();
    let response = bob.send(&harness.api, Method::GET, &path, Some("bob-token"), None);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(&response), json!({ "message": "Task not found" }));

    let response = alice.send(
        &harness.api,
        Method::PUT,
        &path,
        Some("alice-token"),
        Some(json!({ "status": "completed" })),
    );
    assert_eq!(response.status(), StatusCode::OK);
    let updated = json_body(&response);
    assert_eq!(updated["status"], "completed");
    assert_eq!(updated["title"], "Buy milk");
    assert_eq!(updated["notes"], "call mom");

    let response = alice.send(
        &harness.api,
        Method::PUT,
        &path,
        Some("alice-token"),
        Some(json!({ "status": "pending" })),
    );
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&response)["errors"][0]["field"], "status");
}

#[test]
fn foreign_tasks_cannot_be_changed() {
    let harness = setup();
    let mut alice = Client::default();
    alice.fetch_csrf_token(&harness.api);
    let response = alice.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("alice-token"),
        Some(json!({ "title": "alice only" })),
    );
    let path = format!("/tasks/{}", json_body(&response)["id"]);

    let mut bob = Client::default();
    bob.fetch_csrf_token(&harness.api);
    let response = bob.send(
        &harness.api,
        Method::PUT,
        &path,
        Some("bob-token"),
        Some(json!({ "title": "hijacked" })),
    );
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = bob.send(&harness.api, Method::DELETE, &path, Some("bob-token"), None);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = bob.send(&harness.api, Method::GET, "/tasks", Some("bob-token"), None);
    assert_eq!(json_body(&response), json!([]));

    let response = alice.send(&harness.api, Method::GET, &path, Some("alice-token"), None);
    assert_eq!(json_body(&response)["title"], "alice only");
}

#[test]
fn delete_returns_no_content_then_not_found() {
    let harness = setup();
    let mut alice = Client::default();
    alice.fetch_csrf_token(&harness.api);
    let response = alice.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("alice-token"),
        Some(json!({ "title": "short lived" })),
    );
    let path = format!("/tasks/{}", json_body(&response)["id"]);

    let response = alice.send(&harness.api, Method::DELETE, &path, Some("alice-token"), None);
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.body().is_empty());
    assert!(response.headers().get(CONTENT_TYPE).is_none());

    let response = alice.send(&harness.api, Method::DELETE, &path, Some("alice-token"), None);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(task_count(&harness.inspect), 0);
}

#[test]
fn authentication_and_authorization_failures() {
    let harness = setup();
    let mut client = Client::default();

    let response = client.send(&harness.api, Method::GET, "/tasks", None, None);
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client.send(&harness.api, Method::GET, "/tasks", Some("forged"), None);
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client.send(
        &harness.api,
        Method::GET,
        "/tasks",
        Some("no-role-token"),
        None,
    );
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client.send(&harness.api, Method::GET, "/tasks", Some("ghost-token"), None);
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    client.fetch_csrf_token(&harness.api);
    let response = client.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("ghost-token"),
        Some(json!({ "title": "never stored" })),
    );
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(task_count(&harness.inspect), 0);
}

#[test]
fn validation_errors_list_fields() {
    let harness = setup();
    let mut alice = Client::default();
    alice.fetch_csrf_token(&harness.api);

    let response = alice.send(
        &harness.api,
        Method::POST,
        "/tasks",
        Some("alice-token"),
        Some(json!({ "title": "  ", "status": "done" })),
    );
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = json_body(&response)["errors"].as_array().unwrap().clone();
    let fields: Vec<_> = errors
        .iter()
        .map(|error| error["field"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(fields, ["title", "status"]);
    assert_eq!(task_count(&harness.inspect), 0);

    let response = alice.send(
        &harness.api,
        Method::GET,
        "/tasks/not-a-number",
        Some("alice-token"),
        None,
    );
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&response)["errors"][0]["field"], "id");
}

#[test]
fn unknown_routes_and_methods() {
    let harness = setup();
    let mut client = Client::default();

    let response = client.send(&harness.api, Method::GET, "/", None, None);
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.send(&harness.api, Method::GET, "/admin", None, None);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.send(&harness.api, Method::HEAD, "/tasks", None, None);
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
