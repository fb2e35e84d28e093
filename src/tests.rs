//! Integration tests for the registration ledger.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{Datelike, Duration, Utc};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::{Config, PaymentConfig};
use crate::db::{init_database, Repository, RESET_CONFIRMATION_PHRASE};
use crate::payments::PaymentGateway;
use crate::{create_router, AppState};

const ADMIN_TOKEN: &str = "test-admin-token";

// ========== Mock payment gateway ==========

#[derive(Default)]
struct MockGateway {
    next_id: AtomicI64,
    paid: Mutex<HashSet<String>>,
}

impl MockGateway {
    fn settle(&self, checkout_id: &str) {
        self.paid.lock().unwrap().insert(checkout_id.to_string());
    }
}

async fn mock_token() -> Json<Value> {
    Json(json!({ "access_token": "mock-token", "token_type": "bearer", "expires_in": 1800 }))
}

async fn mock_create_intent(State(mock): State<Arc<MockGateway>>) -> Json<Value> {
    let id = 1000 + mock.next_id.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "id": id, "redirectUrl": format!("https://pay.example/checkout/{id}") }))
}

async fn mock_get_intent(
    State(mock): State<Arc<MockGateway>>,
    Path((_slug, id)): Path<(String, String)>,
) -> Json<Value> {
    let paid = mock.paid.lock().unwrap().contains(&id);
    let payments = if paid {
        json!([{ "id": 7000, "state": "Authorized", "amount": 999 }])
    } else {
        json!([])
    };
    Json(json!({ "id": id, "order": { "id": 55, "payments": payments } }))
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

// ========== Fixture ==========

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    admin: Client,
    base_url: String,
    repo: Arc<Repository>,
    mock: Arc<MockGateway>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_gateway_credentials(true).await
    }

    async fn with_gateway_credentials(with_credentials: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let mock = Arc::new(MockGateway::default());
        let mock_app = Router::new()
            .route("/oauth2/token", post(mock_token))
            .route(
                "/v5/organizations/{slug}/checkout-intents",
                post(mock_create_intent),
            )
            .route(
                "/v5/organizations/{slug}/checkout-intents/{id}",
                get(mock_get_intent),
            )
            .with_state(mock.clone());
        let mock_url = spawn(mock_app).await;

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool, 4));

        let config = Config {
            admin_token: Some(ADMIN_TOKEN.to_string()),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            bcrypt_cost: 4,
            public_url: "http://localhost:8080".to_string(),
            school_name: "Lycée Pasteur".to_string(),
            payment: PaymentConfig {
                api_url: format!("{}/v5", mock_url),
                token_url: format!("{}/oauth2/token", mock_url),
                client_id: with_credentials.then(|| "client".to_string()),
                client_secret: with_credentials.then(|| "secret".to_string()),
                organization_slug: "club".to_string(),
            },
        };
        let gateway = Arc::new(PaymentGateway::new(&config.payment));

        let state = AppState {
            repo: repo.clone(),
            gateway,
            config: Arc::new(config),
        };
        let base_url = spawn(create_router(state)).await;

        // Wait for servers to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", ADMIN_TOKEN).parse().unwrap(),
        );

        TestFixture {
            client: Client::new(),
            admin: Client::builder().default_headers(headers).build().unwrap(),
            base_url,
            repo,
            mock,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn put_settings(&self, settings: Value) {
        let resp = self
            .admin
            .put(self.url("/api/admin/settings"))
            .json(&settings)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "settings update rejected");
    }

    async fn register(&self, body: Value) -> Response {
        self.client
            .post(self.url("/api/register"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Register a new team and return the response data.
    async fn create_team(&self, name: &str, password: &str, members: Vec<Value>) -> Value {
        let resp = self
            .register(json!({
                "mode": "create",
                "teamName": name,
                "teamPassword": password,
                "members": members,
            }))
            .await;
        assert_eq!(resp.status(), 201, "team {name} not created");
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }

    async fn join_team(&self, team_id: &str, password: &str, members: Vec<Value>) -> Response {
        self.register(json!({
            "mode": "join",
            "teamId": team_id,
            "teamPassword": password,
            "members": members,
        }))
        .await
    }

    async fn post_json(&self, client: &Client, path: &str, body: Value) -> (u16, Value) {
        let resp = client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get_json(&self, client: &Client, path: &str) -> (u16, Value) {
        let resp = client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn payment_events(&self) -> Vec<Value> {
        let (status, body) = self.get_json(&self.admin, "/api/admin/payments/events").await;
        assert_eq!(status, 200);
        body["data"].as_array().unwrap().clone()
    }

    async fn organisation_id(&self) -> String {
        let (_, body) = self.get_json(&self.client, "/api/teams").await;
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["isOrganisation"] == true)
            .unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

fn person(first: &str, last: &str, leader: bool) -> Value {
    json!({
        "firstName": first,
        "lastName": last,
        "email": format!("{}.{}@example.org", first.to_lowercase(), last.to_lowercase()),
        "bacLevel": 2,
        "isLeader": leader,
    })
}

fn member_id(registration: &Value, index: usize) -> String {
    registration["members"][index]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

// ========== Health & auth ==========

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get_json(&fixture.client, "/api/admin/members").await;
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = fixture
        .client
        .get(fixture.url("/api/admin/members"))
        .header("x-api-key", "wrong-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .client
        .get(fixture.url("/api/admin/members"))
        .header("x-api-key", ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (status, _) = fixture.get_json(&fixture.admin, "/api/admin/members").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_public_routes_need_no_token() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get_json(&fixture.client, "/api/teams").await;
    assert_eq!(status, 200);
    let teams = body["data"].as_array().unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0]["name"], "Organisation");
    assert_eq!(teams[0]["isFull"], false);

    let (status, _) = fixture.get_json(&fixture.client, "/api/stats").await;
    assert_eq!(status, 200);
}

// ========== Registration ==========

#[tokio::test]
async fn test_register_create_team() {
    let fixture = TestFixture::new().await;

    let data = fixture
        .create_team(
            "Les Lambdas",
            "secret-pass",
            vec![person("Alice", "Martin", true), person("Bob", "Durand", false)],
        )
        .await;

    assert_eq!(data["team"]["name"], "Les Lambdas");
    assert_eq!(data["team"]["isNew"], true);
    assert!(data["team"].get("passwordHash").is_none());
    assert_eq!(data["members"].as_array().unwrap().len(), 2);
    assert_eq!(data["members"][0]["paymentStatus"], "unpaid");
    assert_eq!(data["members"][0]["checkedIn"], false);

    let (_, stats) = fixture.get_json(&fixture.client, "/api/stats").await;
    assert_eq!(stats["data"]["totalTeams"], 1);
    assert_eq!(stats["data"]["totalParticipants"], 2);
    assert_eq!(stats["data"]["remainingSpots"], 98);
}

#[tokio::test]
async fn test_register_join_team() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let team_id = created["team"]["id"].as_str().unwrap();

    let resp = fixture
        .join_team(team_id, "wrong-pass", vec![person("Bob", "Durand", false)])
        .await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = fixture
        .join_team(team_id, "secret-pass", vec![person("Bob", "Durand", false)])
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["team"]["isNew"], false);
    assert_eq!(body["data"]["members"][0]["teamId"], team_id);

    let resp = fixture
        .join_team("no-such-team", "secret-pass", vec![person("Carl", "Petit", false)])
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_team_members_require_password() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let team_id = created["team"]["id"].as_str().unwrap();
    let path = format!("/api/teams/{}/members", team_id);

    let (status, _) = fixture
        .post_json(&fixture.client, &path, json!({ "password": "nope" }))
        .await;
    assert_eq!(status, 401);

    let (status, body) = fixture
        .post_json(&fixture.client, &path, json!({ "password": "secret-pass" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["lastName"], "Martin");

    // The Organisation team has no usable password
    let org_path = format!("/api/teams/{}/members", fixture.organisation_id().await);
    let (status, _) = fixture
        .post_json(&fixture.client, &org_path, json!({ "password": "!" }))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_duplicate_person_is_case_insensitive_and_atomic() {
    let fixture = TestFixture::new().await;
    fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;

    let resp = fixture
        .register(json!({
            "mode": "create",
            "teamName": "Omega",
            "teamPassword": "secret-pass",
            "members": [person("Zoe", "Blanc", true), person("ALICE", "martin", false)],
        }))
        .await;
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "DUPLICATE");

    // Nothing from the rejected request was persisted
    let (_, teams) = fixture.get_json(&fixture.client, "/api/teams").await;
    assert_eq!(teams["data"].as_array().unwrap().len(), 2);
    let (_, members) = fixture.get_json(&fixture.admin, "/api/admin/members").await;
    assert_eq!(members["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_team_name_rejected() {
    let fixture = TestFixture::new().await;
    fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;

    let resp = fixture
        .register(json!({
            "mode": "create",
            "teamName": "LAMBDA",
            "teamPassword": "secret-pass",
            "members": [person("Bob", "Durand", true)],
        }))
        .await;
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "DUPLICATE");
}

#[tokio::test]
async fn test_registration_validation_errors() {
    let fixture = TestFixture::new().await;

    let cases = vec![
        // No leader in a new team
        json!({
            "mode": "create", "teamName": "A", "teamPassword": "secret",
            "members": [person("Alice", "Martin", false)],
        }),
        // Password too short
        json!({
            "mode": "create", "teamName": "A", "teamPassword": "abc",
            "members": [person("Alice", "Martin", true)],
        }),
        // Empty member list
        json!({ "mode": "create", "teamName": "A", "teamPassword": "secret", "members": [] }),
        // Bad email
        json!({
            "mode": "create", "teamName": "A", "teamPassword": "secret",
            "members": [{ "firstName": "A", "lastName": "B", "email": "nope", "bacLevel": 1, "isLeader": true }],
        }),
        // Bac level out of range
        json!({
            "mode": "create", "teamName": "A", "teamPassword": "secret",
            "members": [{ "firstName": "A", "lastName": "B", "email": "a@b.fr", "bacLevel": 9, "isLeader": true }],
        }),
        // Same person twice
        json!({
            "mode": "create", "teamName": "A", "teamPassword": "secret",
            "members": [person("Alice", "Martin", true), person("alice", "Martin", false)],
        }),
    ];

    for case in cases {
        let resp = fixture.register(case.clone()).await;
        assert_eq!(resp.status(), 400, "accepted {case}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    let (_, stats) = fixture.get_json(&fixture.client, "/api/stats").await;
    assert_eq!(stats["data"]["totalParticipants"], 0);
}

// ========== Capacity ==========

#[tokio::test]
async fn test_new_team_needs_minimum_size() {
    let fixture = TestFixture::new().await;
    fixture.put_settings(json!({ "min_team_size": 2 })).await;

    let resp = fixture
        .register(json!({
            "mode": "create",
            "teamName": "Solo",
            "teamPassword": "secret-pass",
            "members": [person("Alice", "Martin", true)],
        }))
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(fixture.repo.list_members().await.unwrap().is_empty());

    let created = fixture
        .create_team(
            "Pair",
            "secret-pass",
            vec![person("Alice", "Martin", true), person("Bob", "Durand", false)],
        )
        .await;

    // Joining an existing team is not held to the minimum
    let team_id = created["team"]["id"].as_str().unwrap();
    let resp = fixture
        .join_team(team_id, "secret-pass", vec![person("Chloe", "Petit", false)])
        .await;
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn test_team_ceiling_reports_remaining() {
    let fixture = TestFixture::new().await;
    fixture.put_settings(json!({ "max_team_size": 3 })).await;

    let created = fixture
        .create_team(
            "Lambda",
            "secret-pass",
            vec![person("Alice", "Martin", true), person("Bob", "Durand", false)],
        )
        .await;
    let team_id = created["team"]["id"].as_str().unwrap();

    let resp = fixture
        .join_team(
            team_id,
            "secret-pass",
            vec![person("Carl", "Petit", false), person("Dana", "Roux", false)],
        )
        .await;
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CAPACITY_REACHED");
    assert_eq!(body["error"]["details"]["remaining"], 1);

    let resp = fixture
        .join_team(team_id, "secret-pass", vec![person("Carl", "Petit", false)])
        .await;
    assert_eq!(resp.status(), 201);

    // Full team rejects even with a wrong password
    let resp = fixture
        .join_team(team_id, "wrong", vec![person("Dana", "Roux", false)])
        .await;
    assert_eq!(resp.status(), 409);

    let (_, team) = fixture
        .get_json(&fixture.client, &format!("/api/teams/{}", team_id))
        .await;
    assert_eq!(team["data"]["memberCount"], 3);
    assert_eq!(team["data"]["isFull"], true);

    // A new team larger than the ceiling is rejected too
    let resp = fixture
        .register(json!({
            "mode": "create", "teamName": "Big", "teamPassword": "secret",
            "members": [
                person("E", "One", true), person("F", "Two", false),
                person("G", "Three", false), person("H", "Four", false),
            ],
        }))
        .await;
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_global_ceiling_excludes_organisation() {
    let fixture = TestFixture::new().await;
    fixture
        .put_settings(json!({ "max_total_participants": 3 }))
        .await;

    // Staff do not count toward the ceiling
    let org_id = fixture.organisation_id().await;
    for (first, last) in [("Staff", "One"), ("Staff", "Two"), ("Staff", "Three"), ("Staff", "Four")] {
        let mut body = person(first, last, false);
        body["teamId"] = json!(org_id);
        let (status, _) = fixture
            .post_json(&fixture.admin, "/api/admin/members", body)
            .await;
        assert_eq!(status, 201);
    }

    fixture
        .create_team(
            "Lambda",
            "secret-pass",
            vec![person("Alice", "Martin", true), person("Bob", "Durand", false)],
        )
        .await;

    let resp = fixture
        .register(json!({
            "mode": "create", "teamName": "Omega", "teamPassword": "secret",
            "members": [person("Carl", "Petit", true), person("Dana", "Roux", false)],
        }))
        .await;
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CAPACITY_REACHED");
    assert_eq!(body["error"]["details"]["remaining"], 1);

    let (_, stats) = fixture.get_json(&fixture.client, "/api/stats").await;
    assert_eq!(stats["data"]["totalParticipants"], 2);
    assert_eq!(stats["data"]["remainingSpots"], 1);
}

#[tokio::test]
async fn test_concurrent_joins_never_exceed_remaining() {
    let fixture = TestFixture::new().await;
    fixture.put_settings(json!({ "max_team_size": 4 })).await;

    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let team_id = created["team"]["id"].as_str().unwrap().to_string();
    let remaining = 3;

    let mut handles = Vec::new();
    for i in 0..10 {
        let client = fixture.client.clone();
        let url = fixture.url("/api/register");
        let body = json!({
            "mode": "join",
            "teamId": team_id,
            "teamPassword": "secret-pass",
            "members": [person("Joiner", &format!("Number{i}"), false)],
        });
        handles.push(tokio::spawn(async move {
            client
                .post(url)
                .json(&body)
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        assert!(status == 201 || status == 409, "unexpected status {status}");
        if status == 201 {
            admitted += 1;
        }
    }
    assert!(admitted <= remaining);

    let (_, team) = fixture
        .get_json(&fixture.client, &format!("/api/teams/{}", team_id))
        .await;
    assert_eq!(team["data"]["memberCount"], 1 + admitted);
    assert!(team["data"]["memberCount"].as_i64().unwrap() <= 4);
}

#[tokio::test]
async fn test_concurrent_creates_respect_global_ceiling() {
    let fixture = TestFixture::new().await;
    fixture
        .put_settings(json!({ "max_total_participants": 4 }))
        .await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = fixture.client.clone();
        let url = fixture.url("/api/register");
        let body = json!({
            "mode": "create",
            "teamName": format!("Team {i}"),
            "teamPassword": "secret-pass",
            "members": [person("Lead", &format!("L{i}"), true), person("Mate", &format!("M{i}"), false)],
        });
        handles.push(tokio::spawn(async move {
            client
                .post(url)
                .json(&body)
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }));
    }
    for handle in handles {
        let status = handle.await.unwrap();
        assert!(status == 201 || status == 409, "unexpected status {status}");
    }

    let (_, stats) = fixture.get_json(&fixture.client, "/api/stats").await;
    assert!(stats["data"]["totalParticipants"].as_i64().unwrap() <= 4);
}

// ========== Pricing ==========

#[tokio::test]
async fn test_pricing_follows_deadline() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get_json(&fixture.client, "/api/pricing").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["currentTier"], "tier2");
    assert_eq!(body["data"]["currentPrice"], 800);
    assert!(body["data"]["tier1Cutoff"].is_null());

    let deadline = (Utc::now() + Duration::days(60)).format("%Y-%m-%d").to_string();
    fixture
        .put_settings(json!({ "registration_deadline": deadline, "tier1_cutoff_days": 7 }))
        .await;

    let (_, body) = fixture.get_json(&fixture.client, "/api/pricing").await;
    assert_eq!(body["data"]["currentTier"], "tier1");
    assert_eq!(body["data"]["currentPrice"], 500);
    assert_eq!(
        body["data"]["onsite"]["availableTiers"].as_array().unwrap().len(),
        2
    );
}

// ========== Payments ==========

#[tokio::test]
async fn test_mark_delayed() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let id = member_id(&created, 0);

    let (status, body) = fixture
        .post_json(&fixture.client, "/api/payments/delayed", json!({ "memberId": id }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["paymentStatus"], "delayed");
    assert_eq!(body["data"]["paymentMethod"], "on_site");
    assert_eq!(body["data"]["registrationTier"], "tier2");
    assert!(body["data"]["paymentAmount"].is_null());

    let events = fixture.payment_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["eventType"], "payment_delayed");
    assert_eq!(events[0]["amount"], 0);

    // delayed cannot be delayed again
    let (status, _) = fixture
        .post_json(&fixture.client, "/api/payments/delayed", json!({ "memberId": id }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .post_json(&fixture.client, "/api/payments/delayed", json!({ "memberId": "ghost" }))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_checkout_requires_payment_enabled() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let id = member_id(&created, 0);

    let (status, body) = fixture
        .post_json(&fixture.client, "/api/payments/checkout", json!({ "memberId": id }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(fixture.payment_events().await.is_empty());
}

#[tokio::test]
async fn test_checkout_without_credentials_is_configuration_error() {
    let fixture = TestFixture::with_gateway_credentials(false).await;
    fixture.put_settings(json!({ "payment_enabled": true })).await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let id = member_id(&created, 0);

    let (status, body) = fixture
        .post_json(&fixture.client, "/api/payments/checkout", json!({ "memberId": id }))
        .await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");

    let member = fixture.repo.get_member(&id).await.unwrap();
    assert_eq!(member.payment_status.as_str(), "unpaid");
}

#[tokio::test]
async fn test_online_payment_verify_flow() {
    let fixture = TestFixture::new().await;
    fixture.put_settings(json!({ "payment_enabled": true })).await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let id = member_id(&created, 0);

    let (status, body) = fixture
        .post_json(&fixture.client, "/api/payments/checkout", json!({ "memberId": id }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["amount"], 800);
    assert_eq!(body["data"]["tier"], "tier2");
    let checkout_id = body["data"]["checkoutId"].as_str().unwrap().to_string();
    assert!(body["data"]["redirectUrl"]
        .as_str()
        .unwrap()
        .starts_with("https://pay.example/"));

    // Only unpaid members may start a checkout
    let (status, _) = fixture
        .post_json(&fixture.client, "/api/payments/checkout", json!({ "memberId": id }))
        .await;
    assert_eq!(status, 400);

    // Not settled yet
    let verify = format!("/api/payments/verify/{}", checkout_id);
    let (status, body) = fixture.get_json(&fixture.client, &verify).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["paymentStatus"], "pending");

    fixture.mock.settle(&checkout_id);
    let (_, body) = fixture.get_json(&fixture.client, &verify).await;
    assert_eq!(body["data"]["paymentStatus"], "paid");
    assert_eq!(body["data"]["paymentAmount"], 800);

    let member = fixture.repo.get_member(&id).await.unwrap();
    assert_eq!(member.transaction_id.as_deref(), Some("7000"));
    assert!(member.payment_confirmed_at.is_some());

    // Verifying again changes nothing
    let (_, body) = fixture.get_json(&fixture.client, &verify).await;
    assert_eq!(body["data"]["paymentStatus"], "paid");
    let types: Vec<String> = fixture
        .payment_events()
        .await
        .iter()
        .map(|e| e["eventType"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(types, vec!["checkout_initiated", "payment_confirmed"]);

    let (status, _) = fixture
        .get_json(&fixture.client, "/api/payments/verify/unknown")
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_payment_callback_flow() {
    let fixture = TestFixture::new().await;
    fixture.put_settings(json!({ "payment_enabled": true })).await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let id = member_id(&created, 0);

    let (_, body) = fixture
        .post_json(&fixture.client, "/api/payments/checkout", json!({ "memberId": id }))
        .await;
    let checkout_id = body["data"]["checkoutId"].as_str().unwrap().to_string();

    // Unknown checkout is acknowledged and ignored
    let (status, body) = fixture
        .post_json(
            &fixture.client,
            "/api/payments/callback",
            json!({ "checkoutId": "999999", "status": "paid" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["received"], true);

    // Not JSON at all
    let resp = fixture
        .client
        .post(fixture.url("/api/payments/callback"))
        .body("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Refused payment changes nothing
    let refused = json!({
        "eventType": "Payment",
        "data": { "id": 1, "state": "Refused" },
        "metadata": { "checkoutId": checkout_id },
    });
    fixture
        .post_json(&fixture.client, "/api/payments/callback", refused)
        .await;
    assert_eq!(
        fixture.repo.get_member(&id).await.unwrap().payment_status.as_str(),
        "pending"
    );

    let paid = json!({
        "eventType": "Order",
        "data": {
            "checkoutIntentId": checkout_id.parse::<i64>().unwrap(),
            "id": 55,
            "payments": [{ "id": 8001, "state": "Authorized", "amount": 800 }],
        },
    });

    // The gateway has not settled it yet, so the body alone proves nothing
    let (status, body) = fixture
        .post_json(&fixture.client, "/api/payments/callback", paid.clone())
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["received"], true);
    assert_eq!(
        fixture.repo.get_member(&id).await.unwrap().payment_status.as_str(),
        "pending"
    );

    fixture.mock.settle(&checkout_id);
    let (status, body) = fixture
        .post_json(&fixture.client, "/api/payments/callback", paid.clone())
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["received"], true);

    // Settlement details come from the gateway, the amount from the quote
    let member = fixture.repo.get_member(&id).await.unwrap();
    assert_eq!(member.payment_status.as_str(), "paid");
    assert_eq!(member.payment_amount, Some(800));
    assert_eq!(member.transaction_id.as_deref(), Some("7000"));

    // Duplicate delivery is a no-op
    fixture
        .post_json(&fixture.client, "/api/payments/callback", paid)
        .await;
    let confirmed = fixture
        .payment_events()
        .await
        .iter()
        .filter(|e| e["eventType"] == "payment_confirmed")
        .count();
    assert_eq!(confirmed, 1);
}

#[tokio::test]
async fn test_forged_callback_leaves_member_pending() {
    let fixture = TestFixture::new().await;
    fixture.put_settings(json!({ "payment_enabled": true })).await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let id = member_id(&created, 0);

    let (_, body) = fixture
        .post_json(&fixture.client, "/api/payments/checkout", json!({ "memberId": id }))
        .await;
    let checkout_id = body["data"]["checkoutId"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .post_json(
            &fixture.client,
            "/api/payments/callback",
            json!({ "checkoutId": checkout_id, "status": "paid" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["received"], true);

    let member = fixture.repo.get_member(&id).await.unwrap();
    assert_eq!(member.payment_status.as_str(), "pending");
    assert!(member.transaction_id.is_none());
    assert!(member.payment_confirmed_at.is_none());
    assert!(fixture
        .payment_events()
        .await
        .iter()
        .all(|e| e["eventType"] != "payment_confirmed"));
}

#[tokio::test]
async fn test_paid_is_terminal() {
    let fixture = TestFixture::new().await;
    fixture.put_settings(json!({ "payment_enabled": true })).await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let id = member_id(&created, 0);

    let (status, _) = fixture
        .post_json(
            &fixture.admin,
            &format!("/api/admin/members/{}/check-in", id),
            json!({ "paymentTier": "asso_member" }),
        )
        .await;
    assert_eq!(status, 200);

    let (status, _) = fixture
        .post_json(&fixture.client, "/api/payments/delayed", json!({ "memberId": id }))
        .await;
    assert_eq!(status, 400);
    let (status, _) = fixture
        .post_json(&fixture.client, "/api/payments/checkout", json!({ "memberId": id }))
        .await;
    assert_eq!(status, 400);

    assert_eq!(
        fixture.repo.get_member(&id).await.unwrap().payment_status.as_str(),
        "paid"
    );
}

// ========== Attendance ==========

#[tokio::test]
async fn test_check_in_collects_on_site_payment() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .create_team(
            "Lambda",
            "secret-pass",
            vec![person("Alice", "Martin", true), person("Bob", "Durand", false)],
        )
        .await;
    let alice = member_id(&created, 0);
    let bob = member_id(&created, 1);

    fixture
        .post_json(&fixture.client, "/api/payments/delayed", json!({ "memberId": alice }))
        .await;

    let check_in = format!("/api/admin/members/{}/check-in", alice);

    // Unknown tier
    let (status, _) = fixture
        .post_json(&fixture.admin, &check_in, json!({ "paymentTier": "vip" }))
        .await;
    assert_eq!(status, 400);

    // Skipping payment needs a paid member
    let (status, _) = fixture
        .post_json(&fixture.admin, &check_in, json!({ "skipPayment": true }))
        .await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .post_json(&fixture.admin, &check_in, json!({ "paymentTier": "asso_member" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["checkedIn"], true);
    assert_eq!(body["data"]["paymentStatus"], "paid");
    assert_eq!(body["data"]["paymentMethod"], "on_site");
    assert_eq!(body["data"]["paymentAmount"], 500);
    assert_eq!(body["data"]["paymentTier"], "asso_member");
    assert_eq!(body["data"]["registrationTier"], "tier2");

    // Already checked in
    let (status, _) = fixture
        .post_json(&fixture.admin, &check_in, json!({ "paymentTier": "asso_member" }))
        .await;
    assert_eq!(status, 400);

    // Check-out keeps the payment
    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            &format!("/api/admin/members/{}/check-out", alice),
            json!({}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["checkedIn"], false);
    assert_eq!(body["data"]["paymentStatus"], "paid");

    // Paid members come back in without paying again
    let (status, _) = fixture
        .post_json(&fixture.admin, &check_in, json!({ "paymentTier": "asso_member" }))
        .await;
    assert_eq!(status, 400);
    let (status, body) = fixture
        .post_json(&fixture.admin, &check_in, json!({ "skipPayment": true }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["checkedIn"], true);
    assert_eq!(body["data"]["paymentAmount"], 500);

    // Organisation tier is free, straight from unpaid
    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            &format!("/api/admin/members/{}/check-in", bob),
            json!({ "paymentTier": "organisation" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["paymentAmount"], 0);

    let collected: Vec<Value> = fixture
        .payment_events()
        .await
        .into_iter()
        .filter(|e| e["eventType"] == "payment_collected")
        .collect();
    assert_eq!(collected.len(), 2);
    assert_eq!(collected[0]["amount"], 500);
    assert_eq!(collected[0]["tier"], "asso_member");
}

#[tokio::test]
async fn test_abandoned_checkout_pays_at_check_in() {
    let fixture = TestFixture::new().await;
    fixture.put_settings(json!({ "payment_enabled": true })).await;
    let created = fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    let id = member_id(&created, 0);

    let (_, body) = fixture
        .post_json(&fixture.client, "/api/payments/checkout", json!({ "memberId": id }))
        .await;
    let checkout_id = body["data"]["checkoutId"].as_str().unwrap().to_string();
    assert_eq!(
        fixture.repo.get_member(&id).await.unwrap().payment_status.as_str(),
        "pending"
    );

    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            &format!("/api/admin/members/{}/check-in", id),
            json!({ "paymentTier": "asso_member" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["checkedIn"], true);
    assert_eq!(body["data"]["paymentStatus"], "paid");
    assert_eq!(body["data"]["paymentMethod"], "on_site");
    assert_eq!(body["data"]["paymentAmount"], 500);

    let collected: Vec<Value> = fixture
        .payment_events()
        .await
        .into_iter()
        .filter(|e| e["eventType"] == "payment_collected")
        .collect();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0]["metadata"]["previousStatus"], "pending");
    assert_eq!(collected[0]["metadata"]["abandonedCheckoutId"], checkout_id.as_str());

    // A late settlement of the old checkout does not pay twice
    fixture.mock.settle(&checkout_id);
    let (_, body) = fixture
        .get_json(&fixture.client, &format!("/api/payments/verify/{}", checkout_id))
        .await;
    assert_eq!(body["data"]["paymentStatus"], "paid");
    assert_eq!(body["data"]["paymentAmount"], 500);
    assert!(fixture
        .payment_events()
        .await
        .iter()
        .all(|e| e["eventType"] != "payment_confirmed"));
}

#[tokio::test]
async fn test_batch_attendance_is_atomic() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .create_team(
            "Lambda",
            "secret-pass",
            vec![person("Alice", "Martin", true), person("Bob", "Durand", false)],
        )
        .await;
    let alice = member_id(&created, 0);
    let bob = member_id(&created, 1);

    // One unknown member aborts the whole batch
    let (status, _) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/members/batch/check-in",
            json!({ "items": [
                { "memberId": alice, "paymentTier": "asso_member" },
                { "memberId": "ghost", "paymentTier": "asso_member" },
            ] }),
        )
        .await;
    assert_eq!(status, 404);
    assert!(!fixture.repo.get_member(&alice).await.unwrap().checked_in);

    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/members/batch/check-in",
            json!({ "items": [
                { "memberId": alice, "paymentTier": "asso_member" },
                { "memberId": bob, "paymentTier": "organisation", "paymentAmount": 0 },
            ] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/members/batch/pizza",
            json!({ "memberIds": [alice, bob] }),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .all(|m| m["pizzaReceived"] == true && m["pizzaReceivedAt"].is_string()));

    let (status, _) = fixture
        .post_json(
            &fixture.admin,
            &format!("/api/admin/members/{}/pizza/revoke", bob),
            json!({}),
        )
        .await;
    assert_eq!(status, 200);
    let bob_member = fixture.repo.get_member(&bob).await.unwrap();
    assert!(!bob_member.pizza_received);
    assert!(bob_member.pizza_received_at.is_none());

    let (status, _) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/members/batch/check-out",
            json!({ "memberIds": [alice, bob] }),
        )
        .await;
    assert_eq!(status, 200);
    assert!(!fixture.repo.get_member(&alice).await.unwrap().checked_in);
}

// ========== Admin CRUD ==========

#[tokio::test]
async fn test_admin_team_crud() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/teams",
            json!({ "name": "Gamma", "password": "gamma-pass", "description": "Third" }),
        )
        .await;
    assert_eq!(status, 201);
    let team_id = body["data"]["id"].as_str().unwrap().to_string();

    let resp = fixture
        .admin
        .put(fixture.url(&format!("/api/admin/teams/{}/room", team_id)))
        .json(&json!({ "room": " B204 " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["room"], "B204");

    let resp = fixture
        .admin
        .put(fixture.url(&format!("/api/admin/teams/{}", team_id)))
        .json(&json!({ "name": "Delta", "password": "delta-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(fixture
        .repo
        .verify_team_password(&team_id, "delta-pass")
        .await
        .unwrap());
    assert!(!fixture
        .repo
        .verify_team_password(&team_id, "gamma-pass")
        .await
        .unwrap());

    let resp = fixture
        .join_team(&team_id, "delta-pass", vec![person("Alice", "Martin", false)])
        .await;
    assert_eq!(resp.status(), 201);

    // Organisation is protected
    let org_id = fixture.organisation_id().await;
    let resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/admin/teams/{}", org_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Deleting a team removes its members
    let resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/admin/teams/{}", team_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(fixture.repo.list_members().await.unwrap().is_empty());

    let (status, _) = fixture
        .get_json(&fixture.client, &format!("/api/teams/{}", team_id))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_admin_member_crud() {
    let fixture = TestFixture::new().await;
    fixture.put_settings(json!({ "max_team_size": 2 })).await;
    let lambda = fixture
        .create_team(
            "Lambda",
            "secret-pass",
            vec![person("Alice", "Martin", true), person("Bob", "Durand", false)],
        )
        .await;
    let omega = fixture
        .create_team("Omega", "secret-pass", vec![person("Carl", "Petit", true)])
        .await;
    let lambda_id = lambda["team"]["id"].as_str().unwrap().to_string();
    let omega_id = omega["team"]["id"].as_str().unwrap().to_string();
    let carl = member_id(&omega, 0);

    // Lambda is full
    let mut body = person("Dana", "Roux", false);
    body["teamId"] = json!(lambda_id);
    let (status, _) = fixture
        .post_json(&fixture.admin, "/api/admin/members", body)
        .await;
    assert_eq!(status, 409);

    let update = |payload: Value| {
        let admin = fixture.admin.clone();
        let url = fixture.url(&format!("/api/admin/members/{}", carl));
        async move { admin.put(url).json(&payload).send().await.unwrap() }
    };

    // Moving into a full team is refused
    let resp = update(json!({ "teamId": lambda_id })).await;
    assert_eq!(resp.status(), 409);

    // Renaming onto an existing person is refused
    let resp = update(json!({ "firstName": "alice", "lastName": "MARTIN" })).await;
    assert_eq!(resp.status(), 409);

    let resp = update(json!({ "bacLevel": 5, "foodDiet": "vegan" })).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["bacLevel"], 5);
    assert_eq!(body["data"]["foodDiet"], "vegan");
    assert_eq!(body["data"]["teamId"], omega_id);

    let resp = update(json!({ "bacLevel": 12 })).await;
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/admin/members/{}", carl)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/admin/members/{}", carl)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ========== Settings ==========

#[tokio::test]
async fn test_settings_validation() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.get_json(&fixture.admin, "/api/admin/settings").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["max_team_size"], "6");
    assert_eq!(body["data"]["late_cutoff_time"], "20:00");

    let rejected = vec![
        json!({ "max_team_size": 0 }),
        json!({ "late_cutoff_time": "25:00" }),
        json!({ "registration_deadline": "soon" }),
        json!({ "unknown_key": 1 }),
        json!({ "min_team_size": 7 }),
        json!({}),
    ];
    for payload in rejected {
        let resp = fixture
            .admin
            .put(fixture.url("/api/admin/settings"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "accepted {payload}");
    }

    // A rejected batch writes nothing
    let resp = fixture
        .admin
        .put(fixture.url("/api/admin/settings"))
        .json(&json!({ "price_late": 1200, "max_team_size": -3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .admin
        .put(fixture.url("/api/admin/settings"))
        .json(&json!({ "price_late": "1200", "payment_enabled": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["price_late"], "1200");
    assert_eq!(body["data"]["payment_enabled"], "true");
}

// ========== Exports ==========

#[tokio::test]
async fn test_exports() {
    let fixture = TestFixture::new().await;
    fixture
        .create_team(
            "Lambda",
            "secret-pass",
            vec![
                json!({
                    "firstName": "Alice",
                    "lastName": "de la Tour",
                    "email": "alice@example.org",
                    "bacLevel": 2,
                    "isLeader": true,
                }),
                json!({
                    "firstName": "=HYPERLINK(\"x\")",
                    "lastName": "Durand",
                    "email": "bob@example.org",
                    "bacLevel": 1,
                    "isLeader": false,
                }),
            ],
        )
        .await;
    let org_id = fixture.organisation_id().await;
    let mut staff = person("Staff", "Member", false);
    staff["teamId"] = json!(org_id);
    fixture
        .post_json(&fixture.admin, "/api/admin/members", staff)
        .await;

    let resp = fixture
        .admin
        .get(fixture.url("/api/admin/export/standard"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let bytes = resp.bytes().await.unwrap();
    assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    assert_eq!(text.lines().count(), 4);
    assert!(text.contains("\"'=HYPERLINK(\"\"x\"\")\""));

    let resp = fixture
        .admin
        .get(fixture.url("/api/admin/export/official"))
        .send()
        .await
        .unwrap();
    let text = resp.text().await.unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l.split(';').count() == 7));
    assert_eq!(lines[0], "Prénom;Nom;Email;Niveau bac;Equipe;Chef d'équipe;Etablissement");
    assert!(lines.contains(&"Alice;DE LA TOUR;alice@example.org;2;Lambda;1;Lycée Pasteur"));
    assert!(!text.contains("Staff"));
}

// ========== Archives & reset ==========

#[tokio::test]
async fn test_archive_requires_data_and_unique_year() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post_json(&fixture.admin, "/api/admin/archives", json!({ "eventYear": 2026 }))
        .await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "NO_DATA");

    fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;

    let (status, _) = fixture
        .post_json(&fixture.admin, "/api/admin/archives", json!({ "eventYear": 2026 }))
        .await;
    assert_eq!(status, 201);

    let (status, body) = fixture
        .post_json(&fixture.admin, "/api/admin/archives", json!({ "year": 2026 }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "DUPLICATE");

    let (status, body) = fixture.get_json(&fixture.admin, "/api/admin/archives/2031").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_archive_content_and_export() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .create_team(
            "Lambda",
            "secret-pass",
            vec![person("Alice", "Martin", true), person("Bob", "Durand", false)],
        )
        .await;
    fixture
        .create_team("Omega", "secret-pass", vec![person("Carl", "Petit", true)])
        .await;
    let alice = member_id(&created, 0);
    fixture
        .post_json(
            &fixture.admin,
            &format!("/api/admin/members/{}/check-in", alice),
            json!({ "paymentTier": "asso_member", "paymentAmount": 750 }),
        )
        .await;

    let (status, body) = fixture
        .post_json(&fixture.admin, "/api/admin/archives", json!({ "eventYear": 2025 }))
        .await;
    assert_eq!(status, 201);
    let summary = body["data"].clone();
    assert_eq!(summary["eventYear"], 2025);
    assert_eq!(summary["totalTeams"], 3);
    assert_eq!(summary["totalParticipants"], 3);
    assert_eq!(summary["isExpired"], false);
    assert_eq!(summary["dataHash"].as_str().unwrap().len(), 64);
    assert!(summary.get("membersBlob").is_none());

    let (status, body) = fixture.get_json(&fixture.admin, "/api/admin/archives/2025").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["integrityOk"], true);
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 3);
    assert!(!body["data"]["teams"].to_string().contains("$2"));

    let (_, body) = fixture
        .get_json(&fixture.admin, "/api/admin/archives/2025/export")
        .await;
    let export = &body["data"];
    assert_eq!(
        export["teams"].as_array().unwrap().len() as i64,
        export["metadata"]["totalTeams"].as_i64().unwrap()
    );
    assert_eq!(export["participants"].as_array().unwrap().len(), 3);
    assert!(export["readme"].as_str().unwrap().contains("2025"));

    let archive = fixture.repo.export_archive(2025).await.unwrap();
    assert_eq!(archive.statistics.total_revenue, 750);
    assert_eq!(archive.statistics.onsite_revenue, 750);
    assert_eq!(archive.statistics.paid, 1);
    assert_eq!(archive.statistics.checked_in, 1);

    let (_, list) = fixture.get_json(&fixture.admin, "/api/admin/archives").await;
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_expiration_anonymizes_archive() {
    let fixture = TestFixture::new().await;
    fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    fixture
        .post_json(&fixture.admin, "/api/admin/archives", json!({ "eventYear": 2024 }))
        .await;

    // Nothing expires today
    let (status, body) = fixture
        .post_json(&fixture.admin, "/api/admin/archives/check-expiration", json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!({ "checked": 1, "expired": 0, "updated": 0 }));

    let later = Utc::now() + Duration::days(365 * 3 + 2);
    let report = fixture.repo.check_expiration(later).await.unwrap();
    assert_eq!((report.checked, report.expired, report.updated), (1, 1, 1));

    let detail = fixture.repo.get_archive(2024).await.unwrap();
    assert!(detail.summary.is_expired);
    assert!(detail.integrity_ok);
    let members = detail.members.to_string();
    assert!(!members.contains("Martin"));
    assert!(!members.contains("alice.martin@example.org"));
    assert_eq!(detail.members[0]["bacLevel"], 2);

    // Second sweep finds it already flagged
    let report = fixture.repo.check_expiration(later).await.unwrap();
    assert_eq!((report.checked, report.expired, report.updated), (1, 1, 0));
}

#[tokio::test]
async fn test_reset_requires_phrase_and_archive() {
    let fixture = TestFixture::new().await;
    fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;

    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/reset",
            json!({ "confirmation": "delete all data", "force": true }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "CONFIRMATION_REQUIRED");
    assert_eq!(fixture.repo.list_members().await.unwrap().len(), 1);

    let (status, body) = fixture.get_json(&fixture.admin, "/api/admin/reset/check").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["safe"], false);
    assert_eq!(body["data"]["archiveExists"], false);
    assert_eq!(body["data"]["counts"]["teams"], 1);
    assert_eq!(body["data"]["counts"]["members"], 1);

    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/reset",
            json!({ "confirmation": RESET_CONFIRMATION_PHRASE }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["outcome"], "warning");
    assert_eq!(body["data"]["warning"], "no_archive");
    assert_eq!(fixture.repo.list_members().await.unwrap().len(), 1);

    let year = Utc::now().year();
    fixture
        .post_json(&fixture.admin, "/api/admin/archives", json!({ "eventYear": year }))
        .await;
    let (_, body) = fixture.get_json(&fixture.admin, "/api/admin/reset/check").await;
    assert_eq!(body["data"]["safe"], true);

    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/reset",
            json!({ "confirmation": RESET_CONFIRMATION_PHRASE }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["outcome"], "deleted");
    assert_eq!(body["data"]["deleted"]["teams"], 1);
    assert_eq!(body["data"]["deleted"]["members"], 1);

    // Organisation survives and the archive is untouched
    let (_, teams) = fixture.get_json(&fixture.client, "/api/teams").await;
    assert_eq!(teams["data"].as_array().unwrap().len(), 1);
    assert_eq!(teams["data"][0]["name"], "Organisation");
    assert!(fixture.repo.get_archive(year).await.unwrap().integrity_ok);
}

#[tokio::test]
async fn test_forced_reset_without_archive() {
    let fixture = TestFixture::new().await;
    fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;
    fixture
        .post_json(&fixture.client, "/api/payments/delayed", json!({
            "memberId": fixture.repo.list_members().await.unwrap()[0].id,
        }))
        .await;

    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/reset",
            json!({ "confirmation": RESET_CONFIRMATION_PHRASE, "force": true }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["outcome"], "deleted");
    assert_eq!(body["data"]["deleted"]["paymentEvents"], 1);
    assert!(fixture.payment_events().await.is_empty());
}

#[tokio::test]
async fn test_reset_decides_on_current_data() {
    let fixture = TestFixture::new().await;

    // Nothing to lose yet
    let (_, body) = fixture.get_json(&fixture.admin, "/api/admin/reset/check").await;
    assert_eq!(body["data"]["safe"], true);

    // Data arrives between the check and the reset
    fixture
        .create_team("Lambda", "secret-pass", vec![person("Alice", "Martin", true)])
        .await;

    let (status, body) = fixture
        .post_json(
            &fixture.admin,
            "/api/admin/reset",
            json!({ "confirmation": RESET_CONFIRMATION_PHRASE }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["outcome"], "warning");
    assert_eq!(body["data"]["warning"], "no_archive");
    assert_eq!(fixture.repo.list_members().await.unwrap().len(), 1);
    let (_, teams) = fixture.get_json(&fixture.client, "/api/teams").await;
    assert_eq!(teams["data"].as_array().unwrap().len(), 2);

    // With nothing live the reset goes through without an archive
    let empty = TestFixture::new().await;
    let (status, body) = empty
        .post_json(
            &empty.admin,
            "/api/admin/reset",
            json!({ "confirmation": RESET_CONFIRMATION_PHRASE }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["outcome"], "deleted");
    assert_eq!(body["data"]["deleted"]["members"], 0);
}
