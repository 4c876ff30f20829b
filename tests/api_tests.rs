use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use banking_api::{
    infrastructure::{init::init_all_services, AppConfig},
    web::routes::create_router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    config: AppConfig,
}

impl TestApp {
    fn new() -> Self {
        let config = AppConfig::default();
        let services = init_all_services(&config).expect("services");
        let router = create_router(services.app_state(), &config.cors_allowed_origins);
        Self { router, config }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, json)
    }

    async fn login_pair(&self, username: &str, password: &str) -> Value {
        let (status, _, body) = self
            .send(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let tokens = self.login_pair(username, password).await;
        tokens["access_token"].as_str().unwrap().to_string()
    }

    async fn register_customer(&self, username: &str, password: &str) {
        let (status, _, body) = self
            .send(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    }

    async fn admin_token(&self) -> String {
        self.login(&self.config.admin_username, &self.config.admin_password)
            .await
    }

    async fn open_account(&self, token: &str, balance: &str, account_type: &str) -> Value {
        let (status, _, body) = self
            .send(
                Method::POST,
                "/api/v1/accounts",
                Some(token),
                Some(json!({
                    "account_number": "DE89370400440532013000",
                    "holder_name": "Emmy Noether",
                    "balance": balance,
                    "account_type": account_type,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
        body
    }
}

fn balance_of(account: &Value) -> Decimal {
    Decimal::from_str(account["balance"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn health_reports_api_version() {
    let app = TestApp::new();
    let (status, headers, body) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(headers.get("x-api-version").unwrap(), "1");
}

#[tokio::test]
async fn accounts_require_a_bearer_token() {
    let app = TestApp::new();

    let (status, headers, _) = app.send(Method::GET, "/api/v1/accounts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers.get("x-api-version").unwrap(), "1");

    let (status, _, _) = app
        .send(Method::GET, "/api/v1/accounts", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn account_lifecycle() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let (status, headers, created) = app
        .send(
            Method::POST,
            "/api/v1/accounts",
            Some(&token),
            Some(json!({
                "account_number": "DE89370400440532013000",
                "holder_name": "Emmy Noether",
                "balance": "150.00",
                "account_type": "checking",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["is_active"], true);
    assert_eq!(headers.get(header::LOCATION).unwrap(), "/api/v1/accounts/1");

    let (status, _, fetched) = app
        .send(Method::GET, "/api/v1/accounts/1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    // Positive balance blocks closing.
    let (status, _, body) = app
        .send(Method::DELETE, "/api/v1/accounts/1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("positive balance"));

    let (status, _, updated) = app
        .send(
            Method::PUT,
            "/api/v1/accounts/1",
            Some(&token),
            Some(json!({
                "account_number": "DE89370400440532013000",
                "holder_name": "Amalie Emmy Noether",
                "balance": "0",
                "account_type": "checking",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["holder_name"], "Amalie Emmy Noether");
    assert_eq!(updated["is_active"], true);

    let (status, _, closed) = app
        .send(Method::DELETE, "/api/v1/accounts/1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["is_active"], false);

    let (status, _, _) = app
        .send(Method::DELETE, "/api/v1/accounts/1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Closed accounts are kept, not removed.
    let (status, _, list) = app
        .send(Method::GET, "/api/v1/accounts", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    for (method, uri) in [
        (Method::GET, "/api/v1/accounts/99"),
        (Method::DELETE, "/api/v1/accounts/99"),
        (Method::POST, "/api/v1/accounts/99/interest"),
    ] {
        let (status, _, _) = app.send(method, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }

    let (status, _, _) = app
        .send(
            Method::PUT,
            "/api/v1/accounts/99",
            Some(&token),
            Some(json!({
                "account_number": "X1",
                "holder_name": "Nobody",
                "balance": "0",
                "account_type": "savings",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn interest_by_account_type() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let savings = app.open_account(&token, "1000", "savings").await;
    let (status, _, outcome) = app
        .send(
            Method::POST,
            &format!("/api/v1/accounts/{}/interest", savings["id"]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance_of(&outcome["account"]), dec!(1040));
    assert_eq!(
        Decimal::from_str(outcome["interest"].as_str().unwrap()).unwrap(),
        dec!(40)
    );

    let card = app.open_account(&token, "500", "credit_card").await;
    let (status, _, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/accounts/{}/interest", card["id"]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("credit_card"));

    let (status, _, rates) = app
        .send(Method::GET, "/api/v1/accounts/interest-rates", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rates.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let (status, _, body) = app
        .send(
            Method::POST,
            "/api/v1/accounts",
            Some(&token),
            Some(json!({
                "account_number": "GB1",
                "holder_name": "",
                "balance": "-10",
                "account_type": "savings",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("holder_name"));
    assert!(error.contains("balance"));

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/accounts",
            Some(&token),
            Some(json!({
                "account_number": "GB1",
                "holder_name": "Kurt",
                "balance": "10",
                "account_type": "pension",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = app
        .send(Method::GET, "/api/v1/accounts/abc", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn customers_cannot_mutate_accounts() {
    let app = TestApp::new();

    let (status, _, user) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "hilbert", "password": "göttingen1900" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["roles"], json!(["customer"]));

    let token = app.login("hilbert", "göttingen1900").await;

    let (status, _, _) = app
        .send(Method::GET, "/api/v1/accounts", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/accounts",
            Some(&token),
            Some(json!({
                "account_number": "GB1",
                "holder_name": "David Hilbert",
                "balance": "10",
                "account_type": "savings",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "hilbert", "password": "another-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn logout_revokes_access_token() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let (status, _, _) = app
        .send(Method::POST, "/api/v1/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = app
        .send(Method::GET, "/api/v1/accounts", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_password_is_unauthorized() {
    let app = TestApp::new();
    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "admin", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cors_allow_list_answers_preflight() {
    let config = AppConfig {
        cors_allowed_origins: vec!["https://bank.example".to_string()],
        ..AppConfig::default()
    };
    let services = init_all_services(&config).unwrap();
    let router = create_router(services.app_state(), &config.cors_allowed_origins);

    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/accounts")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    };

    let allowed = router
        .clone()
        .oneshot(preflight("https://bank.example"))
        .await
        .unwrap();
    assert_eq!(
        allowed
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "https://bank.example"
    );

    let denied = router.oneshot(preflight("https://evil.example")).await.unwrap();
    assert!(denied
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn put_cannot_change_active_flag() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let account = app.open_account(&token, "500", "checking").await;
    let uri = format!("/api/v1/accounts/{}", account["id"]);

    // Deactivating through PUT would skip the positive-balance rule.
    let (status, _, updated) = app
        .send(
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({
                "account_number": "DE89370400440532013000",
                "holder_name": "Emmy Noether",
                "balance": "500",
                "account_type": "checking",
                "is_active": false,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_active"], true);

    let (status, _, _) = app.send(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let emptied = json!({
        "account_number": "DE89370400440532013000",
        "holder_name": "Emmy Noether",
        "balance": "0",
        "account_type": "checking",
    });
    let (status, _, _) = app
        .send(Method::PUT, &uri, Some(&token), Some(emptied))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = app.send(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    // A closed account stays closed.
    let (status, _, reopened) = app
        .send(
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({
                "account_number": "DE89370400440532013000",
                "holder_name": "Emmy Noether",
                "balance": "0",
                "account_type": "checking",
                "is_active": true,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reopened["is_active"], false);
}

#[tokio::test]
async fn put_rejects_negative_balance() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let account = app.open_account(&token, "25", "savings").await;

    let (status, headers, body) = app
        .send(
            Method::PUT,
            &format!("/api/v1/accounts/{}", account["id"]),
            Some(&token),
            Some(json!({
                "account_number": "DE89370400440532013000",
                "holder_name": "Emmy Noether",
                "balance": "-0.01",
                "account_type": "savings",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("balance cannot be negative"));
    assert_eq!(headers.get("x-api-version").unwrap(), "1");

    let (_, _, stored) = app
        .send(
            Method::GET,
            &format!("/api/v1/accounts/{}", account["id"]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(balance_of(&stored), dec!(25));
}

#[tokio::test]
async fn interest_overflow_is_a_bad_request() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let account = app
        .open_account(&token, &Decimal::MAX.to_string(), "savings")
        .await;
    let uri = format!("/api/v1/accounts/{}", account["id"]);

    let (status, _, body) = app
        .send(Method::POST, &format!("{uri}/interest"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("overflow"));

    // The server is still up and the balance untouched.
    let (status, _, stored) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance_of(&stored), Decimal::MAX);
}

#[tokio::test]
async fn customers_are_forbidden_before_body_validation() {
    let app = TestApp::new();
    app.register_customer("noether", "erlangen1882").await;
    let token = app.login("noether", "erlangen1882").await;

    let invalid = json!({
        "account_number": "",
        "holder_name": "",
        "balance": "-10",
        "account_type": "savings",
    });

    let (status, headers, body) = app
        .send(Method::POST, "/api/v1/accounts", Some(&token), Some(invalid.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Insufficient permissions");
    assert_eq!(headers.get("x-api-version").unwrap(), "1");

    let (status, _, _) = app
        .send(Method::PUT, "/api/v1/accounts/1", Some(&token), Some(invalid))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for (method, uri) in [
        (Method::DELETE, "/api/v1/accounts/1"),
        (Method::POST, "/api/v1/accounts/1/interest"),
    ] {
        let (status, _, _) = app.send(method, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn refresh_rotates_tokens_and_logout_ends_session() {
    let app = TestApp::new();
    let tokens = app.login_pair("admin", &app.config.admin_password).await;
    let first_refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    let (status, _, renewed) = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": first_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renewed["token_type"], "Bearer");
    let access = renewed["access_token"].as_str().unwrap().to_string();
    let refresh = renewed["refresh_token"].as_str().unwrap().to_string();

    let (status, _, _) = app
        .send(Method::GET, "/api/v1/accounts", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Refresh tokens are single use.
    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": first_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app
        .send(Method::POST, "/api/v1/auth/logout", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn repeated_bad_passwords_lock_the_user() {
    let app = TestApp::new();
    app.register_customer("gauss", "braunschweig").await;
    let attempts = app.config.auth.max_failed_attempts;

    let wrong = json!({ "username": "gauss", "password": "hannover" });
    for attempt in 1..attempts {
        let (status, _, _) = app
            .send(Method::POST, "/api/v1/auth/login", None, Some(wrong.clone()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "attempt {attempt}");
    }
    let (status, _, body) = app
        .send(Method::POST, "/api/v1/auth/login", None, Some(wrong))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Account is locked");

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "gauss", "password": "braunschweig" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn metrics_count_account_commands() {
    let app = TestApp::new();
    let token = app.admin_token().await;
    let account = app.open_account(&token, "10", "savings").await;

    let (status, _, _) = app
        .send(
            Method::DELETE,
            &format!("/api/v1/accounts/{}", account["id"]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, headers, metrics) = app.send(Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-api-version").unwrap(), "1");
    assert_eq!(
        metrics,
        json!({ "commands_processed": 2, "commands_failed": 1, "rule_violations": 1 })
    );
}

#[tokio::test]
async fn nested_error_responses_carry_api_version() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let (status, headers, body) = app
        .send(Method::GET, "/api/v1/accounts/42", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Account 42 not found");
    assert_eq!(headers.get("x-api-version").unwrap(), "1");

    let (status, headers, _) = app
        .send(Method::POST, "/api/v1/accounts/42/interest", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers.get("x-api-version").unwrap(), "1");

    let (status, headers, _) = app
        .send(Method::GET, "/api/v1/accounts/not-a-number", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers.get("x-api-version").unwrap(), "1");
}
