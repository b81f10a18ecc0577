/// Common test utilities for integration tests
///
/// - Database setup (tests skip when `DATABASE_URL` is not set)
/// - Seeded admin role with the global `*` grant and a user holding it
/// - JWT generation for arbitrary users
/// - JSON request/response helpers

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Duration;
use serde_json::Value;
use sqlx::PgPool;
use steadfast_api::app::{build_router, AppState};
use steadfast_api::config::Config;
use steadfast_shared::auth::jwt::{create_token, Claims};
use steadfast_shared::db::migrations::run_migrations;
use steadfast_shared::db::pool::{create_pool, DatabaseConfig};
use steadfast_shared::models::user::{CreateUser, User, UserResource};
use steadfast_shared::service::pipeline::run_create;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret-with-enough-length";
pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestContext {
    pub db: PgPool,
    pub app: Router,
    pub config: Config,
    pub admin: User,
    pub admin_token: String,
}

impl TestContext {
    /// Connects, migrates, and seeds an admin; `None` without a database
    pub async fn new() -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping");
            return None;
        };

        let db = create_pool(DatabaseConfig {
            url: url.clone(),
            max_connections: 5,
            ..Default::default()
        })
        .await
        .expect("Failed to create pool");
        run_migrations(&db).await.expect("Migrations failed");

        let role_id = seed_role(&db, "*").await;
        let admin = create_user(&db, Some(role_id)).await;
        let admin_token = token_for(&admin);

        let config = Config::for_database(url, JWT_SECRET);
        let app = build_router(AppState::new(db.clone(), config.clone()));

        Some(Self {
            db,
            app,
            config,
            admin,
            admin_token,
        })
    }

    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.admin_token)
    }

    /// Sends a request as the seeded admin
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> Response {
        self.send_as(&self.auth_header(), method, uri, body).await
    }

    pub async fn send_as(
        &self,
        authorization: &str,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", authorization);

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.app.clone().oneshot(request).await.unwrap()
    }
}

/// Creates a role holding one permission (created on first use)
pub async fn seed_role(db: &PgPool, permission: &str) -> Uuid {
    let (resource, action) = permission.split_once(':').unwrap_or(("*", "*"));

    let (permission_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO permissions (name, resource, action)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO UPDATE SET updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(permission)
    .bind(resource)
    .bind(action)
    .fetch_one(db)
    .await
    .unwrap();

    let (role_id,): (Uuid,) =
        sqlx::query_as("INSERT INTO roles (name) VALUES ($1) RETURNING id")
            .bind(format!("role-{}", Uuid::new_v4().simple()))
            .fetch_one(db)
            .await
            .unwrap();

    sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
        .bind(role_id)
        .bind(permission_id)
        .execute(db)
        .await
        .unwrap();

    role_id
}

/// Creates an active user with [`PASSWORD`]
pub async fn create_user(db: &PgPool, role_id: Option<Uuid>) -> User {
    run_create::<UserResource>(
        db,
        None,
        CreateUser {
            email: format!("user-{}@example.com", Uuid::new_v4().simple()),
            name: "Test User".to_string(),
            password: Some(PASSWORD.to_string()),
            role_id,
            ..Default::default()
        },
    )
    .await
    .expect("Failed to create user")
}

pub fn token_for(user: &User) -> String {
    let claims = Claims::new(user.id, user.role_id, Duration::hours(1));
    create_token(&claims, JWT_SECRET).unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Asserts the status, printing the body on mismatch
pub async fn expect_status(response: Response, expected: StatusCode) -> Value {
    let status = response.status();
    let body = json_body(response).await;
    assert_eq!(status, expected, "unexpected response body: {}", body);
    body
}
