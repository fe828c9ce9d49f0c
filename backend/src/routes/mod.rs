//! Route definitions for the POS inventory API

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::{
    handlers,
    middleware::{auth_middleware, csrf_middleware},
    AppState,
};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        .merge(protected_routes(state))
}

/// Everything behind a session. Auth runs first, then the CSRF check.
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/session/csrf-token", get(handlers::get_csrf_token))
        .nest("/containers", container_routes())
        .nest("/financials", financial_routes())
        .nest("/transfers", transfer_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), csrf_middleware))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Container intake and processing routes
fn container_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_containers).post(handlers::create_container))
        .route("/preview", post(handlers::preview_container))
        .route(
            "/:container_id",
            get(handlers::get_container)
                .put(handlers::update_container)
                .delete(handlers::delete_container),
        )
        .route("/:container_id/items", post(handlers::add_container_item))
        .route("/:container_id/items/:item_id", delete(handlers::remove_container_item))
        .route("/:container_id/receive", post(handlers::receive_container))
        .route("/:container_id/process", post(handlers::process_container))
        .route("/:container_id/financials", get(handlers::get_container_financials))
        .route(
            "/:container_id/financials/recalculate",
            post(handlers::recalculate_container_financials),
        )
}

/// Financial roll-up routes (admin)
fn financial_routes() -> Router<AppState> {
    Router::new()
        .route("/overview", get(handlers::get_financial_overview))
        .route("/periods", get(handlers::get_period_rollup))
        .route("/suppliers", get(handlers::get_supplier_rollup))
}

/// Transfer shipment routes
fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_transfers).post(handlers::create_transfer))
        .route("/:shipment_id", get(handlers::get_transfer))
        .route("/:shipment_id/ship", post(handlers::ship_transfer))
        .route("/:shipment_id/receive", post(handlers::receive_transfer))
        .route("/:shipment_id/cancel", post(handlers::cancel_transfer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Config, DatabaseConfig, InventoryConfig, LoggingConfig, ServerConfig, SessionConfig,
    };
    use crate::middleware::{auth::Claims, csrf_token};
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use jsonwebtoken::{encode, EncodingKey, Header};
    use rust_decimal::Decimal;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const JWT_SECRET: &str = "jwt-test-secret";
    const CSRF_SECRET: &str = "csrf-test-secret";

    fn test_app() -> Router {
        let config = Config {
            environment: "test".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/pos_inventory_test".to_string(),
                max_connections: 1,
                min_connections: 0,
            },
            session: SessionConfig {
                jwt_secret: JWT_SECRET.to_string(),
                csrf_secret: CSRF_SECRET.to_string(),
            },
            inventory: InventoryConfig {
                barcode_prefix: "2".to_string(),
                default_page_size: 25,
                max_page_size: 200,
            },
            logging: LoggingConfig::default(),
        };
        // Never connects unless a handler touches the database
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        let state = AppState {
            db,
            config: Arc::new(config),
        };
        Router::new()
            .nest("/api/v1", api_routes(state.clone()))
            .with_state(state)
    }

    fn session(role: &str) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            permissions: vec![],
            exp: now + 600,
            iat: now,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap();
        (user_id, token)
    }

    async fn send(app: Router, request: Request<Body>) -> serde_json::Value {
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn preview_body() -> Body {
        Body::from(
            r#"{"total_weight_kg":"100","base_cost":"1000","shipment_cost":"50","amount_paid":"0","profit_margin_percentage":"20"}"#,
        )
    }

    #[tokio::test]
    async fn test_missing_session_is_rejected() {
        let request = Request::builder()
            .uri("/api/v1/containers")
            .body(Body::empty())
            .unwrap();
        let body = send(test_app(), request).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_mutation_without_csrf_token_is_rejected() {
        let (_, token) = session("admin");
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/containers/preview")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(preview_body())
            .unwrap();
        let body = send(test_app(), request).await;
        assert_eq!(body["code"], "INVALID_CSRF_TOKEN");
    }

    #[tokio::test]
    async fn test_preview_with_session_and_csrf() {
        let (user_id, token) = session("manager");
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/containers/preview")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header("x-csrf-token", csrf_token(CSRF_SECRET, user_id).unwrap())
            .header(header::CONTENT_TYPE, "application/json")
            .body(preview_body())
            .unwrap();
        let body = send(test_app(), request).await;
        assert_eq!(body["success"], true);

        let revenue: Decimal = body["expected_revenue"].as_str().unwrap().parse().unwrap();
        assert_eq!(revenue, Decimal::from(1260));
        let per_kg: Decimal = body["cost_per_kg"].as_str().unwrap().parse().unwrap();
        assert_eq!(per_kg, Decimal::new(1050, 2));
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_path_id_gets_envelope() {
        let (_, token) = session("admin");
        let body = send(test_app(), get("/api/v1/containers/not-a-uuid", &token)).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_query_gets_envelope() {
        let (_, token) = session("admin");
        let body = send(test_app(), get("/api/v1/transfers?page=abc", &token)).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_period_grouping_is_rejected() {
        let (_, token) = session("admin");
        let body = send(test_app(), get("/api/v1/financials/periods?group_by=weekly", &token)).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field"], "group_by");
    }

    #[tokio::test]
    async fn test_clerk_cannot_read_financial_rollups() {
        let (_, token) = session("clerk");
        let request = Request::builder()
            .uri("/api/v1/financials/overview")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let body = send(test_app(), request).await;
        assert_eq!(body["code"], "INSUFFICIENT_PERMISSIONS");
    }
}
