use axum::{
    Router,
    routing::{get, post, put},
};
use benchmarks::{BenchmarkCache, CachePolicy};
use configuration::{Config, ConfigError};
use database::{BenchmarkStore, CustomerStore, LedgerStore, PercentileStore, SnapshotStore};
use ledger::MovementRecorder;
use percentiles::PercentileCalculator;
use snapshots::SnapshotGenerator;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

/// The shared application state that all handlers can access.
pub struct AppState {
    pub recorder: Arc<MovementRecorder>,
    pub snapshots: Arc<SnapshotGenerator>,
    pub benchmarks: Arc<BenchmarkCache>,
    pub percentiles: Arc<PercentileCalculator>,
}

impl AppState {
    /// Wires every service over one backend that implements all the stores.
    pub fn from_store<S>(store: Arc<S>, config: &Config) -> Result<Self, ConfigError>
    where
        S: CustomerStore + LedgerStore + SnapshotStore + BenchmarkStore + PercentileStore + 'static,
    {
        let policy = CachePolicy::from_settings(&config.benchmarks)?;
        let benchmarks = Arc::new(BenchmarkCache::new(store.clone(), store.clone(), policy));
        Ok(Self {
            recorder: Arc::new(MovementRecorder::new(store.clone(), store.clone())),
            snapshots: Arc::new(SnapshotGenerator::new(store.clone(), store.clone(), store.clone())),
            percentiles: Arc::new(PercentileCalculator::new(
                store.clone(),
                store,
                benchmarks.clone(),
                config.benchmarks.min_confidence_sample,
            )),
            benchmarks,
        })
    }
}

/// Builds the application router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/snapshots", get(handlers::list_snapshots))
        .route("/api/snapshots/:period", get(handlers::get_snapshot))
        .route("/api/snapshots/:period/generate", post(handlers::generate_snapshot))
        .route("/api/benchmarks/:metric", get(handlers::get_benchmark))
        .route("/api/benchmarks/:metric/refresh", post(handlers::refresh_benchmark))
        .route("/api/customers/:customer_id/percentiles/:metric", get(handlers::get_percentile))
        .route("/api/customers/:customer_id/percentiles/:metric/history", get(handlers::percentile_history))
        .route("/api/customers/:customer_id/movements", get(handlers::customer_movements))
        .route("/api/customers/:customer_id/arr", put(handlers::write_arr))
        .route("/api/movements", get(handlers::period_movements))
        .route("/api/arr-events", post(handlers::arr_event))
        .with_state(state)
        .layer(cors)
        // This middleware will automatically log information about every incoming request.
        .layer(TraceLayer::new_for_http())
}

/// Binds `addr` and serves the API until `shutdown` resolves.
pub async fn run_server(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use core_types::{Customer, LifecycleStage};
    use database::InMemoryStore;
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn app_with(customers: Vec<Customer>) -> Router {
        let store = Arc::new(InMemoryStore::new());
        for customer in customers {
            store.insert_customer(customer).await;
        }
        let state = AppState::from_store(store, &Config::default()).unwrap();
        router(Arc::new(state))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    fn decimal(value: &Value) -> rust_decimal::Decimal {
        value.as_str().unwrap().parse().unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = send(app_with(vec![]).await, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn missing_snapshot_is_404() {
        let (status, body) = send(app_with(vec![]).await, get("/api/snapshots/2025-03-01")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("2025-03-01"));
    }

    #[tokio::test]
    async fn generated_snapshot_exposes_derived_mrr() {
        let customer = Customer::new(Uuid::new_v4(), "Acme", dec!(120000), LifecycleStage::Active);
        let app = app_with(vec![customer]).await;

        let (status, body) = send(app.clone(), json_request("POST", "/api/snapshots/2025-03-14/generate", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["period"], "2025-03-01");
        assert_eq!(decimal(&body["total_mrr"]), dec!(10000));

        let (status, listed) = send(app, get("/api/snapshots?from=2025-01-01&to=2025-12-01")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_metric_is_400() {
        let (status, _) = send(app_with(vec![]).await, get("/api/benchmarks/vibes")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn benchmark_read_reports_cache_status() {
        let customers = vec![
            Customer::new(Uuid::new_v4(), "A", dec!(10), LifecycleStage::Active),
            Customer::new(Uuid::new_v4(), "B", dec!(30), LifecycleStage::Active),
        ];
        let app = app_with(customers).await;

        let first = app.clone().oneshot(get("/api/benchmarks/arr")).await.unwrap();
        assert_eq!(first.headers()["x-benchmark-status"], "refreshed");
        let second = app.clone().oneshot(get("/api/benchmarks/arr?segment=smb")).await.unwrap();
        assert_eq!(second.headers()["x-benchmark-status"], "refreshed");

        let (status, body) = send(app, get("/api/benchmarks/arr")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decimal(&body["median"]), dec!(20));
        assert_eq!(body["sample_size"], 2);
        assert!(body.get("distribution").is_none());
    }

    #[tokio::test]
    async fn arr_write_records_movement_and_lists_it() {
        let id = Uuid::new_v4();
        let app = app_with(vec![Customer::new(id, "Acme", dec!(50000), LifecycleStage::Active)]).await;

        let (status, body) = send(
            app.clone(),
            json_request(
                "PUT",
                &format!("/api/customers/{id}/arr"),
                json!({ "new_arr": "120000", "occurred_at": "2025-03-10T12:00:00Z", "reason": "upsell" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["movement"]["movement_type"], "expansion");
        assert_eq!(body["movement"]["source"], "upsell");
        assert_eq!(body["customer"]["segment"], "enterprise");

        let (_, listed) = send(app.clone(), get(&format!("/api/customers/{id}/movements"))).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        let (_, in_period) = send(app, get("/api/movements?period=2025-03-01")).await;
        assert_eq!(decimal(&in_period[0]["change_amount"]), dec!(70000));
    }

    #[tokio::test]
    async fn negative_arr_is_400_and_unknown_customer_is_404() {
        let id = Uuid::new_v4();
        let app = app_with(vec![Customer::new(id, "Acme", dec!(10), LifecycleStage::Active)]).await;

        let (status, _) =
            send(app.clone(), json_request("PUT", &format!("/api/customers/{id}/arr"), json!({ "new_arr": "-5" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let stranger = Uuid::new_v4();
        let (status, _) =
            send(app, json_request("PUT", &format!("/api/customers/{stranger}/arr"), json!({ "new_arr": "5" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn arr_event_without_change_is_200_null() {
        let id = Uuid::new_v4();
        let app = app_with(vec![Customer::new(id, "Acme", dec!(10), LifecycleStage::Active)]).await;
        let event = json!({
            "customer_id": id,
            "previous_arr": "10",
            "new_arr": "10",
            "previous_stage": "active",
            "occurred_at": "2025-03-10T12:00:00Z"
        });

        let (status, body) = send(app, json_request("POST", "/api/arr-events", event)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn arr_event_updates_the_mirror_and_a_replay_is_409() {
        let id = Uuid::new_v4();
        let app = app_with(vec![Customer::new(id, "Acme", rust_decimal::Decimal::ZERO, LifecycleStage::New)]).await;
        let event = json!({
            "customer_id": id,
            "previous_arr": "0",
            "new_arr": "50000",
            "previous_stage": "new",
            "occurred_at": "2025-03-10T12:00:00Z"
        });

        let (status, body) = send(app.clone(), json_request("POST", "/api/arr-events", event.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["movement_type"], "new");

        // The mirror already holds 50000, so writing it again records nothing.
        let (status, body) = send(
            app.clone(),
            json_request("PUT", &format!("/api/customers/{id}/arr"), json!({ "new_arr": "50000" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["movement"].is_null());
        assert_eq!(body["customer"]["segment"], "mid-market");
        assert_eq!(decimal(&body["customer"]["arr"]), dec!(50000));

        let (status, _) = send(app.clone(), json_request("POST", "/api/arr-events", event)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, listed) = send(app, get(&format!("/api/customers/{id}/movements"))).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn percentile_route_returns_rank_and_history() {
        let subject = Uuid::new_v4();
        let mut customers: Vec<Customer> = [10, 20, 30, 40, 50]
            .into_iter()
            .map(|arr| Customer::new(Uuid::new_v4(), "peer", rust_decimal::Decimal::from(arr), LifecycleStage::Active))
            .collect();
        customers.push(Customer::new(subject, "Subject", dec!(25), LifecycleStage::Active));
        let app = app_with(customers).await;

        let (status, body) = send(app.clone(), get(&format!("/api/customers/{subject}/percentiles/arr"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["percentile"], 40);
        assert_eq!(body["low_confidence"], false);

        let (status, history) =
            send(app.clone(), get(&format!("/api/customers/{subject}/percentiles/arr/history?limit=5"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);

        let (status, _) = send(app, get(&format!("/api/customers/{subject}/percentiles/arr/history"))).await;
        assert_eq!(status, StatusCode::OK);
    }
}
