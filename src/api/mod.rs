#[cfg(feature = "swagger")]
pub mod openapi;
pub mod error;
pub mod health;
pub mod microgrid;
pub mod response;

use axum::routing::{get, post};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::Config, controller::AppState};

pub fn router(state: AppState, _cfg: &Config) -> Router {
    let api = Router::new()
        .route("/microgrids/:id/schedule:run", post(microgrid::run_schedule))
        .route("/microgrids/:id/schedule", get(microgrid::get_latest_schedule))
        .route("/microgrids/:id/alerts", get(microgrid::get_alerts))
        .with_state(state.clone());

    let health = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api)
        .merge(health)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(feature = "swagger")]
pub fn with_swagger(app: Router) -> Router {
    use crate::api::openapi::ApiDoc;
    use utoipa_swagger_ui::SwaggerUi;
    app.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
}

#[cfg(feature = "metrics")]
pub fn with_metrics(app: Router) -> Router {
    use axum_prometheus::PrometheusMetricLayer;
    let (layer, handle) = PrometheusMetricLayer::pair();
    app.layer(layer).route("/metrics", axum::routing::get(move || async move { handle.render() }))
}
