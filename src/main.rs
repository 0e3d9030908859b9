use anyhow::Result;
use axum::Router;
use suryadrishti::config::{self, Config};
use suryadrishti::domain;
use suryadrishti::telemetry::{self, init_tracing};
use suryadrishti::{api, controller};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    let app_state = controller::AppState::new(cfg.clone()).await?;
    seed_default_microgrid(&app_state, &cfg).await?;

    let mut app: Router = api::router(app_state.clone(), &cfg);

    #[cfg(feature = "swagger")]
    {
        app = api::with_swagger(app);
    }

    #[cfg(feature = "metrics")]
    {
        app = api::with_metrics(app);
    }

    let addr = cfg.server.socket_addr()?;
    info!(%addr, "starting SuryaDrishti");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}

/// Seeds the `sim` in-memory repository's one microgrid from
/// `[default_microgrid]` so the API has something to schedule against on a
/// fresh start. A `db`-backed deployment owns its own provisioning and skips
/// this entirely.
async fn seed_default_microgrid(state: &controller::AppState, cfg: &Config) -> Result<()> {
    if cfg.database.enabled {
        return Ok(());
    }
    if let Some(repo) = state.repos.store.as_memory() {
        let microgrid_id = uuid::Uuid::nil();
        let profile = domain::system::MicrogridProfile {
            config: cfg.default_microgrid.system_configuration(),
            location: cfg.default_microgrid.location()?,
            solar_capacity_kw: cfg.default_microgrid.solar_capacity_kw,
        };
        repo.seed_config(microgrid_id, profile).await;
        repo.seed_sensor(microgrid_id, cfg.default_microgrid.battery_min_soc).await;
        info!(%microgrid_id, "seeded default microgrid for sim build");
    }
    Ok(())
}
