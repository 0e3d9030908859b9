#![allow(dead_code)]
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use validator::Validate;

use crate::domain::system::{OptimizationMode, PeakHours, SystemConfiguration};
use crate::domain::types::Location;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub controller: ControllerConfig,

    #[validate(nested)]
    pub database: DatabaseConfig,

    #[validate(nested)]
    pub telemetry: TelemetryConfig,

    /// Seeds the `sim` in-memory repository's one default microgrid on
    /// startup; ignored once a real repository is backing more than one.
    #[validate(nested)]
    pub default_microgrid: DefaultMicrogridConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub enable_cors: bool,

    #[serde(default)]
    pub enable_compression: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("Failed to parse socket address")
    }
}

/// Controller (§6 `run` entry point) defaults applied when a caller omits
/// `horizon_hours`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ControllerConfig {
    #[validate(range(min = 1, max = 48))]
    pub default_horizon_hours: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Database configuration. `enabled = false` keeps the `sim` in-memory
/// repository active even when built with the `db` feature.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub enabled: bool,

    #[validate(length(min = 1))]
    pub url: String,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,

    #[serde(default = "default_db_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub enable_metrics: bool,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Bootstrap values for the `sim` build's single seeded microgrid —
/// mirrors `SystemConfiguration` plus the `MicrogridProfile` site constants,
/// flattened into config-friendly field names.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_default_microgrid_config"))]
pub struct DefaultMicrogridConfig {
    #[validate(range(min = 0.1, max = 1000.0))]
    pub battery_capacity_kwh: f64,

    #[validate(range(min = 0.1, max = 100.0))]
    pub battery_max_charge_kw: f64,

    #[validate(range(min = 0.1, max = 100.0))]
    pub battery_max_discharge_kw: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub battery_min_soc: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub battery_max_soc: f64,

    #[validate(range(min = 0.01, max = 1.0))]
    pub battery_efficiency: f64,

    #[validate(range(min = 0.0, max = 100.0))]
    pub grid_peak_rate_per_kwh: f64,

    #[validate(range(min = 0.0, max = 100.0))]
    pub grid_off_peak_rate_per_kwh: f64,

    pub grid_peak_hour_start: u8,
    pub grid_peak_hour_end: u8,

    #[validate(range(min = 0.0, max = 100.0))]
    pub grid_export_rate_per_kwh: f64,

    #[serde(default)]
    pub grid_export_enabled: bool,

    #[validate(range(min = 0.0, max = 1000.0))]
    pub generator_fuel_cost_per_liter: f64,

    #[validate(range(min = 0.01, max = 10.0))]
    pub generator_fuel_consumption_l_per_kwh: f64,

    #[serde(default)]
    pub generator_min_runtime_minutes: u32,

    #[validate(range(min = 0.1, max = 1000.0))]
    pub generator_max_power_kw: f64,

    #[serde(default = "default_optimization_mode")]
    pub optimization_mode: OptimizationMode,

    #[validate(range(min = 0.0, max = 0.99))]
    pub safety_margin_critical_loads: f64,

    #[validate(range(min = 0.1, max = 1000.0))]
    pub solar_capacity_kw: f64,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude_deg: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude_deg: f64,
}

impl DefaultMicrogridConfig {
    pub fn system_configuration(&self) -> SystemConfiguration {
        SystemConfiguration {
            battery_capacity_kwh: self.battery_capacity_kwh,
            battery_max_charge_kw: self.battery_max_charge_kw,
            battery_max_discharge_kw: self.battery_max_discharge_kw,
            battery_min_soc: self.battery_min_soc,
            battery_max_soc: self.battery_max_soc,
            battery_efficiency: self.battery_efficiency,
            grid_peak_rate_per_kwh: self.grid_peak_rate_per_kwh,
            grid_off_peak_rate_per_kwh: self.grid_off_peak_rate_per_kwh,
            grid_peak_hours: PeakHours { start: self.grid_peak_hour_start, end: self.grid_peak_hour_end },
            grid_export_rate_per_kwh: self.grid_export_rate_per_kwh,
            grid_export_enabled: self.grid_export_enabled,
            generator_fuel_cost_per_liter: self.generator_fuel_cost_per_liter,
            generator_fuel_consumption_l_per_kwh: self.generator_fuel_consumption_l_per_kwh,
            generator_min_runtime_minutes: self.generator_min_runtime_minutes,
            generator_max_power_kw: self.generator_max_power_kw,
            optimization_mode: self.optimization_mode,
            safety_margin_critical_loads: self.safety_margin_critical_loads,
        }
    }

    pub fn location(&self) -> Result<Location> {
        Location::new(self.latitude_deg, self.longitude_deg).map_err(anyhow::Error::msg)
    }
}

/// Cross-field check mirroring `SystemConfiguration::validate` (§3), applied
/// at config-load time so a malformed `default.toml` fails fast at startup
/// rather than on the first scheduling request.
fn validate_default_microgrid_config(
    config: &DefaultMicrogridConfig,
) -> Result<(), validator::ValidationError> {
    if config.battery_max_soc <= config.battery_min_soc {
        return Err(validator::ValidationError::new("battery_max_soc must exceed battery_min_soc"));
    }
    Ok(())
}

fn default_max_connections() -> usize {
    1000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_optimization_mode() -> OptimizationMode {
    OptimizationMode::Cost
}

impl AppConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Configuration is loaded in this order (later overrides earlier):
    /// 1. `config/default.toml` (base configuration)
    /// 2. `config/development.toml` or `config/production.toml` (environment-specific)
    /// 3. Environment variables with the `SURYADRISHTI__` prefix
    pub fn load() -> Result<Self> {
        Self::load_with_env(None)
    }

    pub fn load_with_env(environment: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));

        if let Some(env) = environment {
            let env_file = format!("config/{}.toml", env);
            figment = figment.merge(Toml::file(env_file));
        } else {
            figment = figment.merge(Toml::file("config/development.toml").nested());
        }

        figment = figment.merge(Env::prefixed("SURYADRISHTI__").split("__"));

        let config: AppConfig = figment.extract().context("Failed to parse configuration")?;

        config.validate().context("Configuration validation failed")?;

        Ok(config)
    }

    pub fn validate_config(self) -> Result<Self> {
        self.validate().context("Configuration validation failed")?;
        Ok(self)
    }

    /// An in-process config for unit/integration tests — no files, no env.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                max_connections: default_max_connections(),
                request_timeout_secs: default_request_timeout_secs(),
                enable_cors: false,
                enable_compression: false,
            },
            controller: ControllerConfig { default_horizon_hours: 24, max_retries: default_max_retries() },
            database: DatabaseConfig {
                enabled: false,
                url: "postgres://localhost/suryadrishti_test".into(),
                max_connections: default_db_max_connections(),
                connect_timeout_secs: default_db_timeout_secs(),
            },
            telemetry: TelemetryConfig {
                log_level: default_log_level(),
                log_json: false,
                log_file: None,
                enable_metrics: false,
                metrics_port: default_metrics_port(),
            },
            default_microgrid: DefaultMicrogridConfig {
                battery_capacity_kwh: 10.0,
                battery_max_charge_kw: 3.0,
                battery_max_discharge_kw: 3.0,
                battery_min_soc: 0.10,
                battery_max_soc: 0.95,
                battery_efficiency: 0.95,
                grid_peak_rate_per_kwh: 9.5,
                grid_off_peak_rate_per_kwh: 5.0,
                grid_peak_hour_start: 18,
                grid_peak_hour_end: 22,
                grid_export_rate_per_kwh: 3.0,
                grid_export_enabled: true,
                generator_fuel_cost_per_liter: 95.0,
                generator_fuel_consumption_l_per_kwh: 0.35,
                generator_min_runtime_minutes: 15,
                generator_max_power_kw: 5.0,
                optimization_mode: OptimizationMode::Cost,
                safety_margin_critical_loads: 0.10,
                solar_capacity_kw: 10.0,
                latitude_deg: 28.4595,
                longitude_deg: 77.0266,
            },
        }
    }
}

// Keep backward compatibility with old Config name.
pub type Config = AppConfig;
