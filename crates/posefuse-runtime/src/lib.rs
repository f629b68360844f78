//! `posefuse-runtime` – runs the fusion filter inside a process.
//!
//! # Modules
//!
//! - [`fusion_module`] – [`start_location_fusion`][fusion_module::start_location_fusion]:
//!   spawns the tokio tasks that feed odometry and beacon channels into a
//!   shared [`ParticleFilter`][posefuse_filter::ParticleFilter] and forward
//!   the fused pose.  [`start_location_fusion_from`][fusion_module::start_location_fusion_from]
//!   builds the filter, bus and output channel from a [`RuntimeConfig`][config::RuntimeConfig].
//! - [`config`] – [`RuntimeConfig`][config::RuntimeConfig]: reads and writes
//!   `~/.posefuse/config.toml`, with `POSEFUSE_*` environment overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod config;
pub mod fusion_module;
pub mod telemetry;

pub use config::RuntimeConfig;
pub use fusion_module::{
    LocationFusionHandle, LocationFusionModule, start_location_fusion, start_location_fusion_from,
};
pub use telemetry::{TracerProviderGuard, init_tracing, init_tracing_for};
