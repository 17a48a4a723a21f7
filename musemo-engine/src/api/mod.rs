//! HTTP API handlers for musemo-engine

pub mod health;
pub mod ingest;
pub mod predict;
pub mod tracks;

pub use health::health_routes;
pub use ingest::ingest_routes;
pub use predict::predict_routes;
pub use tracks::track_routes;
