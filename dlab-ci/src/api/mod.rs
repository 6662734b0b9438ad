//! HTTP API handlers for dlab-ci

pub mod compendiums;
pub mod health;
pub mod import;
pub mod sse;

pub use compendiums::compendium_routes;
pub use health::health_routes;
pub use import::import_routes;
pub use sse::import_event_stream;
