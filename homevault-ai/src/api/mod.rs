//! HTTP API handlers for homevault-ai
//!
//! REST endpoints plus SSE streams for batch progress.

pub mod analyze;
pub mod assets;
pub mod batches;
pub mod health;
pub mod multipart;
pub mod policy;
pub mod settings;
pub mod sse;

pub use analyze::analyze_routes;
pub use assets::asset_routes;
pub use batches::batch_routes;
pub use health::health_routes;
pub use policy::policy_routes;
pub use settings::settings_routes;
pub use sse::event_routes;
