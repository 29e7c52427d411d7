//! HTTP surface of the token orchestrator
//!
//! Maps the key store operations onto a small JSON API:
//!
//! - `POST /keys` - issue a key
//! - `GET /keys/:id` - retrieve a valid key's secret
//! - `GET /keys/:id/info` - inspect a key regardless of validity
//! - `DELETE /keys/:id` - remove a key
//! - `PUT /keys/:id` - block or unblock, body `{"blocked": bool}`
//! - `PUT /keys/:id/alive` - engage or renew the key's lease
//! - `GET /health` - liveness and key counts

pub mod config;
pub mod handlers;
pub mod server;

pub use config::{default_config, load_config, CorsConfig, OrchestratorConfig};
pub use handlers::{create_router, ApiError, AppState};
pub use server::{shutdown_signal, start_server};
