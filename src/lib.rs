// Library root
// -----------
// Publishes scraped trading-card CSV rows to a self-hosted collection
// tracking API. The binary (`main.rs`) wires these modules together.
//
// Module responsibilities:
// - `config`: settings from TOML plus command line overrides.
// - `credentials`: the `username:` / `password:` file.
// - `api`: HTTP calls to the collection API (auth, create, fields, image).
// - `images`: downloading card images under sanitized file names.
// - `records` / `results`: the input and output CSV files.
// - `profile`: item vs wish payloads and attached fields.
// - `session` / `throttle`: token refresh policy and request pacing.
// - `publisher`: the per-row pipeline.
// - `ui`: terminal prompts, progress and the final summary.
pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod images;
pub mod profile;
pub mod publisher;
pub mod records;
pub mod results;
pub mod session;
#[cfg(test)]
pub(crate) mod test_server;
pub mod throttle;
pub mod ui;

pub use error::{Error, Result};
