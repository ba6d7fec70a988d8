//! Inbound adapters (driving side).

pub mod ndjson;
