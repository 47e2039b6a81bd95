//! Ambient HTTP middleware: request logging and per-IP rate limiting,
//! applied to the ingest webhook and login endpoints.

pub mod logging;
pub mod rate_limit;
