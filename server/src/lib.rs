pub mod admin;
pub mod bot;
pub mod changestream;
pub mod enrich;
pub mod error;
pub mod handlers;
pub mod health;
pub mod ingest;
pub mod jobs;
pub mod login;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod store;
pub mod util;
