//! Websocket Command Server (spec §4.F, §4.G, §4.H): token-gated
//! upgrade, connection bookkeeping, and the per-frame command dispatch
//! loop.

pub mod auth;
pub mod commands;
pub mod registry;
pub mod websocket;
