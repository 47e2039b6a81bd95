//! Background workers (spec §9): long-running loops spawned once at
//! startup, grounded on the teacher's `jobs/` interval-ticker workers.

pub mod changestream_poll;
pub mod ttl_sweep;

pub use changestream_poll::run_changestream_worker;
pub use ttl_sweep::run_ttl_sweep_worker;
