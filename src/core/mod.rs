/// Derived statistics and display helpers
pub mod aggregate;
/// Collision-resistant entity ids
pub mod ids;
/// Validated in-memory ledger mutations
pub mod ledger;
/// Transient user-facing messages
pub mod notify;
/// Session orchestrating store, sync and tenants
pub mod session;
/// Optimistic persistence worker
pub mod sync;
/// Named ledgers and the active one
pub mod tenant;
