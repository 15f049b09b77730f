pub mod activity;
pub mod snapshot_store;

pub use activity::ActivityTracker;
pub use snapshot_store::MarketSnapshotStore;
