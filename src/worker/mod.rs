pub mod sync_info;
pub mod sync_worker;

pub use sync_info::SyncInfo;
pub use sync_worker::run as run_sync_worker;
