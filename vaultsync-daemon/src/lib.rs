//! vaultsync daemon: per-vault auto-sync timers, a settings watcher that
//! re-arms them, a serial sync processor and a Unix socket server.

mod error;
pub mod log_rotation;
pub mod logging;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use protocol::{
    request_reload, request_status, request_stop, request_sync, send_request, DaemonRequest,
    DaemonResponse,
};
pub use runtime::{run, run_with_runner, start_blocking, SyncRecord, VaultCache};
pub use scheduler::Scheduler;
