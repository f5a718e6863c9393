//! keel daemon: message bus, file plugin and inbox watcher.

pub mod bus;
mod error;
pub mod inbox;
pub mod plugin;
mod runtime;

pub use bus::{BusHandle, Message, MessagePipe, Plugin, PluginInfo, RunningPipe, Topic};
pub use error::DaemonError;
pub use plugin::FilePlugin;
pub use runtime::{init_tracing, run, start_blocking, transfer_client, Agent};
