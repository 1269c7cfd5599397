//! Node runtime
//!
//! [`SwimNode`] is the public handle. While running it owns:
//! - a UDP [`Transport`](crate::net::Transport);
//! - a mutex-guarded [`Core`] combining the table, dissemination engine,
//!   failure detector, join protocol and metadata store;
//! - background loops (receive, probe, metadata push, cleanup) and timers.
//!
//! All protocol state changes happen inside `Core`, one message or timer at a
//! time. The runtime only performs the [`Effect`](crate::effect::Effect)s it
//! returns.

pub mod state;
pub mod service;
pub mod types;

pub use state::Core;
pub use service::SwimNode;
pub use types::{NodeStatus, WhoAmI};
