//! # keydeck-runtime
//!
//! Connection and routing runtime for keydeck plugins.
//!
//! - [`Connection`]: one WebSocket session with the host (registration,
//!   receive loop, serialized writes, close handshake)
//! - [`Dispatcher`]: runs handler work on tokio tasks with fault isolation and
//!   an in-flight counter for drain
//! - [`ActionRouter`]: action UUID → factory, the instance table, and the
//!   static event → handler table
//! - [`PluginRuntime`]: wires the three together and drives one session
//!
//! ```text
//! host ──ws──▶ Connection ──decode──▶ ActionRouter ──▶ Dispatcher ──▶ Action
//!   ▲                                                                  │
//!   └──────────── writer task ◀── encode ◀── CommandSink ◀─────────────┘
//! ```

#![deny(unsafe_code)]

pub mod action;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod plugin;
pub mod router;
pub mod runtime;
pub mod shutdown;
pub mod sink;
pub mod testutil;

pub use action::{Action, ActionContext, HandlerResult};
pub use connection::{Connection, ConnectionState, EventListener};
pub use dispatcher::Dispatcher;
pub use errors::{CommandError, ConnectionError, DispatchError, HandlerError, RouterError};
pub use plugin::{LiveContexts, NoopPluginHandler, PluginContext, PluginHandler};
pub use router::{ActionFactory, ActionRouter, RouterBuilder};
pub use runtime::{ExitReason, PluginRuntime, RunReport, RunningPlugin};
pub use shutdown::ShutdownCoordinator;
pub use sink::CommandSink;
