//! The plugin runtime: wires connection, dispatcher and router together and
//! drives one session from registration to shutdown.
//!
//! 1. Build a [`PluginRuntime`] and register actions on it
//! 2. [`start`](PluginRuntime::start) connects and registers with the host
//! 3. [`RunningPlugin::wait`] blocks until the host goes away or shutdown is
//!    requested, then drains in-flight handlers, disposes every instance and
//!    closes the socket

use std::fmt;
use std::sync::Arc;

use keydeck_core::RegistrationParameters;
use keydeck_settings::KeydeckSettings;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::action::{Action, ActionContext};
use crate::connection::{Connection, ConnectionState, EventListener};
use crate::dispatcher::Dispatcher;
use crate::errors::{ConnectionError, RouterError};
use crate::plugin::PluginHandler;
use crate::router::{ActionRouter, RouterBuilder};
use crate::shutdown::ShutdownCoordinator;
use crate::sink::CommandSink;

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Shutdown was requested through the token.
    Shutdown,
    /// The host closed the socket cleanly.
    HostClosed,
    /// The transport failed.
    TransportFault,
}

impl ExitReason {
    /// Whether the process should report failure.
    pub fn is_fault(self) -> bool {
        matches!(self, Self::TransportFault)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shutdown => "shutdown",
            Self::HostClosed => "host closed",
            Self::TransportFault => "transport fault",
        })
    }
}

/// Summary of a finished session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Why it ended.
    pub reason: ExitReason,
    /// Whether every in-flight handler finished within the drain timeout.
    pub drained: bool,
    /// Handler faults reported during the session.
    pub faults: u64,
}

/// Configures and starts a plugin.
pub struct PluginRuntime {
    params: RegistrationParameters,
    settings: KeydeckSettings,
    router: RouterBuilder,
    shutdown: ShutdownCoordinator,
}

impl PluginRuntime {
    /// A runtime for the given startup parameters.
    pub fn new(params: RegistrationParameters, settings: KeydeckSettings) -> Self {
        Self {
            params,
            settings,
            router: RouterBuilder::new(),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Register an action factory. See [`RouterBuilder::map_action`].
    pub fn map_action<F, A>(
        &mut self,
        action: impl Into<keydeck_core::ActionUuid>,
        factory: F,
    ) -> Result<&mut Self, RouterError>
    where
        F: Fn(ActionContext) -> A + Send + Sync + 'static,
        A: Action,
    {
        let _ = self.router.map_action(action, factory)?;
        Ok(self)
    }

    /// Handle plugin-level events.
    pub fn plugin_handler(&mut self, handler: impl PluginHandler) -> &mut Self {
        let _ = self.router.plugin_handler(handler);
        self
    }

    /// Token that stops the runtime when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Connect, register and start routing events.
    pub async fn start(self) -> Result<RunningPlugin, ConnectionError> {
        self.params.validate()?;
        let connection = Connection::new(self.params.clone(), self.settings.connection.clone());
        let sink: Arc<dyn CommandSink> = Arc::new(connection.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&sink),
            self.settings.dispatcher.clone(),
        ));
        let router = Arc::new(self.router.build(
            Arc::clone(&dispatcher),
            sink,
            self.params.plugin_uuid.clone(),
            self.shutdown.child_token(),
        ));
        connection.add_listener(Arc::clone(&router) as Arc<dyn EventListener>);

        connection.connect().await?;

        Ok(RunningPlugin {
            connection,
            dispatcher,
            router,
            shutdown: self.shutdown,
            settings: self.settings,
        })
    }

    /// [`start`](Self::start) then [`RunningPlugin::wait`].
    pub async fn run(self) -> Result<RunReport, ConnectionError> {
        Ok(self.start().await?.wait().await)
    }
}

impl fmt::Debug for PluginRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRuntime")
            .field("port", &self.params.port)
            .field("plugin_uuid", &self.params.plugin_uuid)
            .finish_non_exhaustive()
    }
}

/// A connected plugin.
pub struct RunningPlugin {
    connection: Connection,
    dispatcher: Arc<Dispatcher>,
    router: Arc<ActionRouter>,
    shutdown: ShutdownCoordinator,
    settings: KeydeckSettings,
}

impl RunningPlugin {
    /// The live session.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The dispatcher running handlers.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The instance table.
    pub fn router(&self) -> &Arc<ActionRouter> {
        &self.router
    }

    /// Token that stops the runtime when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Wait for the session to end, then drain, dispose and disconnect.
    pub async fn wait(self) -> RunReport {
        let reason = tokio::select! {
            state = self.connection.wait_terminal() => match state {
                ConnectionState::Faulted => ExitReason::TransportFault,
                _ => ExitReason::HostClosed,
            },
            () = self.shutdown.cancelled() => ExitReason::Shutdown,
        };
        info!(%reason, in_flight = self.dispatcher.in_flight(), "plugin stopping");

        let drained = self
            .dispatcher
            .drain(self.settings.dispatcher.drain_timeout())
            .await;
        self.router.dispose_all();
        self.shutdown.shutdown();

        if let Err(e) = self.connection.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }

        let report = RunReport {
            reason,
            drained,
            faults: self.dispatcher.fault_count(),
        };
        info!(?report, "plugin stopped");
        report
    }
}

impl fmt::Debug for RunningPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningPlugin")
            .field("connection", &self.connection)
            .field("dispatcher", &self.dispatcher)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
