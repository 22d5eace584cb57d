//! Action router: maps action UUIDs to factories and owns live instances.
//!
//! Routes are registered on a [`RouterBuilder`] at startup and frozen by
//! [`RouterBuilder::build`]. The resulting [`ActionRouter`] listens on the
//! connection's receive loop: table mutations (`willAppear`,
//! `willDisappear`) happen there, in arrival order, and the handler calls
//! are handed to the [`Dispatcher`] so the loop never waits on user code.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keydeck_core::{ActionUuid, ContextId, PluginUuid};
use keydeck_protocol::{EventKind, InboundEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::action::{Action, ActionContext};
use crate::connection::EventListener;
use crate::dispatcher::Dispatcher;
use crate::errors::{HandlerError, RouterError};
use crate::plugin::{LiveContexts, NoopPluginHandler, PluginContext, PluginHandler};
use crate::sink::CommandSink;

/// Builds an action instance for a newly visible context.
pub type ActionFactory = Arc<dyn Fn(ActionContext) -> Arc<dyn Action> + Send + Sync>;

/// Startup-time route registration.
pub struct RouterBuilder {
    routes: HashMap<ActionUuid, ActionFactory>,
    plugin: Arc<dyn PluginHandler>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    /// An empty builder with a no-op plugin handler.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            plugin: Arc::new(NoopPluginHandler),
        }
    }

    /// Register the factory for `action`.
    ///
    /// Registering the same action UUID twice is an error.
    pub fn map_action<F, A>(
        &mut self,
        action: impl Into<ActionUuid>,
        factory: F,
    ) -> Result<&mut Self, RouterError>
    where
        F: Fn(ActionContext) -> A + Send + Sync + 'static,
        A: Action,
    {
        let action = action.into();
        if action.is_empty() {
            return Err(RouterError::EmptyAction);
        }
        if self.routes.contains_key(&action) {
            return Err(RouterError::DuplicateAction(action));
        }
        let factory: ActionFactory = Arc::new(move |cx| Arc::new(factory(cx)) as Arc<dyn Action>);
        let _ = self.routes.insert(action, factory);
        Ok(self)
    }

    /// Handle plugin-level events with `handler`.
    pub fn plugin_handler(&mut self, handler: impl PluginHandler) -> &mut Self {
        self.plugin = Arc::new(handler);
        self
    }

    /// Action UUIDs registered so far.
    pub fn actions(&self) -> impl Iterator<Item = &ActionUuid> {
        self.routes.keys()
    }

    /// Freeze the routes.
    ///
    /// `cancel` is handed to every instance and to the plugin handler so
    /// handlers can notice shutdown.
    pub fn build(
        self,
        dispatcher: Arc<Dispatcher>,
        sink: Arc<dyn CommandSink>,
        plugin_uuid: PluginUuid,
        cancel: CancellationToken,
    ) -> ActionRouter {
        let live = LiveContexts::default();
        let plugin_cx = PluginContext::new(plugin_uuid, Arc::clone(&sink), cancel.clone())
            .with_live_contexts(Arc::clone(&live));
        ActionRouter {
            routes: self.routes,
            instances: DashMap::new(),
            live,
            plugin: self.plugin,
            plugin_cx,
            dispatcher,
            sink,
            cancel,
        }
    }
}

#[derive(Clone)]
struct Instance {
    action: Arc<dyn Action>,
    cx: ActionContext,
}

/// Routes inbound events to action instances and the plugin handler.
pub struct ActionRouter {
    routes: HashMap<ActionUuid, ActionFactory>,
    instances: DashMap<ContextId, Instance>,
    live: LiveContexts,
    plugin: Arc<dyn PluginHandler>,
    plugin_cx: PluginContext,
    dispatcher: Arc<Dispatcher>,
    sink: Arc<dyn CommandSink>,
    cancel: CancellationToken,
}

impl ActionRouter {
    /// Number of live instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Whether an instance exists for `context`.
    pub fn contains(&self, context: &ContextId) -> bool {
        self.instances.contains_key(context)
    }

    /// Whether a factory is registered for `action`.
    pub fn has_route(&self, action: &ActionUuid) -> bool {
        self.routes.contains_key(action)
    }

    /// The command handle of the instance at `context`, if live.
    pub fn instance(&self, context: &ContextId) -> Option<ActionContext> {
        self.instances.get(context).map(|i| i.cx.clone())
    }

    /// Remove and dispose every instance. Used at shutdown after draining.
    pub fn dispose_all(&self) {
        let contexts: Vec<ContextId> = self.instances.iter().map(|e| e.key().clone()).collect();
        for context in contexts {
            if let Some((_, instance)) = self.instances.remove(&context) {
                instance.cx.dispose();
            }
        }
        self.live.clear();
    }

    /// Route one event. Called on the receive loop.
    pub fn route(&self, event: &InboundEvent) {
        match event.kind {
            EventKind::WillAppear => self.will_appear(event),
            EventKind::WillDisappear => self.will_disappear(event),
            EventKind::KeyDown => self.forward(event, |a, cx, e| async move {
                a.on_key_down(&cx, e.payload()?).await
            }),
            EventKind::KeyUp => self.forward(event, |a, cx, e| async move {
                a.on_key_up(&cx, e.payload()?).await
            }),
            EventKind::DidReceiveSettings => self.forward(event, |a, cx, e| async move {
                a.on_did_receive_settings(&cx, e.payload()?).await
            }),
            EventKind::PropertyInspectorDidAppear => self.forward(event, |a, cx, _| async move {
                a.on_property_inspector_did_appear(&cx).await
            }),
            EventKind::PropertyInspectorDidDisappear => self.forward(event, |a, cx, _| async move {
                a.on_property_inspector_did_disappear(&cx).await
            }),
            EventKind::SendToPlugin => self.forward(event, |a, cx, e| async move {
                a.on_send_to_plugin(&cx, e.payload()?).await
            }),
            EventKind::TitleParametersDidChange => self.forward(event, |a, cx, e| async move {
                a.on_title_parameters_did_change(&cx, e.payload()?).await
            }),
            EventKind::ApplicationDidLaunch => self.global(event, |p, cx, e| async move {
                p.on_application_did_launch(&cx, e.payload()?).await
            }),
            EventKind::ApplicationDidTerminate => self.global(event, |p, cx, e| async move {
                p.on_application_did_terminate(&cx, e.payload()?).await
            }),
            EventKind::DeviceDidConnect => self.global(event, |p, cx, e| async move {
                let device = e.device.clone().unwrap_or_default();
                p.on_device_did_connect(&cx, device, e.payload()?).await
            }),
            EventKind::DeviceDidDisconnect => self.global(event, |p, cx, e| async move {
                let device = e.device.clone().unwrap_or_default();
                p.on_device_did_disconnect(&cx, device).await
            }),
            EventKind::DidReceiveGlobalSettings => self.global(event, |p, cx, e| async move {
                p.on_did_receive_global_settings(&cx, e.payload()?).await
            }),
            EventKind::SystemDidWakeUp => self.global(event, |p, cx, _| async move {
                p.on_system_did_wake_up(&cx).await
            }),
        }
    }

    fn will_appear(&self, event: &InboundEvent) {
        let (Some(context), Some(action)) = (event.context.clone(), event.action.clone()) else {
            warn!(event = %event.kind, "willAppear without context or action, dropping");
            return;
        };

        let instance = match self.instances.entry(context.clone()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let Some(factory) = self.routes.get(&action) else {
                    debug!(%action, %context, "no action registered, ignoring willAppear");
                    return;
                };
                let cx = ActionContext::new(
                    action.clone(),
                    context.clone(),
                    event.device.clone(),
                    Arc::clone(&self.sink),
                    self.cancel.child_token(),
                );
                let built = std::panic::catch_unwind(AssertUnwindSafe(|| factory(cx.clone())));
                match built {
                    Ok(handler) => {
                        let _ = self.live.insert(context.clone());
                        slot.insert(Instance {
                            action: handler,
                            cx,
                        })
                        .clone()
                    }
                    Err(_) => {
                        drop(slot);
                        error!(%action, %context, "action factory panicked");
                        let origin = Some(context);
                        let _ = self.dispatcher.invoke(
                            async move {
                                Err(HandlerError::Panicked(format!(
                                    "factory for {action} panicked"
                                )))
                            },
                            origin,
                        );
                        return;
                    }
                }
            }
        };

        let event = event.clone();
        let target = instance.clone();
        self.dispatch(&target, async move {
            instance
                .action
                .on_will_appear(&instance.cx, event.payload()?)
                .await
        });
    }

    fn will_disappear(&self, event: &InboundEvent) {
        let Some(context) = event.context.as_ref() else {
            warn!("willDisappear without context, dropping");
            return;
        };
        let Some((_, instance)) = self.instances.remove(context) else {
            debug!(%context, "willDisappear for unknown context");
            return;
        };
        let _ = self.live.remove(context);

        let event = event.clone();
        let target = instance.clone();
        self.dispatch(&target, async move {
            instance
                .action
                .on_will_disappear(&instance.cx, event.payload()?)
                .await
        });
        // Scheduled; from here on the context is gone for the host.
        target.cx.dispose();
    }

    fn forward<F, Fut>(&self, event: &InboundEvent, call: F)
    where
        F: FnOnce(Arc<dyn Action>, ActionContext, InboundEvent) -> Fut,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let Some(context) = event.context.as_ref() else {
            debug!(event = %event.kind, "instance event without context, dropping");
            return;
        };
        let Some(instance) = self.instances.get(context).map(|i| i.clone()) else {
            debug!(event = %event.kind, %context, "no instance for context, dropping");
            return;
        };
        let work = call(Arc::clone(&instance.action), instance.cx.clone(), event.clone());
        self.dispatch(&instance, work);
    }

    fn global<F, Fut>(&self, event: &InboundEvent, call: F)
    where
        F: FnOnce(Arc<dyn PluginHandler>, PluginContext, InboundEvent) -> Fut,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let work = call(
            Arc::clone(&self.plugin),
            self.plugin_cx.clone(),
            event.clone(),
        );
        if let Err(e) = self.dispatcher.invoke(work, None) {
            debug!(event = %event.kind, error = %e, "plugin event dropped");
        }
    }

    fn dispatch<Fut>(&self, instance: &Instance, work: Fut)
    where
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let origin = Some(instance.cx.context().clone());
        if let Err(e) = instance
            .cx
            .span()
            .in_scope(|| self.dispatcher.invoke(work, origin))
        {
            debug!(context = %instance.cx.context(), error = %e, "instance event dropped");
        }
    }
}

impl EventListener for ActionRouter {
    fn on_event(&self, event: &InboundEvent) {
        self.route(event);
    }
}

impl std::fmt::Debug for ActionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRouter")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}
