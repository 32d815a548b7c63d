// ABOUTME: Routes platform events to plugin handlers: commands by first token, events to every handler.
// ABOUTME: Each invocation is isolated against errors, panics and timeouts so the listen loop never stops.

use crate::commands::parse_command;
use crate::error::HandlerError;
use crate::metrics;
use crate::registry::PluginRegistry;
use anyhow::Result;
use futures_util::future::join_all;
use futures_util::{FutureExt, StreamExt};
use relaybot_platform::{EventKind, EventStream, PlatformEvent, SharedConnection};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// What a single dispatch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Event type the dispatcher does not route
    Ignored,
    /// Message with an empty body or an unregistered first token
    Unmatched,
    /// A command handler ran
    Command { name: String, failed: bool },
    /// Event handlers ran
    Broadcast { invoked: usize, failed: usize },
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    handler_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<PluginRegistry>, handler_timeout: Duration) -> Self {
        Self {
            registry,
            handler_timeout,
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Route one event. Handler failures are logged and reflected in the outcome.
    pub async fn dispatch(
        &self,
        connection: SharedConnection,
        event: &PlatformEvent,
    ) -> DispatchOutcome {
        let kind_label = match &event.kind {
            EventKind::Other(_) => "other",
            kind => kind.as_str(),
        };
        metrics::record_event_dispatched(kind_label);

        match &event.kind {
            EventKind::Message | EventKind::MessageReply => {
                self.dispatch_command(connection, event).await
            }
            EventKind::Event => self.broadcast_event(connection, event).await,
            EventKind::Other(kind) => {
                tracing::trace!(kind = %kind, thread_id = %event.thread_id, "Ignoring event");
                DispatchOutcome::Ignored
            }
        }
    }

    async fn dispatch_command(
        &self,
        connection: SharedConnection,
        event: &PlatformEvent,
    ) -> DispatchOutcome {
        let Some(command) = parse_command(event.body_text()) else {
            return DispatchOutcome::Unmatched;
        };
        let Some(handler) = self.registry.commands().get(&command.name) else {
            tracing::trace!(command = %command.name, "No plugin for command");
            return DispatchOutcome::Unmatched;
        };

        tracing::debug!(
            command = %command.name,
            args = command.args.len(),
            thread_id = %event.thread_id,
            sender_id = event.sender_id.as_deref().unwrap_or(""),
            "Dispatching command"
        );

        let result = guarded(
            &command.name,
            self.handler_timeout,
            handler.run(connection, event, &command.args),
        )
        .await;

        let failed = result.is_err();
        if let Err(e) = result {
            report_failure(&e);
        }
        DispatchOutcome::Command {
            name: command.name,
            failed,
        }
    }

    async fn broadcast_event(
        &self,
        connection: SharedConnection,
        event: &PlatformEvent,
    ) -> DispatchOutcome {
        let invocations = self.registry.events().iter().map(|(name, handler)| {
            let connection = connection.clone();
            async move {
                guarded(
                    name,
                    self.handler_timeout,
                    handler.handle_event(connection, event),
                )
                .await
            }
        });

        let results = join_all(invocations).await;
        let invoked = results.len();
        let mut failed = 0;
        for e in results.iter().filter_map(|r| r.as_ref().err()) {
            report_failure(e);
            failed += 1;
        }

        tracing::debug!(
            invoked,
            failed,
            log_message_type = event.log_message_type.as_deref().unwrap_or(""),
            "Broadcast thread event"
        );
        DispatchOutcome::Broadcast { invoked, failed }
    }

    /// Dispatch every item of `stream` in order until it ends
    pub async fn run(&self, connection: SharedConnection, mut stream: EventStream) {
        let account_id = connection.current_user_id().to_string();
        tracing::info!(account_id = %account_id, "Listening for events");

        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    self.dispatch(connection.clone(), &event).await;
                }
                Err(e) => {
                    tracing::warn!(account_id = %account_id, error = %e, "Listen error, skipping");
                }
            }
        }

        tracing::info!(account_id = %account_id, "Event stream ended");
    }
}

/// Run one handler future, converting errors, panics and timeouts into [`HandlerError`]
async fn guarded<F>(plugin: &str, timeout: Duration, fut: F) -> Result<(), HandlerError>
where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(error))) => Err(HandlerError::Failed {
            plugin: plugin.to_string(),
            error,
        }),
        Ok(Err(panic)) => Err(HandlerError::Panicked {
            plugin: plugin.to_string(),
            message: panic_message(panic.as_ref()),
        }),
        Err(_) => Err(HandlerError::TimedOut {
            plugin: plugin.to_string(),
            timeout,
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn report_failure(error: &HandlerError) {
    metrics::record_handler_failure(error.plugin());
    tracing::error!(plugin = %error.plugin(), error = %error, "Plugin handler failed");
}
