// ABOUTME: Built-in plugin catalog: a static table of named descriptor constructors.
// ABOUTME: ping, echo and uptime answer commands; welcome and farewell react to membership events.

use anyhow::Result;
use relaybot_core::heartbeat::format_uptime;
use relaybot_core::{command_fn, event_fn, PluginDescriptor, PluginSource, PluginUnit};
use relaybot_platform::{PlatformEvent, SharedConnection};
use std::time::Instant;

/// Values built-in plugins may close over
#[derive(Debug, Clone, Copy)]
pub struct BuiltinContext {
    pub started: Instant,
}

type Constructor = fn(&BuiltinContext) -> PluginDescriptor;

const CATALOG: &[(&str, Constructor)] = &[
    ("ping", ping),
    ("echo", echo),
    ("uptime", uptime),
    ("welcome", welcome),
    ("farewell", farewell),
];

/// Names of every built-in plugin, in catalog order
pub fn names() -> Vec<&'static str> {
    CATALOG.iter().map(|(name, _)| *name).collect()
}

fn lookup(name: &str) -> Option<Constructor> {
    let name = name.trim().to_lowercase();
    CATALOG
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, ctor)| *ctor)
}

/// Built-in plugins selected by name, or the whole catalog
pub struct CatalogSource {
    selected: Option<Vec<String>>,
    context: BuiltinContext,
}

impl CatalogSource {
    pub fn new(selected: Option<Vec<String>>, context: BuiltinContext) -> Self {
        Self { selected, context }
    }
}

impl PluginSource for CatalogSource {
    fn units(&self) -> Vec<PluginUnit> {
        let selected: Vec<String> = match &self.selected {
            Some(names) => names.clone(),
            None => names().into_iter().map(String::from).collect(),
        };

        selected
            .into_iter()
            .map(|name| {
                let context = self.context;
                PluginUnit::new(format!("builtin:{}", name), move || {
                    let ctor = lookup(&name)
                        .ok_or_else(|| anyhow::anyhow!("unknown built-in plugin '{}'", name))?;
                    Ok(ctor(&context))
                })
            })
            .collect()
    }
}

fn ping(_: &BuiltinContext) -> PluginDescriptor {
    PluginDescriptor::new("ping")
        .with_description("Replies with pong")
        .with_command(command_fn(
            |conn: SharedConnection, event: PlatformEvent, _args: Vec<String>| async move {
                conn.send_message("pong", &event.thread_id).await
            },
        ))
}

fn echo(_: &BuiltinContext) -> PluginDescriptor {
    PluginDescriptor::new("echo")
        .with_description("Repeats its arguments")
        .with_command(command_fn(
            |conn: SharedConnection, event: PlatformEvent, args: Vec<String>| async move {
                let text = if args.is_empty() {
                    "Usage: echo <text>".to_string()
                } else {
                    args.join(" ")
                };
                conn.send_message(&text, &event.thread_id).await
            },
        ))
}

fn uptime(context: &BuiltinContext) -> PluginDescriptor {
    let started = context.started;
    PluginDescriptor::new("uptime")
        .with_description("Reports how long the agent has been running")
        .with_command(command_fn(
            move |conn: SharedConnection, event: PlatformEvent, _args: Vec<String>| async move {
                let text = format!("Up for {}", format_uptime(started.elapsed()));
                conn.send_message(&text, &event.thread_id).await
            },
        ))
}

async fn greet_on(
    conn: SharedConnection,
    event: PlatformEvent,
    log_message_type: &str,
    text: &str,
) -> Result<()> {
    if event.log_message_type.as_deref() != Some(log_message_type) {
        return Ok(());
    }
    conn.send_message(text, &event.thread_id).await
}

fn welcome(_: &BuiltinContext) -> PluginDescriptor {
    PluginDescriptor::new("welcome")
        .with_description("Greets members who join a thread")
        .with_event(event_fn(|conn: SharedConnection, event: PlatformEvent| async move {
            greet_on(conn, event, "log:subscribe", "Welcome to the thread!").await
        }))
}

fn farewell(_: &BuiltinContext) -> PluginDescriptor {
    PluginDescriptor::new("farewell")
        .with_description("Says goodbye when a member leaves a thread")
        .with_event(event_fn(|conn: SharedConnection, event: PlatformEvent| async move {
            greet_on(conn, event, "log:unsubscribe", "Goodbye!").await
        }))
}
