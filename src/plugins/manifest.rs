// ABOUTME: Plugin manifests: one TOML file per plugin in a directory, loaded in file-name order.
// ABOUTME: The "reply" kind answers a command and/or a thread event with templated text.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use relaybot_core::{CommandHandler, EventHandler, PluginDescriptor, PluginSource, PluginUnit};
use relaybot_platform::{PlatformEvent, SharedConnection};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// On-disk manifest format.
///
/// ```toml
/// name = "hello"
/// description = "Says hello"
/// kind = "reply"
/// reply = "Hello, {args}!"
/// on_event = "log:subscribe"
/// event_reply = "Welcome!"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: String,
    /// Command reply; `{args}` expands to the arguments, `{sender}` to the sender id
    #[serde(default)]
    pub reply: Option<String>,
    /// Event sub-type to react to; any event when unset
    #[serde(default)]
    pub on_event: Option<String>,
    #[serde(default)]
    pub event_reply: Option<String>,
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the descriptor this manifest declares
    pub fn into_descriptor(self) -> Result<PluginDescriptor> {
        match self.kind.as_str() {
            "reply" => {}
            other => bail!("unknown plugin kind '{}'", other),
        }
        if self.on_event.is_some() && self.event_reply.is_none() {
            bail!("on_event requires event_reply");
        }

        let mut descriptor = PluginDescriptor::new(self.name);
        if let Some(description) = self.description {
            descriptor = descriptor.with_description(description);
        }
        if let Some(template) = self.reply {
            descriptor = descriptor.with_command(ReplyCommand { template });
        }
        if let Some(template) = self.event_reply {
            descriptor = descriptor.with_event(ReplyEvent {
                on_event: self.on_event,
                template,
            });
        }
        Ok(descriptor)
    }
}

fn render(template: &str, event: &PlatformEvent, args: &[String]) -> String {
    template
        .replace("{args}", &args.join(" "))
        .replace("{sender}", event.sender_id.as_deref().unwrap_or(""))
}

struct ReplyCommand {
    template: String,
}

#[async_trait]
impl CommandHandler for ReplyCommand {
    async fn run(
        &self,
        connection: SharedConnection,
        event: &PlatformEvent,
        args: &[String],
    ) -> Result<()> {
        let text = render(&self.template, event, args);
        connection.send_message(&text, &event.thread_id).await
    }
}

struct ReplyEvent {
    on_event: Option<String>,
    template: String,
}

#[async_trait]
impl EventHandler for ReplyEvent {
    async fn handle_event(
        &self,
        connection: SharedConnection,
        event: &PlatformEvent,
    ) -> Result<()> {
        if let Some(expected) = &self.on_event {
            if event.log_message_type.as_deref() != Some(expected.as_str()) {
                return Ok(());
            }
        }
        let text = render(&self.template, event, &[]);
        connection.send_message(&text, &event.thread_id).await
    }
}

/// Read and build one manifest file
pub fn load_manifest(path: &Path) -> Result<PluginDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Manifest::parse(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?
        .into_descriptor()
}

/// Every `*.toml` manifest in a directory
pub struct ManifestSource {
    dir: PathBuf,
}

impl ManifestSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn manifest_paths(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read plugin directory {}", self.dir.display()))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }
}

impl PluginSource for ManifestSource {
    fn units(&self) -> Vec<PluginUnit> {
        match self.manifest_paths() {
            Ok(paths) => paths
                .into_iter()
                .map(|path| {
                    let unit = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    PluginUnit::new(unit, move || load_manifest(&path))
                })
                .collect(),
            // The directory itself counts as one failed unit
            Err(e) => vec![PluginUnit::failed(self.dir.display().to_string(), e)],
        }
    }
}
