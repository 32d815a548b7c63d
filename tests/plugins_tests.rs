// ABOUTME: Integration tests for plugin loading from the built-in catalog and a manifest directory.
// ABOUTME: Checks failure isolation, load order, duplicate names and dispatch through loaded plugins.

use relaybot::config::PluginsConfig;
use relaybot::plugins::{self, builtin::BuiltinContext};
use relaybot_core::{
    DispatchOutcome, Dispatcher, LoadObserver, LoadReport, PlatformEvent, TracingObserver,
};
use relaybot_platform::backends::mock::MockPlatform;
use relaybot_platform::{AppState, Platform, StateEntry};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn context() -> BuiltinContext {
    BuiltinContext {
        started: Instant::now(),
    }
}

fn write_manifest(dir: &Path, file: &str, content: &str) {
    std::fs::write(dir.join(file), content).unwrap();
}

fn config(builtin: Option<&[&str]>, manifest_dir: Option<&Path>) -> PluginsConfig {
    PluginsConfig {
        builtin: builtin.map(|names| names.iter().map(|n| n.to_string()).collect()),
        manifest_dir: manifest_dir.map(Path::to_path_buf),
    }
}

/// Records progress callbacks in order
#[derive(Default)]
struct RecordingObserver {
    progress: Mutex<Vec<(usize, usize, String)>>,
}

impl LoadObserver for RecordingObserver {
    fn on_progress(&self, processed: usize, total: usize, unit: &str) {
        self.progress
            .lock()
            .unwrap()
            .push((processed, total, unit.to_string()));
    }
}

#[test]
fn test_default_config_loads_whole_catalog() {
    let report = plugins::load(&PluginsConfig::default(), context(), &TracingObserver);
    assert!(report.errors.is_empty());
    assert_eq!(report.registry.commands().names(), vec!["echo", "ping", "uptime"]);
    assert_eq!(report.registry.events().names(), vec!["farewell", "welcome"]);
}

#[test]
fn test_malformed_manifest_does_not_block_later_units() {
    let dir = TempDir::new().unwrap();
    write_manifest(dir.path(), "a_broken.toml", "name = \"broken\"\nkind = ");
    write_manifest(
        dir.path(),
        "b_hello.toml",
        "name = \"hello\"\nkind = \"reply\"\nreply = \"hi\"\n",
    );
    write_manifest(dir.path(), "c_script.toml", "name = \"x\"\nkind = \"script\"\n");
    write_manifest(
        dir.path(),
        "d_bye.toml",
        "name = \"bye\"\nkind = \"reply\"\nreply = \"bye\"\n",
    );
    write_manifest(dir.path(), "notes.txt", "not a manifest");

    let observer = RecordingObserver::default();
    let report = plugins::load(&config(Some(&[]), Some(dir.path())), context(), &observer);

    let failed: Vec<&str> = report.errors.iter().map(|e| e.unit.as_str()).collect();
    assert_eq!(failed, vec!["a_broken.toml", "c_script.toml"]);
    assert_eq!(report.registry.commands().names(), vec!["bye", "hello"]);

    let progress = observer.progress.lock().unwrap();
    let units: Vec<&str> = progress.iter().map(|(_, _, u)| u.as_str()).collect();
    assert_eq!(
        units,
        vec!["a_broken.toml", "b_hello.toml", "c_script.toml", "d_bye.toml"]
    );
    assert_eq!(progress.last().map(|(p, t, _)| (*p, *t)), Some((4, 4)));
}

#[test]
fn test_manifest_duplicating_builtin_name_fails() {
    let dir = TempDir::new().unwrap();
    write_manifest(
        dir.path(),
        "ping.toml",
        "name = \"PING\"\nkind = \"reply\"\nreply = \"not pong\"\n",
    );

    let report = plugins::load(&config(Some(&["ping"]), Some(dir.path())), context(), &TracingObserver);

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].unit, "ping.toml");
    assert!(report.errors[0].to_string().contains("already registered"));
    assert_eq!(report.registry.commands().names(), vec!["ping"]);
}

#[test]
fn test_inert_manifest_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_manifest(dir.path(), "quiet.toml", "name = \"quiet\"\nkind = \"reply\"\n");

    let report = plugins::load(&config(Some(&[]), Some(dir.path())), context(), &TracingObserver);

    assert!(report.errors.is_empty());
    assert_eq!(report.skipped, vec!["quiet.toml"]);
    assert!(report.registry.commands().is_empty());
}

#[test]
fn test_missing_manifest_dir_is_one_failed_unit() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");

    let report = plugins::load(&config(Some(&["ping"]), Some(&missing)), context(), &TracingObserver);

    assert_eq!(report.errors.len(), 1);
    assert!(report.registry.commands().contains("ping"));
}

// ============================================================================
// Dispatch through loaded plugins
// ============================================================================

async fn connect(platform: &MockPlatform, id: &str) -> relaybot_platform::SharedConnection {
    let state = AppState::new(vec![StateEntry::new("c_user", id)]);
    platform.connect(&state).await.unwrap()
}

fn dispatcher(report: LoadReport) -> Dispatcher {
    Dispatcher::new(Arc::new(report.registry), Duration::from_secs(5))
}

#[tokio::test]
async fn test_ping_and_welcome_scenario() {
    let report = plugins::load(
        &config(Some(&["ping", "welcome"]), None),
        context(),
        &TracingObserver,
    );
    let dispatcher = dispatcher(report);
    let platform = MockPlatform::new();
    let conn = connect(&platform, "bot").await;
    let probe = platform.connection("bot").unwrap();

    let outcome = dispatcher
        .dispatch(conn.clone(), &PlatformEvent::message("t1", "u1", "PING hello"))
        .await;
    assert!(matches!(
        outcome,
        DispatchOutcome::Command { ref name, failed: false } if name == "ping"
    ));

    let outcome = dispatcher
        .dispatch(conn.clone(), &PlatformEvent::event("t1", "log:subscribe"))
        .await;
    assert!(matches!(
        outcome,
        DispatchOutcome::Broadcast { invoked: 1, failed: 0 }
    ));

    let texts: Vec<String> = probe.sent_to("t1").into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["pong", "Welcome to the thread!"]);
}

#[tokio::test]
async fn test_manifest_reply_templates() {
    let dir = TempDir::new().unwrap();
    write_manifest(
        dir.path(),
        "hello.toml",
        r#"
name = "hello"
kind = "reply"
reply = "Hello {sender}: {args}"
on_event = "log:thread-name"
event_reply = "Renamed!"
"#,
    );
    let report = plugins::load(&config(Some(&[]), Some(dir.path())), context(), &TracingObserver);
    let dispatcher = dispatcher(report);
    let platform = MockPlatform::new();
    let conn = connect(&platform, "bot").await;
    let probe = platform.connection("bot").unwrap();

    dispatcher
        .dispatch(conn.clone(), &PlatformEvent::message("t1", "u9", "hello  big   world"))
        .await;
    dispatcher
        .dispatch(conn.clone(), &PlatformEvent::event("t1", "log:subscribe"))
        .await;
    dispatcher
        .dispatch(conn.clone(), &PlatformEvent::event("t1", "log:thread-name"))
        .await;

    let texts: Vec<String> = probe.sent_to("t1").into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["Hello u9: big world", "Renamed!"]);
}

#[tokio::test]
async fn test_echo_usage_without_arguments() {
    let report = plugins::load(&config(Some(&["echo"]), None), context(), &TracingObserver);
    let dispatcher = dispatcher(report);
    let platform = MockPlatform::new();
    let conn = connect(&platform, "bot").await;
    let probe = platform.connection("bot").unwrap();

    dispatcher
        .dispatch(conn.clone(), &PlatformEvent::message("t1", "u1", "echo"))
        .await;
    dispatcher
        .dispatch(conn.clone(), &PlatformEvent::message("t1", "u1", "Echo  a  b"))
        .await;

    let texts: Vec<String> = probe.sent_to("t1").into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["Usage: echo <text>", "a b"]);
}
