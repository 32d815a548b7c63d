// ABOUTME: Integration tests for event dispatch against the mock platform.
// ABOUTME: Covers command routing, event broadcast, failure isolation and the listen loop.

use relaybot_core::{
    command_fn, event_fn, DispatchOutcome, Dispatcher, EventKind, PluginDescriptor,
    PluginRegistry, PluginUnit, SharedConnection, TracingObserver,
};
use relaybot_platform::backends::mock::{MockConnectionProbe, MockPlatform};
use relaybot_platform::{AppState, ListenOptions, Platform, PlatformEvent, StateEntry};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type CommandCalls = Arc<Mutex<Vec<(String, Vec<String>)>>>;
type EventCalls = Arc<Mutex<Vec<String>>>;

fn registry(descriptors: Vec<PluginDescriptor>) -> Arc<PluginRegistry> {
    let source = move || -> Vec<PluginUnit> {
        descriptors
            .iter()
            .cloned()
            .map(|d| PluginUnit::new(d.name().to_string(), move || Ok(d)))
            .collect()
    };
    let report = PluginRegistry::load(&source, &TracingObserver);
    assert!(report.errors.is_empty());
    Arc::new(report.registry)
}

fn recording_command(name: &'static str, calls: CommandCalls) -> PluginDescriptor {
    PluginDescriptor::new(name).with_command(command_fn(
        move |conn: SharedConnection, event: PlatformEvent, args: Vec<String>| {
            let calls = calls.clone();
            async move {
                calls.lock().unwrap().push((name.to_string(), args));
                conn.send_message(name, &event.thread_id).await?;
                anyhow::Ok(())
            }
        },
    ))
}

fn recording_event(name: &'static str, calls: EventCalls) -> PluginDescriptor {
    PluginDescriptor::new(name).with_event(event_fn(
        move |_conn: SharedConnection, _event: PlatformEvent| {
            let calls = calls.clone();
            async move {
                calls.lock().unwrap().push(name.to_string());
                anyhow::Ok(())
            }
        },
    ))
}

async fn connect(platform: &MockPlatform, id: &str) -> (SharedConnection, MockConnectionProbe) {
    let state = AppState::new(vec![StateEntry::new("c_user", id)]);
    let conn = platform.connect(&state).await.unwrap();
    let probe = platform.connection(id).unwrap();
    (conn, probe)
}

// ============================================================================
// Scenario: ping command plus welcome event handler
// ============================================================================

#[tokio::test]
async fn test_ping_and_welcome_scenario() {
    let commands: CommandCalls = Arc::default();
    let events: EventCalls = Arc::default();
    let dispatcher = Dispatcher::new(
        registry(vec![
            recording_command("ping", commands.clone()),
            recording_event("welcome", events.clone()),
        ]),
        Duration::from_secs(5),
    );
    let platform = MockPlatform::new();
    let (conn, probe) = connect(&platform, "100").await;

    let outcome = dispatcher
        .dispatch(conn.clone(), &PlatformEvent::message("t1", "u1", "PING hello"))
        .await;
    assert_eq!(
        outcome,
        DispatchOutcome::Command {
            name: "ping".into(),
            failed: false
        }
    );
    assert_eq!(
        *commands.lock().unwrap(),
        vec![("ping".to_string(), vec!["hello".to_string()])]
    );
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(probe.sent_to("t1").len(), 1);

    let outcome = dispatcher
        .dispatch(conn, &PlatformEvent::event("t1", "log:subscribe"))
        .await;
    assert_eq!(
        outcome,
        DispatchOutcome::Broadcast {
            invoked: 1,
            failed: 0
        }
    );
    assert_eq!(*events.lock().unwrap(), vec!["welcome".to_string()]);
    assert_eq!(commands.lock().unwrap().len(), 1, "ping must not run for events");
}

// ============================================================================
// Command routing
// ============================================================================

#[tokio::test]
async fn test_args_are_split_on_whitespace_runs() {
    let commands: CommandCalls = Arc::default();
    let dispatcher = Dispatcher::new(
        registry(vec![recording_command("echo", commands.clone())]),
        Duration::from_secs(5),
    );
    let (conn, _probe) = connect(&MockPlatform::new(), "100").await;

    dispatcher
        .dispatch(conn, &PlatformEvent::message("t1", "u1", "  Echo  a\tb \n c "))
        .await;

    assert_eq!(
        commands.lock().unwrap()[0].1,
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
}

#[tokio::test]
async fn test_message_reply_routes_like_message() {
    let commands: CommandCalls = Arc::default();
    let dispatcher = Dispatcher::new(
        registry(vec![recording_command("ping", commands.clone())]),
        Duration::from_secs(5),
    );
    let (conn, _probe) = connect(&MockPlatform::new(), "100").await;

    let reply = PlatformEvent::message("t1", "u1", "ping").with_kind(EventKind::MessageReply);
    let outcome = dispatcher.dispatch(conn, &reply).await;
    assert!(matches!(outcome, DispatchOutcome::Command { .. }));
    assert_eq!(commands.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unmatched_and_ignored_events() {
    let commands: CommandCalls = Arc::default();
    let events: EventCalls = Arc::default();
    let dispatcher = Dispatcher::new(
        registry(vec![
            recording_command("ping", commands.clone()),
            recording_event("welcome", events.clone()),
        ]),
        Duration::from_secs(5),
    );
    let (conn, _probe) = connect(&MockPlatform::new(), "100").await;

    let unknown = PlatformEvent::message("t1", "u1", "dance now");
    assert_eq!(
        dispatcher.dispatch(conn.clone(), &unknown).await,
        DispatchOutcome::Unmatched
    );

    let empty = PlatformEvent::new(EventKind::Message, "t1");
    assert_eq!(
        dispatcher.dispatch(conn.clone(), &empty).await,
        DispatchOutcome::Unmatched
    );

    let typing = PlatformEvent::new(EventKind::Other("typ".into()), "t1").with_body("ping");
    assert_eq!(
        dispatcher.dispatch(conn, &typing).await,
        DispatchOutcome::Ignored
    );

    assert!(commands.lock().unwrap().is_empty());
    assert!(events.lock().unwrap().is_empty());
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_failing_event_handlers_do_not_block_others() {
    let events: EventCalls = Arc::default();
    let failing = PluginDescriptor::new("broken").with_event(event_fn(
        |_conn: SharedConnection, _event: PlatformEvent| async move {
            Err::<(), _>(anyhow::anyhow!("database unavailable"))
        },
    ));
    let panicking = PluginDescriptor::new("explosive").with_event(event_fn(
        |_conn: SharedConnection, event: PlatformEvent| async move {
            if event.log_message_type.is_some() {
                panic!("handler bug");
            }
            anyhow::Ok(())
        },
    ));

    let dispatcher = Dispatcher::new(
        registry(vec![
            failing,
            panicking,
            recording_event("welcome", events.clone()),
        ]),
        Duration::from_secs(5),
    );
    let (conn, _probe) = connect(&MockPlatform::new(), "100").await;

    let outcome = dispatcher
        .dispatch(conn.clone(), &PlatformEvent::event("t1", "log:subscribe"))
        .await;
    assert_eq!(
        outcome,
        DispatchOutcome::Broadcast {
            invoked: 3,
            failed: 2
        }
    );
    assert_eq!(*events.lock().unwrap(), vec!["welcome".to_string()]);

    // Still dispatching after the failures
    dispatcher
        .dispatch(conn, &PlatformEvent::event("t1", "log:unsubscribe"))
        .await;
    assert_eq!(events.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_command_times_out() {
    let slow = PluginDescriptor::new("slow").with_command(command_fn(
        |_conn: SharedConnection, _event: PlatformEvent, _args: Vec<String>| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            anyhow::Ok(())
        },
    ));
    let dispatcher = Dispatcher::new(registry(vec![slow]), Duration::from_secs(1));
    let (conn, _probe) = connect(&MockPlatform::new(), "100").await;

    let outcome = dispatcher
        .dispatch(conn, &PlatformEvent::message("t1", "u1", "slow"))
        .await;
    assert_eq!(
        outcome,
        DispatchOutcome::Command {
            name: "slow".into(),
            failed: true
        }
    );
}

// ============================================================================
// Listen loop
// ============================================================================

#[tokio::test]
async fn test_run_dispatches_in_order_and_skips_stream_errors() {
    let commands: CommandCalls = Arc::default();
    let dispatcher = Dispatcher::new(
        registry(vec![recording_command("echo", commands.clone())]),
        Duration::from_secs(5),
    );
    let platform = MockPlatform::new();
    let (conn, probe) = connect(&platform, "100").await;
    conn.set_options(ListenOptions {
        listen_events: true,
        self_listen: false,
    })
    .unwrap();
    let stream = conn.listen().await.unwrap();

    probe.push(PlatformEvent::message("t1", "u1", "echo 1"));
    probe.push_error("transient mqtt hiccup");
    probe.push(PlatformEvent::message("t1", "u1", "echo 2"));
    probe.push(PlatformEvent::message("t1", "u1", "echo 3"));
    probe.close();

    tokio::time::timeout(Duration::from_secs(5), dispatcher.run(conn, stream))
        .await
        .expect("run should return when the stream ends");

    let seen: Vec<String> = commands
        .lock()
        .unwrap()
        .iter()
        .map(|(_, args)| args.join(" "))
        .collect();
    assert_eq!(seen, vec!["1", "2", "3"]);
}
