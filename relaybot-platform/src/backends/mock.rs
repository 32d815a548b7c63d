// ABOUTME: In-memory mock platform for development and tests.
// ABOUTME: Scriptable accounts, failures and delays; probes push events and record sent messages.
//!
//! # Example
//!
//! ```no_run
//! use relaybot_platform::backends::mock::MockPlatform;
//! use relaybot_platform::{AppState, Platform, PlatformEvent, StateEntry};
//!
//! # async fn example() {
//! let platform = MockPlatform::new().with_account("123", "Ada", "https://example.com/ada");
//! let state = AppState::new(vec![StateEntry::new("c_user", "123")]);
//! let conn = platform.connect(&state).await.unwrap();
//!
//! let probe = platform.connection("123").unwrap();
//! probe.push(PlatformEvent::message("t1", "u1", "ping"));
//! conn.send_message("pong", "t1").await.unwrap();
//! assert_eq!(probe.sent()[0].text, "pong");
//! # }
//! ```

use crate::credentials::AppState;
use crate::event::{EventKind, PlatformEvent};
use crate::traits::{
    Connection, EventStream, ListenOptions, Platform, SharedConnection, UserInfo,
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A message recorded by a mock connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
    pub text: String,
    pub recipient_id: String,
}

#[derive(Default)]
struct Script {
    accounts: HashMap<String, UserInfo>,
    rejected: HashSet<String>,
    failing_user_info: HashSet<String>,
    failing_recipients: HashSet<String>,
    reported_ids: HashMap<String, String>,
    connect_delay: Option<Duration>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    connect_attempts: AtomicUsize,
    connections_established: AtomicUsize,
    probes: Mutex<HashMap<String, MockConnectionProbe>>,
}

/// Mock platform backend.
///
/// Cloning is cheap and clones observe the same state, so a test can keep
/// one handle while the code under test owns another.
#[derive(Clone, Default)]
pub struct MockPlatform {
    shared: Arc<Shared>,
}

/// Settings accepted by the registry factory
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MockSettings {
    connect_delay_ms: Option<u64>,
    accounts: HashMap<String, UserInfo>,
    reject: Vec<String>,
}

impl MockPlatform {
    /// Create a mock platform that accepts every identity
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory for [`crate::PlatformRegistry`]
    pub fn factory() -> impl Fn(&Value) -> Result<Arc<dyn Platform>> + Send + Sync + 'static {
        |settings: &Value| {
            let settings: MockSettings = if settings.is_null() {
                MockSettings::default()
            } else {
                serde_json::from_value(settings.clone())
                    .context("Invalid settings for mock platform")?
            };

            let mut platform = MockPlatform::new();
            if let Some(ms) = settings.connect_delay_ms {
                platform = platform.with_connect_delay(Duration::from_millis(ms));
            }
            for (id, info) in settings.accounts {
                platform = platform.with_user_info(id, info);
            }
            for id in settings.reject {
                platform = platform.reject(id);
            }
            Ok(Arc::new(platform) as Arc<dyn Platform>)
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.shared
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Register profile metadata for an account
    pub fn with_account(self, id: &str, name: &str, profile_url: &str) -> Self {
        let info = UserInfo {
            name: name.to_string(),
            profile_url: profile_url.to_string(),
            thumb_src: format!("{}/picture", profile_url.trim_end_matches('/')),
        };
        self.with_user_info(id, info)
    }

    pub fn with_user_info(self, id: impl Into<String>, info: UserInfo) -> Self {
        self.script().accounts.insert(id.into(), info);
        self
    }

    /// Refuse to authenticate this identity
    pub fn reject(self, id: impl Into<String>) -> Self {
        self.script().rejected.insert(id.into());
        self
    }

    /// Fail profile lookups for this user
    pub fn fail_user_info(self, id: impl Into<String>) -> Self {
        self.script().failing_user_info.insert(id.into());
        self
    }

    /// Fail every send to this recipient
    pub fn fail_sends_to(self, recipient_id: impl Into<String>) -> Self {
        self.script().failing_recipients.insert(recipient_id.into());
        self
    }

    /// Report `actual` as the logged-in user when authenticating `cookie_id`
    pub fn report_user_id(self, cookie_id: impl Into<String>, actual: impl Into<String>) -> Self {
        self.script()
            .reported_ids
            .insert(cookie_id.into(), actual.into());
        self
    }

    /// Delay every connect attempt
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.script().connect_delay = Some(delay);
        self
    }

    /// Number of times `connect` was called
    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of connections successfully established
    pub fn connections_established(&self) -> usize {
        self.shared.connections_established.load(Ordering::SeqCst)
    }

    /// Probe for the most recent connection logged in as `user_id`
    pub fn connection(&self, user_id: &str) -> Option<MockConnectionProbe> {
        self.shared
            .probes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }

    fn default_user_info(id: &str) -> UserInfo {
        UserInfo {
            name: format!("Mock User {}", id),
            profile_url: format!("https://mock.invalid/{}", id),
            thumb_src: format!("https://mock.invalid/{}/picture", id),
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, state: &AppState) -> Result<SharedConnection> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.script().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let cookie_id = state
            .identity()
            .ok_or_else(|| anyhow!("app state has no identity cookie"))?;

        let user_id = {
            let script = self.script();
            if script.rejected.contains(&cookie_id) {
                bail!("login rejected for {}: session cookies are no longer valid", cookie_id);
            }
            script
                .reported_ids
                .get(&cookie_id)
                .cloned()
                .unwrap_or(cookie_id)
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let probe = MockConnectionProbe {
            inner: Arc::new(ProbeState {
                sender: Mutex::new(Some(tx)),
                sent: Mutex::new(Vec::new()),
                options: Mutex::new(ListenOptions::default()),
                logged_out: AtomicBool::new(false),
            }),
        };

        let connection = MockConnection {
            user_id: user_id.clone(),
            platform: self.clone(),
            probe: probe.clone(),
            receiver: Mutex::new(Some(rx)),
        };

        self.shared
            .probes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.clone(), probe);
        self.shared
            .connections_established
            .fetch_add(1, Ordering::SeqCst);
        tracing::debug!(user_id = %user_id, "Mock connection established");

        Ok(Arc::new(connection))
    }
}

struct ProbeState {
    sender: Mutex<Option<mpsc::UnboundedSender<Result<PlatformEvent>>>>,
    sent: Mutex<Vec<SentMessage>>,
    options: Mutex<ListenOptions>,
    logged_out: AtomicBool,
}

/// Test-side view of a mock connection
#[derive(Clone)]
pub struct MockConnectionProbe {
    inner: Arc<ProbeState>,
}

impl MockConnectionProbe {
    fn send(&self, item: Result<PlatformEvent>) -> bool {
        match self
            .inner
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// Deliver an event to the listen stream. Returns false once closed.
    pub fn push(&self, event: PlatformEvent) -> bool {
        self.send(Ok(event))
    }

    /// Deliver a listen error to the stream
    pub fn push_error(&self, message: &str) -> bool {
        self.send(Err(anyhow!(message.to_string())))
    }

    /// End the listen stream, as if the platform dropped the connection
    pub fn close(&self) {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn sent_to(&self, recipient_id: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.recipient_id == recipient_id)
            .collect()
    }

    pub fn options(&self) -> ListenOptions {
        *self.inner.options.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_logged_out(&self) -> bool {
        self.inner.logged_out.load(Ordering::SeqCst)
    }
}

/// Connection handed out by [`MockPlatform`]
pub struct MockConnection {
    user_id: String,
    platform: MockPlatform,
    probe: MockConnectionProbe,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Result<PlatformEvent>>>>,
}

#[async_trait]
impl Connection for MockConnection {
    fn current_user_id(&self) -> &str {
        &self.user_id
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo> {
        let script = self.platform.script();
        if script.failing_user_info.contains(user_id) {
            bail!("profile lookup failed for {}", user_id);
        }
        Ok(script
            .accounts
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| MockPlatform::default_user_info(user_id)))
    }

    async fn send_message(&self, text: &str, recipient_id: &str) -> Result<()> {
        if self.probe.is_logged_out() {
            bail!("connection is logged out");
        }
        if self
            .platform
            .script()
            .failing_recipients
            .contains(recipient_id)
        {
            bail!("send to {} failed", recipient_id);
        }
        self.probe
            .inner
            .sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                id: format!("mid.{}", uuid::Uuid::new_v4()),
                text: text.to_string(),
                recipient_id: recipient_id.to_string(),
            });
        Ok(())
    }

    fn set_options(&self, options: ListenOptions) -> Result<()> {
        *self
            .probe
            .inner
            .options
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = options;
        Ok(())
    }

    async fn listen(&self) -> Result<EventStream> {
        let rx = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| anyhow!("connection is already listening"))?;

        let probe = self.probe.clone();
        let stream = UnboundedReceiverStream::new(rx).filter(move |item| {
            // Thread events are only delivered when requested
            let keep = match item {
                Ok(event) => event.kind != EventKind::Event || probe.options().listen_events,
                Err(_) => true,
            };
            futures::future::ready(keep)
        });
        Ok(stream.boxed())
    }

    async fn logout(&self) -> Result<()> {
        self.probe.inner.logged_out.store(true, Ordering::SeqCst);
        self.probe.close();
        Ok(())
    }
}
