// ABOUTME: Core Platform and Connection traits that every messaging backend implements.
// ABOUTME: Defines authentication, identity lookup, message sending and the event listen stream.

use crate::credentials::AppState;
use crate::event::PlatformEvent;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stream of inbound events for one connection, in delivery order.
///
/// Items are `Err` when the transport reports a recoverable listen error;
/// the stream ending means the connection is gone.
pub type EventStream = BoxStream<'static, Result<PlatformEvent>>;

/// Connections are shared between the dispatcher, the heartbeat and handlers.
pub type SharedConnection = Arc<dyn Connection>;

/// Profile metadata for a platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub name: String,
    pub profile_url: String,
    pub thumb_src: String,
}

/// Delivery options applied before listening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListenOptions {
    /// Deliver thread events (joins, leaves, renames), not just messages
    pub listen_events: bool,
    /// Deliver messages sent by this account
    pub self_listen: bool,
}

/// An authenticated connection for one platform account.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Id of the account this connection is logged in as
    fn current_user_id(&self) -> &str;

    /// Fetch profile metadata for a user
    async fn user_info(&self, user_id: &str) -> Result<UserInfo>;

    /// Send a text message to a thread or user
    async fn send_message(&self, text: &str, recipient_id: &str) -> Result<()>;

    /// Configure event delivery. Must be called before `listen`.
    fn set_options(&self, options: ListenOptions) -> Result<()>;

    /// Start receiving events
    async fn listen(&self) -> Result<EventStream>;

    /// Close the connection
    async fn logout(&self) -> Result<()> {
        Ok(())
    }
}

/// A messaging platform that can authenticate app state into connections.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Backend name for logging and metrics
    fn name(&self) -> &'static str;

    /// Authenticate with exported session cookies
    async fn connect(&self, state: &AppState) -> Result<SharedConnection>;
}
