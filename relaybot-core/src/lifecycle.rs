// ABOUTME: Login state machine: validate app state, reserve the account id, connect in the background.
// ABOUTME: Any failure after the reservation rolls the slot back; a finished event stream removes it.

use crate::dispatch::Dispatcher;
use crate::error::{CredentialError, SessionError};
use crate::heartbeat::Heartbeat;
use crate::metrics;
use crate::session::{Account, Reservation, SessionStore, SlotState};
use relaybot_platform::{AppState, ListenOptions, Platform, SharedConnection, IDENTITY_COOKIE};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Immediate answer to a login request
#[derive(Debug)]
pub enum LoginOutcome {
    /// The id was reserved and the connection is being established
    Accepted(PendingLogin),
    /// The id already has a live session
    AlreadyActive(Account),
    /// Another login for the id is still in flight
    InProgress,
    Rejected(CredentialError),
}

/// Handle on a login that finishes in the background
#[derive(Debug)]
pub struct PendingLogin {
    account_id: String,
    task: JoinHandle<Result<Account, SessionError>>,
}

impl PendingLogin {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Wait for the login to finish. Dropping the handle instead lets it run detached.
    pub async fn wait(self) -> Result<Account, SessionError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(account_id = %self.account_id, error = %e, "Login task did not complete");
                Err(SessionError::Aborted)
            }
        }
    }
}

/// Check that the app state carries a usable identity cookie and return its value
pub fn validate_credentials(state: Option<&AppState>) -> Result<String, CredentialError> {
    let state = state.ok_or(CredentialError::MissingState)?;
    state.identity().ok_or_else(|| {
        if state.contains(IDENTITY_COOKIE) {
            CredentialError::EmptyIdentity
        } else {
            CredentialError::MissingIdentity
        }
    })
}

/// Drives logins from app state to a listening, dispatching session
#[derive(Clone)]
pub struct LifecycleController {
    platform: Arc<dyn Platform>,
    store: SessionStore,
    dispatcher: Dispatcher,
    heartbeat: Option<Heartbeat>,
    connect_timeout: Duration,
}

impl LifecycleController {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: SessionStore,
        dispatcher: Dispatcher,
        heartbeat: Option<Heartbeat>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            store,
            dispatcher,
            heartbeat,
            connect_timeout,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Validate and reserve synchronously, then establish the session on a
    /// spawned task. Must be called from within a Tokio runtime.
    pub fn login(&self, state: Option<AppState>) -> LoginOutcome {
        let account_id = match validate_credentials(state.as_ref()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected login with invalid app state");
                metrics::record_login("rejected");
                return LoginOutcome::Rejected(e);
            }
        };
        // validate_credentials only succeeds on Some
        let Some(state) = state else {
            return LoginOutcome::Rejected(CredentialError::MissingState);
        };

        let reservation = match self.store.reserve(&account_id) {
            Ok(reservation) => reservation,
            Err(SlotState::Active(account)) => {
                tracing::info!(account_id = %account_id, "Account is already logged in");
                metrics::record_login("already_active");
                return LoginOutcome::AlreadyActive(account);
            }
            Err(SlotState::Pending) => {
                tracing::info!(account_id = %account_id, "Login already in progress");
                metrics::record_login("in_progress");
                return LoginOutcome::InProgress;
            }
        };

        tracing::info!(account_id = %account_id, platform = self.platform.name(), "Login accepted");
        metrics::record_login("accepted");

        let controller = self.clone();
        let task_account_id = account_id.clone();
        let task = tokio::spawn(async move {
            let result = controller.establish(reservation, state).await;
            match &result {
                Ok(account) => {
                    tracing::info!(
                        account_id = %task_account_id,
                        name = %account.display_name,
                        "Session established"
                    );
                    metrics::record_login("established");
                }
                Err(e) => {
                    tracing::error!(account_id = %task_account_id, error = %e, "Login failed");
                    metrics::record_login(e.kind());
                }
            }
            result
        });

        LoginOutcome::Accepted(PendingLogin { account_id, task })
    }

    /// Connect and verify identity. The reservation rolls back if this returns early.
    async fn establish(
        &self,
        reservation: Reservation,
        state: AppState,
    ) -> Result<Account, SessionError> {
        let connection =
            match tokio::time::timeout(self.connect_timeout, self.platform.connect(&state)).await {
                Err(_) => return Err(SessionError::Timeout(self.connect_timeout)),
                Ok(Err(e)) => return Err(SessionError::Authentication(e)),
                Ok(Ok(connection)) => connection,
            };

        let result = self.start_session(&reservation, connection.clone()).await;
        match result {
            Ok(account) => {
                reservation.commit();
                Ok(account)
            }
            Err(e) => {
                drop(reservation);
                if let Err(logout_err) = connection.logout().await {
                    tracing::debug!(error = %logout_err, "Logout after failed login also failed");
                }
                Err(e)
            }
        }
    }

    async fn start_session(
        &self,
        reservation: &Reservation,
        connection: SharedConnection,
    ) -> Result<Account, SessionError> {
        let account_id = reservation.id().to_string();

        if connection.current_user_id() != account_id {
            return Err(SessionError::IdentityMismatch {
                expected: account_id,
                actual: connection.current_user_id().to_string(),
            });
        }

        let info = connection
            .user_info(&account_id)
            .await
            .map_err(SessionError::IdentityFetch)?;
        let account = Account::from_user_info(account_id.clone(), info);

        if !reservation.activate(account.clone(), connection.clone()) {
            // Slot removed underneath us (shutdown)
            return Err(SessionError::Aborted);
        }

        if let Some(heartbeat) = &self.heartbeat {
            let handle = heartbeat
                .arm(connection.clone())
                .await
                .map_err(SessionError::HeartbeatArm)?;
            reservation.attach_heartbeat(handle);
            tracing::debug!(
                account_id = %account_id,
                destination = %heartbeat.destination_id(),
                "Heartbeat armed"
            );
        }

        connection
            .set_options(ListenOptions {
                listen_events: true,
                self_listen: false,
            })
            .map_err(SessionError::Listen)?;
        let stream = connection.listen().await.map_err(SessionError::Listen)?;

        let dispatcher = self.dispatcher.clone();
        let store = self.store.clone();
        let generation = reservation.generation();
        let listener_id = account_id.clone();
        let listener = tokio::spawn(async move {
            dispatcher.run(connection, stream).await;
            if store.remove_generation(&listener_id, generation) {
                tracing::info!(account_id = %listener_id, "Session removed after event stream ended");
            }
        });
        reservation.attach_listener(listener);

        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybot_platform::StateEntry;

    #[test]
    fn test_validate_credentials() {
        assert_eq!(
            validate_credentials(None),
            Err(CredentialError::MissingState)
        );

        let no_cookie = AppState::new(vec![StateEntry::new("xs", "secret")]);
        assert_eq!(
            validate_credentials(Some(&no_cookie)),
            Err(CredentialError::MissingIdentity)
        );

        let blank = AppState::new(vec![StateEntry::new("c_user", "  ")]);
        assert_eq!(
            validate_credentials(Some(&blank)),
            Err(CredentialError::EmptyIdentity)
        );

        let ok = AppState::new(vec![
            StateEntry::new("xs", "secret"),
            StateEntry::new("c_user", " 123 "),
        ]);
        assert_eq!(validate_credentials(Some(&ok)), Ok("123".to_string()));
    }

    #[test]
    fn test_validate_credentials_with_raw_json_values() {
        let numeric: AppState = serde_json::from_value(serde_json::json!([
            {"key": "lsd", "value": null},
            {"key": "c_user", "value": 123}
        ]))
        .unwrap();
        assert_eq!(validate_credentials(Some(&numeric)), Ok("123".to_string()));

        let null_identity: AppState =
            serde_json::from_value(serde_json::json!([{"key": "c_user", "value": null}])).unwrap();
        assert_eq!(
            validate_credentials(Some(&null_identity)),
            Err(CredentialError::EmptyIdentity)
        );
    }
}
