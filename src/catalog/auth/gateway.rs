//! Authenticated HTTP calls with single-flight token refresh.
//!
//! Every call carries `Authorization: Bearer <access token>`. When a call
//! comes back 401 the gateway refreshes the credential and replays the
//! call once. Concurrent 401s collapse into a single refresh request:
//! the first caller starts it, everyone else queues behind it and gets
//! the same outcome.
//!
//! The refresh itself runs as a detached task, so a caller that gets
//! cancelled mid-refresh (e.g. by an aggregation deadline) can't leave
//! the other waiters hanging. If the task dies without an outcome, the
//! waiters are released with an auth error.
//!
//! A credential already known to be expired is refreshed before the call
//! instead of spending a request on a guaranteed 401.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::{oneshot, watch};

use super::dto::{RefreshRequest, RefreshResponse};
use super::token::{Credential, TokenStore};
use super::transport::{ApiRequest, HttpTransport, RawResponse};
use crate::catalog::domain::CatalogError;

/// Refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Whether the local session is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// Refresh failed; the user has to authenticate again
    LoggedOut,
}

type RefreshOutcome = Result<Credential, CatalogError>;

/// Callers waiting on the in-flight refresh. `None` means no refresh is running.
type RefreshState = Option<Vec<oneshot::Sender<RefreshOutcome>>>;

struct GatewayInner {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenStore>,
    refresh: Mutex<RefreshState>,
    session: watch::Sender<SessionStatus>,
}

/// Authenticated API gateway. Cheap to clone.
#[derive(Clone)]
pub struct AuthGateway {
    inner: Arc<GatewayInner>,
}

impl AuthGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<dyn TokenStore>) -> Self {
        let initial = if tokens.get().is_some() {
            SessionStatus::Active
        } else {
            SessionStatus::LoggedOut
        };
        let (session, _) = watch::channel(initial);

        Self {
            inner: Arc::new(GatewayInner {
                transport,
                tokens,
                refresh: Mutex::new(None),
                session,
            }),
        }
    }

    /// Watch for log-out after a failed refresh.
    pub fn subscribe_session(&self) -> watch::Receiver<SessionStatus> {
        self.inner.session.subscribe()
    }

    pub fn session_status(&self) -> SessionStatus {
        *self.inner.session.borrow()
    }

    /// Current credential, if signed in.
    pub fn credential(&self) -> Option<Credential> {
        self.inner.tokens.get()
    }

    /// Perform an authenticated call.
    ///
    /// Non-2xx statuses are classified into [`CatalogError`]. A 401 triggers
    /// one refresh-and-replay; a second 401 logs the session out.
    pub async fn call(&self, request: &ApiRequest) -> Result<RawResponse, CatalogError> {
        let mut credential = self
            .inner
            .tokens
            .get()
            .ok_or_else(|| CatalogError::Auth("not signed in".to_string()))?;

        if credential.is_expired(Utc::now()) {
            tracing::debug!("Credential expired, refreshing before {}", request.path);
            credential = self.refreshed_credential(&credential).await?;
        }

        let response = self
            .inner
            .transport
            .send(request, Some(&credential.access_token))
            .await?;

        if response.status != 401 {
            return response.into_result();
        }

        tracing::debug!("{} returned 401, refreshing credential", request.path);
        let refreshed = self.refreshed_credential(&credential).await?;

        let replay = self
            .inner
            .transport
            .send(request, Some(&refreshed.access_token))
            .await?;

        if replay.status == 401 {
            let error = CatalogError::Auth(format!(
                "{} rejected the refreshed credential",
                request.path
            ));
            self.inner.log_out(&error);
            return Err(error);
        }
        replay.into_result()
    }

    /// Authenticated call that decodes a JSON body.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, CatalogError> {
        self.call(request).await?.json()
    }

    /// Obtain a credential newer than `stale`, joining an in-flight refresh
    /// if there is one.
    async fn refreshed_credential(&self, stale: &Credential) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();

        let start_refresh = {
            let mut state = self.inner.refresh.lock();
            match state.as_mut() {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    // A refresh may have finished between our send and our 401
                    if let Some(current) = self.inner.tokens.get()
                        && current.access_token != stale.access_token
                    {
                        return Ok(current);
                    }
                    *state = Some(vec![tx]);
                    true
                }
            }
        };

        if start_refresh {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_refresh().await });
        }

        rx.await
            .map_err(|_| CatalogError::Auth("credential refresh was abandoned".to_string()))?
    }
}

/// Releases the refresh waiters when dropped.
///
/// [`settle`](Self::settle) hands every waiter the outcome. Dropping the
/// guard unsettled (the refresh task panicked or was torn down) drops the
/// senders instead, which waiters see as an abandoned refresh.
struct Waiters<'a> {
    refresh: &'a Mutex<RefreshState>,
}

impl Waiters<'_> {
    fn settle(self, outcome: &RefreshOutcome) {
        let waiters = self.refresh.lock().take().unwrap_or_default();
        tracing::debug!("Settling {} refresh waiter(s)", waiters.len());
        for waiter in waiters {
            // A waiter that went away no longer cares
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for Waiters<'_> {
    fn drop(&mut self) {
        if let Some(waiters) = self.refresh.lock().take() {
            tracing::warn!(
                "Credential refresh ended without an outcome, releasing {} waiter(s)",
                waiters.len()
            );
        }
    }
}

/// Absolute expiry for a token valid for `expires_in` seconds.
///
/// A lifetime that isn't positive or doesn't fit a timestamp is treated
/// as unknown.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Option<DateTime<Utc>> {
    if expires_in <= 0 {
        return None;
    }
    chrono::Duration::try_seconds(expires_in).and_then(|lifetime| now.checked_add_signed(lifetime))
}

impl GatewayInner {
    /// Refresh, persist or log out, then settle every waiter with the same outcome.
    async fn run_refresh(&self) {
        let waiters = Waiters {
            refresh: &self.refresh,
        };
        let outcome = self.request_new_credential().await;

        match &outcome {
            Ok(credential) => {
                self.tokens.set(credential.clone());
                self.session.send_replace(SessionStatus::Active);
                tracing::info!("Credential refreshed");
            }
            Err(e) => self.log_out(e),
        }

        waiters.settle(&outcome);
    }

    async fn request_new_credential(&self) -> RefreshOutcome {
        let current = self
            .tokens
            .get()
            .ok_or_else(|| CatalogError::Auth("no refresh credential".to_string()))?;

        let body = serde_json::to_value(RefreshRequest {
            refresh_token: current.refresh_token.clone(),
        })
        .map_err(|e| CatalogError::Auth(format!("refresh request: {}", e)))?;

        let response = self
            .transport
            .send(&ApiRequest::post(REFRESH_PATH, body), None)
            .await
            .map_err(|e| CatalogError::Auth(format!("refresh failed: {}", e)))?;

        if !response.is_success() {
            return Err(CatalogError::Auth(format!(
                "refresh rejected (HTTP {})",
                response.status
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .map_err(|e| CatalogError::Auth(format!("refresh response: {}", e)))?;

        let expires_at = expiry_after(Utc::now(), refreshed.expires_in);
        if expires_at.is_none() {
            tracing::warn!(
                "Refresh returned unusable expiresIn {}, expiry unknown",
                refreshed.expires_in
            );
        }

        Ok(Credential {
            access_token: refreshed.token,
            refresh_token: refreshed.refresh_token.unwrap_or(current.refresh_token),
            expires_at,
        })
    }

    fn log_out(&self, error: &CatalogError) {
        tracing::warn!("Session ended: {}", error);
        self.tokens.clear();
        self.session.send_replace(SessionStatus::LoggedOut);
    }
}
