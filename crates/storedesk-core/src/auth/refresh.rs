//! Single-flight access token refresh.
//!
//! However many requests notice an expiring token or a 401 at the same
//! moment, only one call to `/auth/token/refresh/` is made and every caller
//! observes its outcome. The pending refresh is a shared future held in a
//! slot; the slot is emptied once the refresh settles so the next call
//! starts a fresh attempt.
//!
//! The coordinator also numbers login sessions. Requests remember the epoch
//! they were prepared in, so a failed refresh ends that session once no
//! matter how many requests observe it, and a refresh that settles after
//! logout or a new login never writes its token back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{CredentialError, CredentialStore};
use crate::api::{ApiBaseUrl, ApiRequest, TimeoutPolicy, Transport, TransportError};
use crate::models::RefreshResponse;

pub const REFRESH_PATH: &str = "/auth/token/refresh/";

type PendingRefresh = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Error, Debug)]
enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh token rejected: {0}")]
    Rejected(String),

    #[error("refresh endpoint returned status {0}")]
    Status(u16),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Store(#[from] CredentialError),

    #[error("session ended while the refresh was in flight")]
    Superseded,
}

impl RefreshError {
    /// Only these mean the stored credentials are worthless. Anything else may
    /// succeed on a later attempt, so credentials are left alone.
    fn invalidates_session(&self) -> bool {
        matches!(
            self,
            RefreshError::MissingRefreshToken | RefreshError::Rejected(_)
        )
    }
}

/// Login session numbering. `current` is bumped on login; a session is over
/// once `ended >= epoch`. Token writes and epoch changes are serialized by
/// `persist`.
struct SessionEpochs {
    current: AtomicU64,
    ended: AtomicU64,
    persist: tokio::sync::Mutex<()>,
}

impl Default for SessionEpochs {
    fn default() -> Self {
        Self {
            current: AtomicU64::new(1),
            ended: AtomicU64::new(0),
            persist: tokio::sync::Mutex::new(()),
        }
    }
}

impl SessionEpochs {
    fn is_live(&self, epoch: u64) -> bool {
        self.current.load(Ordering::SeqCst) == epoch && self.ended.load(Ordering::SeqCst) < epoch
    }
}

struct RefreshWorker {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    base_url: Arc<ApiBaseUrl>,
    timeouts: TimeoutPolicy,
    epochs: SessionEpochs,
}

impl RefreshWorker {
    async fn run(&self) -> Option<String> {
        let epoch = self.epochs.current.load(Ordering::SeqCst);
        match self.refresh(epoch).await {
            Ok(token) => {
                info!("Access token refreshed");
                Some(token)
            }
            Err(RefreshError::Superseded) => {
                debug!("Session changed during refresh, discarding new token");
                None
            }
            Err(e) if e.invalidates_session() => {
                let _persist = self.epochs.persist.lock().await;
                if !self.epochs.is_live(epoch) {
                    debug!(error = %e, "Token refresh failed for a session that already ended");
                    return None;
                }
                warn!(error = %e, "Token refresh failed, clearing stored credentials");
                if let Err(e) = self.store.clear_all().await {
                    warn!(error = %e, "Failed to clear credentials");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, keeping stored credentials");
                None
            }
        }
    }

    async fn refresh(&self, epoch: u64) -> Result<String, RefreshError> {
        let refresh = self
            .store
            .get_refresh_token()
            .await?
            .ok_or(RefreshError::MissingRefreshToken)?;

        let mut request =
            ApiRequest::new(Method::POST, REFRESH_PATH).with_body(json!({ "refresh": refresh }));
        request.base_url = self.base_url.get();
        request.timeout = Some(self.timeouts.classify(REFRESH_PATH, "post"));

        let response = self.transport.send(&request).await?;
        match response.status {
            200..=299 => {}
            401 => return Err(RefreshError::Rejected(response.body)),
            status => return Err(RefreshError::Status(status)),
        }

        let parsed: RefreshResponse = response
            .json()
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        let _persist = self.epochs.persist.lock().await;
        if !self.epochs.is_live(epoch) {
            return Err(RefreshError::Superseded);
        }
        // The refresh token is reused, not rotated
        self.store.save_tokens(&parsed.access, &refresh).await?;
        Ok(parsed.access)
    }
}

#[derive(Default)]
struct InFlight {
    next_id: u64,
    current: Option<(u64, PendingRefresh)>,
}

/// Owns the refresh protocol. One per client; share it behind an `Arc`.
pub struct RefreshCoordinator {
    worker: Arc<RefreshWorker>,
    in_flight: Mutex<InFlight>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        base_url: Arc<ApiBaseUrl>,
        timeouts: TimeoutPolicy,
    ) -> Self {
        Self {
            worker: Arc::new(RefreshWorker {
                transport,
                store,
                base_url,
                timeouts,
                epochs: SessionEpochs::default(),
            }),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    /// Obtain a new access token, joining the in-flight refresh if there is
    /// one. `None` means no token could be obtained.
    pub async fn refresh(&self) -> Option<String> {
        let (id, pending) = {
            let mut state = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match &state.current {
                Some((id, pending)) => {
                    debug!("Joining in-flight token refresh");
                    (*id, pending.clone())
                }
                None => {
                    state.next_id += 1;
                    let id = state.next_id;
                    let worker = Arc::clone(&self.worker);
                    let pending = async move { worker.run().await }.boxed().shared();
                    state.current = Some((id, pending.clone()));
                    (id, pending)
                }
            }
        };

        let result = pending.await;

        let mut state = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(state.current, Some((current, _)) if current == id) {
            state.current = None;
        }
        result
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .is_some()
    }

    /// Epoch of the current login session.
    pub fn session_epoch(&self) -> u64 {
        self.worker.epochs.current.load(Ordering::SeqCst)
    }

    /// Start a new login session. Refreshes begun before this call can no
    /// longer persist their result.
    pub async fn begin_session(&self) -> u64 {
        let epochs = &self.worker.epochs;
        let _persist = epochs.persist.lock().await;
        let epoch = epochs.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.forget_in_flight();
        debug!(epoch, "Session started");
        epoch
    }

    /// Mark session `epoch` as over. Returns true only for the first caller
    /// to end it; that caller owns the teardown.
    pub async fn end_session(&self, epoch: u64) -> bool {
        let epochs = &self.worker.epochs;
        let _persist = epochs.persist.lock().await;
        let first = epochs.ended.fetch_max(epoch, Ordering::SeqCst) < epoch;
        if first {
            self.forget_in_flight();
            debug!(epoch, "Session ended");
        }
        first
    }

    /// End whatever session is current, e.g. on logout.
    pub async fn end_current_session(&self) -> bool {
        self.end_session(self.session_epoch()).await
    }

    pub fn is_session_ended(&self, epoch: u64) -> bool {
        self.worker.epochs.ended.load(Ordering::SeqCst) >= epoch
    }

    // Callers already awaiting keep their handle; new callers start over.
    fn forget_in_flight(&self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current = None;
    }
}
