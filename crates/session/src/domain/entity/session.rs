use tokio::sync::watch;

use super::identity::Identity;

/// Who is signed in, as seen by this process.
///
/// Starts out loading. The first provider notification resolves it to either
/// an identity or anonymous; a configuration failure resolves it straight to
/// a terminal error with loading cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub loading: bool,
    pub config_error: Option<String>,
}

impl SessionState {
    pub fn initial() -> Self {
        Self { identity: None, loading: true, config_error: None }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self { identity: None, loading: false, config_error: Some(message.into()) }
    }
}

/// Read-only view of the session state.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub(crate) fn new(rx: watch::Receiver<SessionState>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.rx.borrow().identity.clone()
    }

    /// Waits for the next state change. Returns `false` once the writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Waits until `predicate` holds and returns the matching state.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&SessionState) -> bool) -> Option<SessionState> {
        self.rx.wait_for(predicate).await.ok().map(|state| state.clone())
    }

    /// Waits until the loading phase is over.
    pub async fn resolved(&mut self) -> Option<SessionState> {
        self.wait_for(|state| !state.loading).await
    }
}
