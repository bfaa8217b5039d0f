//! Authentication façade with observable state.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use super::backend::{AuthBackend, AuthUser, Backend, Credentials, Session, SignUp};
use crate::{HuginnError, Result};

/// Current authentication state, published to subscribers on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthState {
    #[default]
    SignedOut,
    SignedIn(Session),
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::SignedIn(session) => Some(session),
            AuthState::SignedOut => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session().map(|s| s.user.id.as_str())
    }
}

/// Sign up, sign in and sign out, keeping the data backend's access token
/// in step with the session.
#[derive(Clone)]
pub struct Auth {
    backend: Arc<dyn AuthBackend>,
    data: Arc<dyn Backend>,
    state: Arc<watch::Sender<AuthState>>,
}

impl Auth {
    pub(crate) fn new(backend: Arc<dyn AuthBackend>, data: Arc<dyn Backend>) -> Self {
        let (tx, _rx) = watch::channel(AuthState::SignedOut);
        Self {
            backend,
            data,
            state: Arc::new(tx),
        }
    }

    fn publish(&self, state: AuthState) {
        self.data
            .set_access_token(state.session().map(|s| s.access_token.clone()));
        self.state.send_replace(state);
    }

    /// Subscribe to auth state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Current state snapshot.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<SignUp> {
        if password.len() < 6 {
            return Err(HuginnError::validation(
                "password",
                "must be at least 6 characters",
            ));
        }
        let signed_up = self
            .backend
            .sign_up(&Credentials::new(email, password), metadata)
            .await?;
        if let Some(session) = &signed_up.session {
            info!(user_id = %session.user.id, "signed up");
            self.publish(AuthState::SignedIn(session.clone()));
        }
        Ok(signed_up)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .backend
            .sign_in(&Credentials::new(email, password))
            .await?;
        info!(user_id = %session.user.id, "signed in");
        self.publish(AuthState::SignedIn(session.clone()));
        Ok(session)
    }

    /// Sign out. Local state is cleared even if the backend call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let token = self.state().session().map(|s| s.access_token.clone());
        self.publish(AuthState::SignedOut);
        match token {
            Some(token) => self.backend.sign_out(&token).await,
            None => Ok(()),
        }
    }

    /// The signed-in user as the auth service sees it, or `None` when signed out.
    pub async fn current_user(&self) -> Result<Option<AuthUser>> {
        let Some(token) = self.state().session().map(|s| s.access_token.clone()) else {
            return Ok(None);
        };
        match self.backend.current_user(&token).await {
            Ok(user) => Ok(Some(user)),
            Err(HuginnError::Unauthorized(reason)) => {
                debug!(%reason, "session rejected, signing out locally");
                self.publish(AuthState::SignedOut);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
