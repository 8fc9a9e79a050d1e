// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Accounts: signing up and in against the hosted identity service, password
//! recovery, and the session that scopes the beat library.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

pub mod gotrue;
pub mod messages;
pub mod recovery;
pub mod session;

pub use self::gotrue::GoTrueAuth;
pub use self::messages::humanize;
pub use self::recovery::LaunchMode;
pub use self::session::{SessionStore, SessionStoreError};

/// The shortest password accepted on sign up or reset.
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed in session as issued by the identity service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: User,
}

/// Whether the session came from a normal sign in or from a password
/// recovery link. A recovery session may only be used to set a new password.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionMode {
    #[default]
    Normal,
    Recovery,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub mode: SessionMode,
}

impl AuthState {
    pub fn signed_in(session: Session) -> AuthState {
        AuthState {
            session: Some(session),
            mode: SessionMode::Normal,
        }
    }

    pub fn recovering(session: Session) -> AuthState {
        AuthState {
            session: Some(session),
            mode: SessionMode::Recovery,
        }
    }

    /// True only for a session in normal mode.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some() && self.mode == SessionMode::Normal
    }

    pub fn is_recovery(&self) -> bool {
        self.session.is_some() && self.mode == SessionMode::Recovery
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|session| &session.user)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.access_token.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("accounts are unavailable because the backend is not configured")]
    NotConfigured,

    #[error("Email is required.")]
    MissingEmail,

    #[error("Password must be at least 6 characters long.")]
    WeakPassword,

    #[error("{0}")]
    Rejected(String),

    #[error("no active session")]
    NoSession,

    #[error("unexpected response from the backend: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unable to reach the backend: {0}")]
    Http(#[from] reqwest::Error),
}

/// The outcome of a sign up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignUp {
    /// The account is ready and signed in.
    SignedIn(Session),
    /// The account must be confirmed from the email that was sent.
    ConfirmationRequired,
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

/// Account operations against an identity service.
#[allow(async_fn_in_trait)]
pub trait Authenticator {
    /// The current state.
    fn state(&self) -> AuthState;

    /// Observes state changes.
    fn subscribe(&self) -> watch::Receiver<AuthState>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    /// Ends the session. The local state is always cleared.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Sends a recovery link to the given address.
    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Sets a new password using the current (usually recovery) session and
    /// signs out afterwards.
    async fn complete_password_reset(&self, new_password: &str) -> Result<(), AuthError>;
}
