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
use reqwest::{Method, Response};
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, span, warn, Instrument, Level};

use super::{
    messages::humanize, validate_password, AuthError, AuthState, Authenticator, LaunchMode,
    Session, SignUp, User,
};
use crate::backend::{error_message, Backend, Connection};

/// Authenticates against a GoTrue style identity service at
/// `<backend>/auth/v1`.
pub struct GoTrueAuth {
    backend: Backend,
    state: watch::Sender<AuthState>,
    /// Where recovery emails link back to.
    redirect_to: Option<String>,
}

impl GoTrueAuth {
    pub fn new(backend: Backend) -> GoTrueAuth {
        let (state, _) = watch::channel(AuthState::default());
        GoTrueAuth {
            backend,
            state,
            redirect_to: None,
        }
    }

    pub fn with_redirect(mut self, redirect_to: Option<&str>) -> GoTrueAuth {
        self.redirect_to = redirect_to.map(str::to_string);
        self
    }

    /// Adopts a session saved by an earlier run.
    pub fn restore(&self, session: Session) {
        info!(user = %session.user.id, "Restored session");
        self.state.send_replace(AuthState::signed_in(session));
    }

    /// Seeds the state from how the app was launched. A recovery launch puts
    /// the user in recovery mode, which only allows setting a new password.
    pub async fn begin(&self, launch: &LaunchMode) -> Result<(), AuthError> {
        let LaunchMode::Recovery {
            access_token,
            refresh_token,
        } = launch
        else {
            return Ok(());
        };

        let user = self
            .fetch_user(access_token)
            .instrument(span!(Level::INFO, "recovery"))
            .await?;
        info!(user = %user.id, "Entered password recovery");
        self.state.send_replace(AuthState::recovering(Session {
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
            expires_in: None,
            user,
        }));
        Ok(())
    }

    fn connection(&self) -> Result<&Connection, AuthError> {
        self.backend.connection().ok_or(AuthError::NotConfigured)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, AuthError> {
        let response = self
            .connection()?
            .request(Method::GET, "auth/v1/user", Some(access_token))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(response.json::<User>().await?)
    }
}

/// Turns a failed response into a user-facing error.
async fn rejected(response: Response) -> AuthError {
    let (status, message) = error_message(response).await;
    warn!(status = status.as_u16(), reason = %message, "Auth request rejected");
    AuthError::Rejected(humanize(&message))
}

fn required_email(email: &str) -> Result<&str, AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::MissingEmail);
    }
    Ok(email)
}

impl Authenticator for GoTrueAuth {
    fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp, AuthError> {
        let email = required_email(email)?;
        validate_password(password)?;

        let response = self
            .connection()?
            .request(Method::POST, "auth/v1/signup", None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        // Without email confirmation the service signs the user straight in.
        let body: Value = response.json().await?;
        if body.get("access_token").is_none() {
            info!(email, "Signed up, awaiting confirmation");
            return Ok(SignUp::ConfirmationRequired);
        }
        let session: Session = serde_json::from_value(body)?;
        info!(user = %session.user.id, "Signed up");
        self.state.send_replace(AuthState::signed_in(session.clone()));
        Ok(SignUp::SignedIn(session))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = required_email(email)?;

        let response = self
            .connection()?
            .request(Method::POST, "auth/v1/token", None)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let session: Session = response.json().await?;
        info!(user = %session.user.id, "Signed in");
        self.state.send_replace(AuthState::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.state.send_replace(AuthState::default());
        let (Some(session), Some(connection)) = (previous.session, self.backend.connection())
        else {
            return Ok(());
        };

        match connection
            .request(Method::POST, "auth/v1/logout", Some(&session.access_token))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(user = %session.user.id, "Signed out");
            }
            Ok(response) => {
                let (status, message) = error_message(response).await;
                warn!(
                    status = status.as_u16(),
                    reason = %message,
                    "Sign out rejected, local session cleared anyway"
                );
            }
            Err(e) => warn!(err = %e, "Unable to sign out, local session cleared anyway"),
        }
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = required_email(email)?;

        let mut request = self
            .connection()?
            .request(Method::POST, "auth/v1/recover", None)
            .json(&json!({ "email": email }));
        if let Some(redirect_to) = &self.redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        info!(email, "Requested password reset");
        Ok(())
    }

    async fn complete_password_reset(&self, new_password: &str) -> Result<(), AuthError> {
        validate_password(new_password)?;
        let session = self
            .state
            .borrow()
            .session
            .clone()
            .ok_or(AuthError::NoSession)?;

        let response = self
            .connection()?
            .request(Method::PUT, "auth/v1/user", Some(&session.access_token))
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        info!(user = %session.user.id, "Password updated");
        self.sign_out().await
    }
}
