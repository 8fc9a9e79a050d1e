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
use reqwest::{Method, RequestBuilder, Response};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, span, warn, Instrument, Level};

use super::{signed_in, validate_name, Beat, BeatError, BeatStore};
use crate::auth::{AuthState, Session};
use crate::backend::{error_message, Backend, Connection};
use crate::sequencer::{Pattern, Tempo};

const TABLE: &str = "rest/v1/beats";

/// Beats kept in the hosted `beats` table, scoped to the signed in user.
pub struct RemoteBeatStore {
    backend: Backend,
    auth: watch::Receiver<AuthState>,
}

impl RemoteBeatStore {
    pub fn new(backend: Backend, auth: watch::Receiver<AuthState>) -> RemoteBeatStore {
        RemoteBeatStore { backend, auth }
    }

    /// The connection and session every call needs.
    fn scope(&self) -> Result<(&Connection, Session), BeatError> {
        let connection = self.backend.connection().ok_or(BeatError::NotConfigured)?;
        let session = signed_in(&self.auth.borrow())?;
        Ok((connection, session))
    }

    fn request(connection: &Connection, session: &Session, method: Method) -> RequestBuilder {
        connection
            .request(method, TABLE, Some(&session.access_token))
            .header("Prefer", "return=representation")
    }
}

/// Reads the rows of a response.
async fn rows(response: Response) -> Result<Vec<Beat>, BeatError> {
    if !response.status().is_success() {
        let (status, message) = error_message(response).await;
        warn!(status = status.as_u16(), reason = %message, "Beat request rejected");
        return Err(BeatError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

impl BeatStore for RemoteBeatStore {
    async fn create(&self, name: &str, bpm: Tempo, pattern: &Pattern) -> Result<Beat, BeatError> {
        let (connection, session) = self.scope()?;
        let name = validate_name(name)?;

        let response = Self::request(connection, &session, Method::POST)
            .json(&json!({
                "user_id": session.user.id,
                "name": name,
                "bpm": bpm,
                "sequencer_data": pattern,
            }))
            .send()
            .instrument(span!(Level::INFO, "save beat"))
            .await?;
        let beat = rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or(BeatError::NoRepresentation)?;
        info!(id = %beat.id, name = %beat.name, bpm = beat.bpm.bpm(), "Saved beat");
        Ok(beat)
    }

    async fn update(
        &self,
        id: &str,
        name: &str,
        bpm: Tempo,
        pattern: &Pattern,
    ) -> Result<Beat, BeatError> {
        let (connection, session) = self.scope()?;
        let name = validate_name(name)?;

        let response = Self::request(connection, &session, Method::PATCH)
            .query(&[("id", eq(id)), ("user_id", eq(&session.user.id))])
            .json(&json!({
                "name": name,
                "bpm": bpm,
                "sequencer_data": pattern,
                "updated_at": "now",
            }))
            .send()
            .instrument(span!(Level::INFO, "update beat"))
            .await?;
        let beat = rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BeatError::NotFound(id.to_string()))?;
        info!(id = %beat.id, name = %beat.name, bpm = beat.bpm.bpm(), "Updated beat");
        Ok(beat)
    }

    async fn get(&self, id: &str) -> Result<Beat, BeatError> {
        let (connection, session) = self.scope()?;

        let response = Self::request(connection, &session, Method::GET)
            .query(&[("select", "*".to_string()), ("id", eq(id))])
            .send()
            .await?;
        rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BeatError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Beat>, BeatError> {
        let (connection, session) = self.scope()?;

        let response = Self::request(connection, &session, Method::GET)
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;
        let beats = rows(response).await?;
        debug!(count = beats.len(), "Listed beats");
        Ok(beats)
    }

    async fn delete(&self, id: &str) -> Result<(), BeatError> {
        let (connection, session) = self.scope()?;

        let response = Self::request(connection, &session, Method::DELETE)
            .query(&[("id", eq(id)), ("user_id", eq(&session.user.id))])
            .send()
            .await?;
        if rows(response).await?.is_empty() {
            return Err(BeatError::NotFound(id.to_string()));
        }
        info!(id, "Deleted beat");
        Ok(())
    }
}
