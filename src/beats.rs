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

//! The beat library: named patterns saved per account.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::auth::{AuthState, Session};
use crate::sequencer::{Pattern, Tempo};

pub mod memory;
pub mod remote;

pub use self::memory::MemoryBeatStore;
pub use self::remote::RemoteBeatStore;

/// The longest allowed beat name, in characters.
pub const MAX_NAME_LENGTH: usize = 100;

/// A saved beat as stored in the `beats` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub bpm: Tempo,
    #[serde(default)]
    pub sequencer_data: Pattern,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Error)]
pub enum BeatError {
    #[error("the beat library is unavailable because the backend is not configured")]
    NotConfigured,

    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    InvalidName(&'static str),

    #[error("beat {0} not found")]
    NotFound(String),

    #[error("the backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("the backend did not return the saved beat")]
    NoRepresentation,

    #[error("unexpected response from the backend: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unable to reach the backend: {0}")]
    Http(#[from] reqwest::Error),
}

/// Trims a beat name and checks that it is usable.
pub fn validate_name(name: &str) -> Result<&str, BeatError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BeatError::InvalidName("Please enter a name for your beat."));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(BeatError::InvalidName(
            "Beat name must be 100 characters or less.",
        ));
    }
    Ok(name)
}

/// The session the library is scoped to. Recovery sessions do not count.
pub(crate) fn signed_in(state: &AuthState) -> Result<Session, BeatError> {
    match &state.session {
        Some(session) if state.is_authenticated() => Ok(session.clone()),
        _ => Err(BeatError::NotAuthenticated),
    }
}

/// Storage for the signed in user's beats. The futures are `Send` so a store
/// can be driven from a spawned task.
pub trait BeatStore: Send + Sync {
    fn create(
        &self,
        name: &str,
        bpm: Tempo,
        pattern: &Pattern,
    ) -> impl Future<Output = Result<Beat, BeatError>> + Send;

    fn update(
        &self,
        id: &str,
        name: &str,
        bpm: Tempo,
        pattern: &Pattern,
    ) -> impl Future<Output = Result<Beat, BeatError>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Beat, BeatError>> + Send;

    /// Lists beats, newest first.
    fn list(&self) -> impl Future<Output = Result<Vec<Beat>, BeatError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), BeatError>> + Send;

    /// Deletes each beat in turn. A failure is reported for that beat and
    /// does not stop the rest.
    fn delete_many(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Vec<(String, Result<(), BeatError>)>> + Send {
        async move {
            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                let result = self.delete(id).await;
                if let Err(e) = &result {
                    warn!(id = %id, err = %e, "Failed to delete beat");
                }
                results.push((id.clone(), result));
            }
            results
        }
    }
}
