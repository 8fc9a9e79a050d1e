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
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use super::{signed_in, validate_name, Beat, BeatError, BeatStore};
use crate::auth::{AuthState, Session, User};
use crate::sequencer::{Pattern, Tempo};

/// The account beats belong to when there is no backend.
pub const LOCAL_USER: &str = "local";

/// Keeps beats in process, with the same scoping and validation as the
/// hosted table. Nothing survives a restart.
pub struct MemoryBeatStore {
    auth: watch::Receiver<AuthState>,
    beats: Mutex<Vec<Beat>>,
    counter: AtomicU64,
}

impl MemoryBeatStore {
    pub fn new(auth: watch::Receiver<AuthState>) -> MemoryBeatStore {
        MemoryBeatStore {
            auth,
            beats: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// A store for when the backend is disabled. Beats belong to a local
    /// account and last until the process exits.
    pub fn offline() -> MemoryBeatStore {
        let (_state, auth) = watch::channel(AuthState::signed_in(Session {
            access_token: String::new(),
            refresh_token: None,
            expires_in: None,
            user: User {
                id: LOCAL_USER.to_string(),
                email: None,
            },
        }));
        MemoryBeatStore::new(auth)
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Timestamps that sort in the order they were handed out.
    fn timestamp(&self) -> String {
        format!("1970-01-01T00:00:00.{:09}+00:00", self.next())
    }

    fn user_id(&self) -> Result<String, BeatError> {
        Ok(signed_in(&self.auth.borrow())?.user.id)
    }
}

impl BeatStore for MemoryBeatStore {
    async fn create(&self, name: &str, bpm: Tempo, pattern: &Pattern) -> Result<Beat, BeatError> {
        let user_id = self.user_id()?;
        let name = validate_name(name)?;

        let now = self.timestamp();
        let beat = Beat {
            id: format!("local-{}", self.next()),
            user_id,
            name: name.to_string(),
            bpm,
            sequencer_data: *pattern,
            created_at: now.clone(),
            updated_at: now,
        };
        self.beats.lock().push(beat.clone());
        info!(id = %beat.id, name = %beat.name, "Saved beat in memory");
        Ok(beat)
    }

    async fn update(
        &self,
        id: &str,
        name: &str,
        bpm: Tempo,
        pattern: &Pattern,
    ) -> Result<Beat, BeatError> {
        let user_id = self.user_id()?;
        let name = validate_name(name)?;

        let now = self.timestamp();
        let mut beats = self.beats.lock();
        let beat = beats
            .iter_mut()
            .find(|beat| beat.id == id && beat.user_id == user_id)
            .ok_or_else(|| BeatError::NotFound(id.to_string()))?;
        beat.name = name.to_string();
        beat.bpm = bpm;
        beat.sequencer_data = *pattern;
        beat.updated_at = now;
        Ok(beat.clone())
    }

    async fn get(&self, id: &str) -> Result<Beat, BeatError> {
        let user_id = self.user_id()?;
        self.beats
            .lock()
            .iter()
            .find(|beat| beat.id == id && beat.user_id == user_id)
            .cloned()
            .ok_or_else(|| BeatError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Beat>, BeatError> {
        let user_id = self.user_id()?;
        let mut beats: Vec<Beat> = self
            .beats
            .lock()
            .iter()
            .filter(|beat| beat.user_id == user_id)
            .cloned()
            .collect();
        beats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(beats)
    }

    async fn delete(&self, id: &str) -> Result<(), BeatError> {
        let user_id = self.user_id()?;
        let mut beats = self.beats.lock();
        let before = beats.len();
        beats.retain(|beat| !(beat.id == id && beat.user_id == user_id));
        if beats.len() == before {
            return Err(BeatError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
