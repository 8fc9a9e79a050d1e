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
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

use super::Session;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("unable to access session file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("session file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Keeps the signed in session on disk between runs.
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> SessionStore {
        SessionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved session. A missing file means nobody is signed in.
    pub fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let session =
            serde_json::from_str(&contents).map_err(|source| SessionStoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = ?self.path, "Loaded session");
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let json =
            serde_json::to_string_pretty(session).map_err(|source| SessionStoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, json).map_err(|source| SessionStoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = ?self.path, "Saved session");
        Ok(())
    }

    /// Removes the saved session. Clearing when nothing is saved is fine.
    pub fn clear(&self) -> Result<(), SessionStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionStoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
