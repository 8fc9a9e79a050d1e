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
use url::Url;

/// How the app was launched. A password reset email links back with the
/// recovery tokens in the URL fragment, e.g.
/// `#access_token=...&refresh_token=...&type=recovery`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchMode {
    Normal,
    Recovery {
        access_token: String,
        refresh_token: Option<String>,
    },
}

impl LaunchMode {
    /// Parses the launch URL. Anything that is not a well-formed recovery link
    /// is a normal launch.
    pub fn parse(url: &str) -> LaunchMode {
        let fragment = match Url::parse(url) {
            Ok(url) => url.fragment().map(str::to_string),
            // Accept a bare fragment as well as a full URL.
            Err(_) => url.split_once('#').map(|(_, fragment)| fragment.to_string()),
        };
        let Some(fragment) = fragment else {
            return LaunchMode::Normal;
        };

        let mut kind = None;
        let mut access_token = None;
        let mut refresh_token = None;
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "type" => kind = Some(value.into_owned()),
                "access_token" => access_token = Some(value.into_owned()),
                "refresh_token" => refresh_token = Some(value.into_owned()),
                _ => {}
            }
        }

        match (kind.as_deref(), access_token) {
            (Some("recovery"), Some(access_token)) if !access_token.is_empty() => {
                LaunchMode::Recovery {
                    access_token,
                    refresh_token: refresh_token.filter(|t| !t.is_empty()),
                }
            }
            _ => LaunchMode::Normal,
        }
    }

    /// Returns the URL with its fragment removed, so the tokens do not linger
    /// once the reset is done.
    pub fn cleared_url(url: &str) -> String {
        match Url::parse(url) {
            Ok(mut url) => {
                url.set_fragment(None);
                url.to_string()
            }
            Err(_) => url
                .split_once('#')
                .map(|(base, _)| base.to_string())
                .unwrap_or_else(|| url.to_string()),
        }
    }

    pub fn is_recovery(&self) -> bool {
        matches!(self, LaunchMode::Recovery { .. })
    }
}
