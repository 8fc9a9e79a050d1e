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

/// Finds the user-facing text for a lowercased backend message.
fn known_message(message: &str) -> Option<&'static str> {
    let has = |needle: &str| message.contains(needle);

    if has("invalid login credentials") {
        Some("Invalid email or password. Please check your credentials and try again.")
    } else if has("email not confirmed") {
        Some("Please check your email and click the confirmation link before logging in.")
    } else if has("too many requests") {
        Some("Too many login attempts. Please wait a moment and try again.")
    } else if has("rate limit") {
        Some("Too many requests. Please wait a moment and try again.")
    } else if has("user already registered") || has("already been registered") {
        Some("An account with this email already exists. Try signing in instead.")
    } else if has("same as") || has("different from the old") {
        Some("New password must be different from your current password.")
    } else if has("weak") || has("at least 6 characters") {
        Some("Password is too weak. Please choose a stronger password.")
    } else if has("expired") || (has("invalid") && (has("token") || has("link"))) {
        Some("This password reset link is invalid or has expired. Please request a new one.")
    } else if has("not found") {
        Some("No account found with this email address.")
    } else {
        None
    }
}

/// Turns a raw backend error into something a user can act on. Messages that
/// are not recognized pass through unchanged.
pub fn humanize(message: &str) -> String {
    known_message(&message.to_lowercase())
        .map(str::to_string)
        .unwrap_or_else(|| message.to_string())
}
