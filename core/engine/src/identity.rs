//! Resolves which favorites sensor belongs to an account.
//!
//! Accounts are keyed by an opaque id, but their favorites sensor is named
//! after a backend slug. When the config does not pin a sensor explicitly,
//! the engine derives the slug, preferring in order:
//!
//! 1. the identifier declared on the account itself,
//! 2. a registry entity that already follows the favorites naming convention,
//! 3. a trailing parenthesized identifier in the account title,
//! 4. the opaque account id.
//!
//! Source 1 is available without leaving the loaded account list; the others
//! require an external lookup, which is tracked here with a cooldown so a
//! flapping backend is not hammered on every refresh.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use curbside_protocol::{slug_from_favorites_entity, AccountEntry, RegistryEntry};

/// Minimum gap between resolution attempts for the same account.
pub const RESOLVE_COOLDOWN_SECS: i64 = 30;

static RE_TRAILING_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]+)\)\s*$").unwrap());

/// Lowercases and collapses every run of non-alphanumeric characters into a
/// single `_`, with no leading or trailing separator. ASCII-only on purpose:
/// backend identifiers and entity ids never carry anything wider.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut gap = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('_');
            }
            gap = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }
    slug
}

/// Identifier embedded in a display title, e.g. `Main Street 12 (00012345)`.
pub fn identifier_from_title(title: &str) -> Option<String> {
    let captures = RE_TRAILING_IDENTIFIER.captures(title)?;
    let identifier = captures.get(1)?.as_str().trim();
    if identifier.is_empty() {
        None
    } else {
        Some(identifier.to_string())
    }
}

/// Slug from the identifier declared on the account, when it has one.
/// This is the only source that needs no external lookup.
pub fn declared_slug(account: &AccountEntry) -> Option<String> {
    let identifier = account.identifier.as_deref()?;
    non_empty(slugify(identifier))
}

/// Full derivation used by the external lookup: fresh account listing plus
/// entity registry. `None` when the account is gone or no source yields a
/// usable slug.
pub fn derive_slug(
    account_id: &str,
    accounts: &[AccountEntry],
    registry: &[RegistryEntry],
) -> Option<String> {
    let account = accounts
        .iter()
        .find(|account| account.account_id == account_id)?;

    if let Some(slug) = declared_slug(account) {
        return Some(slug);
    }

    let registered = registry.iter().find_map(|entry| {
        if entry.account_id != account_id {
            return None;
        }
        slug_from_favorites_entity(&entry.entity_id).map(str::to_string)
    });
    if let Some(slug) = registered {
        return Some(slug);
    }

    if let Some(identifier) = identifier_from_title(&account.title) {
        if let Some(slug) = non_empty(slugify(&identifier)) {
            return Some(slug);
        }
    }

    non_empty(slugify(account_id))
}

fn non_empty(slug: String) -> Option<String> {
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "snake_case", tag = "status", content = "slug")]
pub enum IdentityState {
    #[default]
    Unresolved,
    Resolving,
    Resolved(String),
    Failed,
}

/// Per-account resolution progress.
///
/// `attempted_account_id` pins in-flight lookups to the account they were
/// started for, so a result arriving after the user switched accounts is
/// recognized as stale and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct IdentityTracker {
    pub state: IdentityState,
    pub attempted_account_id: Option<String>,
    pub attempted_at: Option<DateTime<Utc>>,
}

impl IdentityTracker {
    /// Clears all progress; called whenever the active account changes.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn slug(&self) -> Option<&str> {
        match &self.state {
            IdentityState::Resolved(slug) => Some(slug),
            _ => None,
        }
    }

    /// Whether a new attempt may start now. Resolved and in-flight states
    /// never retry; a failed attempt retries only after the cooldown.
    pub fn can_attempt(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            IdentityState::Resolved(_) | IdentityState::Resolving => false,
            IdentityState::Unresolved | IdentityState::Failed => match self.attempted_at {
                Some(attempted_at) => {
                    now.signed_duration_since(attempted_at).num_seconds() >= RESOLVE_COOLDOWN_SECS
                }
                None => true,
            },
        }
    }

    /// Marks an external lookup as started for `account_id`.
    pub fn begin(&mut self, account_id: &str, now: DateTime<Utc>) {
        self.state = IdentityState::Resolving;
        self.attempted_account_id = Some(account_id.to_string());
        self.attempted_at = Some(now);
    }

    /// Records a slug obtained without an external lookup.
    pub fn mark_resolved(&mut self, account_id: &str, slug: String, now: DateTime<Utc>) {
        self.state = IdentityState::Resolved(slug);
        self.attempted_account_id = Some(account_id.to_string());
        self.attempted_at = Some(now);
    }

    /// Applies a lookup result. Returns `false` when the result is stale,
    /// i.e. no lookup is in flight for this account; the caller must then
    /// discard it without touching any state.
    pub fn complete(&mut self, account_id: &str, slug: Option<String>) -> bool {
        let in_flight = self.state == IdentityState::Resolving
            && self.attempted_account_id.as_deref() == Some(account_id);
        if !in_flight {
            return false;
        }
        self.state = match slug {
            Some(slug) => IdentityState::Resolved(slug),
            None => IdentityState::Failed,
        };
        true
    }
}
