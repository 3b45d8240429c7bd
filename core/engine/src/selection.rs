//! Picks the active account from the loaded account list.
//!
//! A pin in the card config always wins. Without a pin, a single-account
//! install selects itself and a multi-account install waits for the user.

use curbside_protocol::{AccountEntry, CardConfig};

/// Active account after the account list (re)loads.
pub fn select_after_load(
    config: &CardConfig,
    accounts: &[AccountEntry],
    current: Option<&str>,
) -> Option<String> {
    if let Some(pin) = &config.account_id {
        return Some(pin.clone());
    }
    if accounts.len() == 1 {
        return Some(accounts[0].account_id.clone());
    }
    current
        .filter(|id| is_listed(accounts, id))
        .map(str::to_string)
}

/// Active account after a manual pick. Pins override the pick, and an id
/// that is not in the list leaves the current selection alone.
pub fn select_manual(
    config: &CardConfig,
    accounts: &[AccountEntry],
    current: Option<&str>,
    requested: Option<&str>,
) -> Option<String> {
    if let Some(pin) = &config.account_id {
        return Some(pin.clone());
    }
    match requested {
        None => None,
        Some(id) if is_listed(accounts, id) => Some(id.to_string()),
        Some(_) => current.map(str::to_string),
    }
}

fn is_listed(accounts: &[AccountEntry], account_id: &str) -> bool {
    accounts
        .iter()
        .any(|account| account.account_id == account_id)
}
