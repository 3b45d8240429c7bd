//! Pure reconciliation: one change in, a new state plus effects out.
//!
//! Every card behavior flows through [`reconcile`]. The runtime in
//! [`crate::engine`] executes the returned effects and feeds their results
//! back as further changes, so this layer never touches the host or a clock
//! beyond the injected `now`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use curbside_protocol::{
    favorites_entity_for_slug, favorites_from_state, submission_name, submission_plate,
    AccountEntry, CardConfig, EntityState, ErrorInfo, Favorite, Notice, ServiceRequest,
};

use crate::identity::{declared_slug, IdentityTracker};
use crate::matcher::{is_duplicate_of_other, matching_index};
use crate::normalize::{comparable_name, comparable_plate};
use crate::selection::{select_after_load, select_manual};

/// Draft reservation form as the user sees it. `name` and `license_plate`
/// hold the raw text; normalization happens at comparison and submission.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Draft {
    pub name: String,
    pub license_plate: String,
    /// Index into the favorites list, set by an explicit pick.
    pub selected_favorite: Option<usize>,
    /// Whether submitting should also save or update the favorite.
    pub remember: bool,
}

/// Which favorite actions the card offers, and whether they are usable.
/// An action can be visible but disabled, e.g. an update whose draft is
/// missing a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct ActionFlags {
    pub show_add: bool,
    pub add_enabled: bool,
    pub show_update: bool,
    pub update_enabled: bool,
    pub show_delete: bool,
    pub delete_enabled: bool,
}

/// Complete card state. The runtime owns one and hands out snapshots; tests
/// drive [`reconcile`] over it directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardState {
    pub config: CardConfig,
    /// `None` until the first account listing arrives.
    pub accounts: Option<Vec<AccountEntry>>,
    pub active_account: Option<String>,
    pub identity: IdentityTracker,
    /// Favorites sensor currently feeding the card.
    pub favorites_entity: Option<String>,
    pub favorites: Vec<Favorite>,
    pub draft: Draft,
    pub submitting: bool,
    pub deleting: bool,
}

impl CardState {
    pub fn new(config: CardConfig) -> Self {
        Self {
            config,
            accounts: None,
            active_account: None,
            identity: IdentityTracker::default(),
            favorites_entity: None,
            favorites: Vec::new(),
            draft: Draft::default(),
            submitting: false,
            deleting: false,
        }
    }

    /// Favorite referenced by the draft, when the index is in range.
    pub fn selected_favorite(&self) -> Option<&Favorite> {
        self.draft
            .selected_favorite
            .and_then(|index| self.favorites.get(index))
    }

    /// The reserve button needs a plate and no submission in flight.
    pub fn can_submit(&self) -> bool {
        !self.submitting && !submission_plate(&self.draft.license_plate).is_empty()
    }
}

/// User interactions forwarded by the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum UserIntent {
    SelectAccount(Option<String>),
    SelectFavorite(Option<usize>),
    EditName(String),
    EditPlate(String),
    SetRemember(bool),
    Submit,
    DeleteFavorite,
}

/// Which favorite bookkeeping a submission carried along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteWrite {
    Create,
    Update,
}

/// How far a submission got. A reservation can land while its favorite
/// follow-up fails; both sides are reported separately.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed { favorite: Option<FavoriteWrite> },
    ReservationFailed(ErrorInfo),
    FavoriteFailed { write: FavoriteWrite, error: ErrorInfo },
}

/// Everything that can happen to the card.
#[derive(Debug, Clone, PartialEq)]
pub enum CardChange {
    /// Host stored a new card config.
    ConfigChanged(CardConfig),
    /// Account listing finished.
    AccountsLoaded(Vec<AccountEntry>),
    /// A watched entity changed; `state` is `None` when it disappeared.
    EntityChanged {
        entity_id: String,
        state: Option<EntityState>,
    },
    /// External slug lookup finished for `account_id`.
    IdentityLookupFinished {
        account_id: String,
        result: Result<String, ErrorInfo>,
    },
    /// Reservation submission (and optional favorite follow-up) finished.
    SubmitFinished(SubmitOutcome),
    /// Favorite deletion finished.
    DeleteFinished { result: Result<(), ErrorInfo> },
    /// Periodic host refresh; retries cooled-down resolution.
    Refresh,
    User(UserIntent),
}

/// Side effects the runtime must execute after a reconcile step, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run the external slug lookup for this account.
    ResolveIdentity { account_id: String },
    /// Read the favorites sensor and feed its state back.
    ReadFavorites { entity_id: String },
    /// Create the reservation, then run the favorite follow-up if present.
    Submit {
        reservation: ServiceRequest,
        follow_up: Option<ServiceRequest>,
    },
    /// Delete a favorite.
    DeleteFavorite { request: ServiceRequest },
    /// Persist an updated card config back to the host.
    SaveConfig(CardConfig),
    /// Show a user-facing notice.
    Notify(Notice),
}

/// Result of one reconcile step.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub state: CardState,
    pub effects: Vec<Effect>,
}

pub fn reconcile(current: &CardState, change: &CardChange, now: DateTime<Utc>) -> Reconciled {
    let mut state = current.clone();
    let mut effects = Vec::new();

    match change {
        CardChange::ConfigChanged(config) => apply_config(&mut state, config, &mut effects, now),
        CardChange::AccountsLoaded(accounts) => {
            apply_accounts(&mut state, accounts, &mut effects, now)
        }
        CardChange::EntityChanged { entity_id, state: entity } => {
            apply_entity(&mut state, entity_id, entity.as_ref())
        }
        CardChange::IdentityLookupFinished { account_id, result } => {
            apply_lookup(&mut state, account_id, result, &mut effects)
        }
        CardChange::SubmitFinished(outcome) => apply_submit_outcome(&mut state, outcome, &mut effects),
        CardChange::DeleteFinished { result } => {
            apply_delete_outcome(&mut state, result, &mut effects)
        }
        CardChange::Refresh => settle(&mut state, &mut effects, now),
        CardChange::User(intent) => apply_intent(&mut state, intent, &mut effects, now),
    }

    Reconciled { state, effects }
}

/// Derives the favorite action buttons from the current draft.
pub fn action_flags(state: &CardState) -> ActionFlags {
    let draft = &state.draft;
    let name_filled = !comparable_name(&draft.name).is_empty();
    let plate_filled = !comparable_plate(&draft.license_plate).is_empty();
    let both_filled = name_filled && plate_filled;

    let exact_match = matching_index(&state.favorites, &draft.name, &draft.license_plate);

    let selected = state.selected_favorite();
    let has_selection = selected.is_some();
    let (selection_changed, changed_both) = match selected {
        Some(favorite) => {
            let name_changed = comparable_name(&draft.name) != comparable_name(&favorite.name);
            let plate_changed =
                comparable_plate(&draft.license_plate) != comparable_plate(&favorite.license_plate);
            (name_changed || plate_changed, name_changed && plate_changed)
        }
        None => (false, false),
    };

    let duplicate_of_other = match draft.selected_favorite {
        Some(index) if index < state.favorites.len() => {
            is_duplicate_of_other(&state.favorites, index, &draft.name, &draft.license_plate)
        }
        _ => false,
    };
    let selected_id = selected.and_then(|favorite| favorite.id.as_deref());

    let show_add = both_filled && exact_match.is_none() && (!has_selection || changed_both);
    let show_update = has_selection && selection_changed && !changed_both;
    // Delete binds to the selection and is offered exactly when neither add
    // nor update applies to it.
    let show_delete = has_selection && !show_update && !show_add;

    ActionFlags {
        show_add,
        add_enabled: show_add && !state.submitting,
        show_update,
        update_enabled: show_update
            && both_filled
            && !duplicate_of_other
            && selected_id.is_some()
            && !state.submitting,
        show_delete,
        delete_enabled: show_delete && selected_id.is_some() && !state.deleting,
    }
}

fn apply_config(
    state: &mut CardState,
    config: &CardConfig,
    effects: &mut Vec<Effect>,
    now: DateTime<Utc>,
) {
    // The runtime rejects invalid configs at the boundary; ignore them here
    // too so the pure layer is safe to drive directly.
    if config.validate().is_err() || state.config == *config {
        return;
    }
    state.config = config.clone();

    let accounts = state.accounts.clone().unwrap_or_default();
    let next = select_after_load(&state.config, &accounts, state.active_account.as_deref());
    set_active(state, next, effects);
    settle(state, effects, now);
}

fn apply_accounts(
    state: &mut CardState,
    accounts: &[AccountEntry],
    effects: &mut Vec<Effect>,
    now: DateTime<Utc>,
) {
    let next = select_after_load(&state.config, accounts, state.active_account.as_deref());
    state.accounts = Some(accounts.to_vec());
    set_active(state, next, effects);

    if accounts.is_empty() && state.config.favorites_entity.is_none() {
        effects.push(Effect::Notify(Notice::warning(
            "no_accounts",
            "No visitor parking accounts are configured",
        )));
    }

    settle(state, effects, now);
}

fn apply_entity(state: &mut CardState, entity_id: &str, entity: Option<&EntityState>) {
    if state.favorites_entity.as_deref() != Some(entity_id) {
        return;
    }
    state.favorites = entity.map(favorites_from_state).unwrap_or_default();
    clamp_selection(state);
}

fn apply_lookup(
    state: &mut CardState,
    account_id: &str,
    result: &Result<String, ErrorInfo>,
    effects: &mut Vec<Effect>,
) {
    let slug = result.as_ref().ok().cloned();
    if !state.identity.complete(account_id, slug) {
        // Stale: the account changed while the lookup was in flight.
        return;
    }
    align_source(state, effects);
}

fn apply_submit_outcome(state: &mut CardState, outcome: &SubmitOutcome, effects: &mut Vec<Effect>) {
    state.submitting = false;
    match outcome {
        SubmitOutcome::Completed { favorite } => {
            effects.push(Effect::Notify(Notice::info(
                "reservation_created",
                "Reservation created",
            )));
            match favorite {
                Some(FavoriteWrite::Create) => effects.push(Effect::Notify(Notice::info(
                    "favorite_saved",
                    "Favorite saved",
                ))),
                Some(FavoriteWrite::Update) => effects.push(Effect::Notify(Notice::info(
                    "favorite_updated",
                    "Favorite updated",
                ))),
                None => {}
            }
            state.draft = Draft::default();
        }
        SubmitOutcome::ReservationFailed(error) => {
            effects.push(Effect::Notify(Notice::error(
                "reservation_failed",
                format!("Could not create reservation: {}", error.message),
            )));
        }
        SubmitOutcome::FavoriteFailed { write, error } => {
            effects.push(Effect::Notify(Notice::info(
                "reservation_created",
                "Reservation created",
            )));
            let (code, verb) = match write {
                FavoriteWrite::Create => ("favorite_save_failed", "save"),
                FavoriteWrite::Update => ("favorite_update_failed", "update"),
            };
            effects.push(Effect::Notify(Notice::error(
                code,
                format!(
                    "Reservation created, but could not {} the favorite: {}",
                    verb, error.message
                ),
            )));
        }
    }
}

fn apply_delete_outcome(
    state: &mut CardState,
    result: &Result<(), ErrorInfo>,
    effects: &mut Vec<Effect>,
) {
    state.deleting = false;
    match result {
        Ok(()) => {
            effects.push(Effect::Notify(Notice::info(
                "favorite_deleted",
                "Favorite deleted",
            )));
            state.draft.selected_favorite = None;
        }
        Err(error) => {
            effects.push(Effect::Notify(Notice::error(
                "favorite_delete_failed",
                format!("Could not delete favorite: {}", error.message),
            )));
        }
    }
}

fn apply_intent(
    state: &mut CardState,
    intent: &UserIntent,
    effects: &mut Vec<Effect>,
    now: DateTime<Utc>,
) {
    match intent {
        UserIntent::SelectAccount(requested) => {
            let accounts = state.accounts.clone().unwrap_or_default();
            let next = select_manual(
                &state.config,
                &accounts,
                state.active_account.as_deref(),
                requested.as_deref(),
            );
            set_active(state, next, effects);
            settle(state, effects, now);
        }
        UserIntent::SelectFavorite(index) => apply_favorite_pick(state, *index),
        UserIntent::EditName(value) => {
            state.draft.name = value.clone();
            drop_selection_if_fully_changed(state);
        }
        UserIntent::EditPlate(value) => {
            state.draft.license_plate = value.clone();
            drop_selection_if_fully_changed(state);
        }
        UserIntent::SetRemember(value) => state.draft.remember = *value,
        UserIntent::Submit => apply_submit(state, effects),
        UserIntent::DeleteFavorite => apply_delete(state, effects),
    }
}

fn apply_favorite_pick(state: &mut CardState, index: Option<usize>) {
    match index {
        Some(index) if index < state.favorites.len() => {
            let favorite = &state.favorites[index];
            state.draft.name = favorite.name.clone();
            state.draft.license_plate = comparable_plate(&favorite.license_plate);
            state.draft.selected_favorite = Some(index);
        }
        // Out-of-range picks behave exactly like clearing the selection.
        _ => state.draft.selected_favorite = None,
    }
}

/// An edit that moves BOTH fields away from the selected favorite turns the
/// draft into a new entry; the selection is dropped.
fn drop_selection_if_fully_changed(state: &mut CardState) {
    let changed_both = match state.selected_favorite() {
        Some(favorite) => {
            comparable_name(&state.draft.name) != comparable_name(&favorite.name)
                && comparable_plate(&state.draft.license_plate)
                    != comparable_plate(&favorite.license_plate)
        }
        None => false,
    };
    if changed_both {
        state.draft.selected_favorite = None;
    }
}

fn apply_submit(state: &mut CardState, effects: &mut Vec<Effect>) {
    if !state.can_submit() {
        return;
    }
    let license_plate = submission_plate(&state.draft.license_plate);
    let name = submission_name(&state.draft.name);
    let account_id = state.active_account.clone();

    let follow_up = if state.draft.remember {
        favorite_write(state, name.clone(), &license_plate, account_id.clone())
    } else {
        None
    };
    let reservation = ServiceRequest::CreateReservation {
        license_plate,
        name,
        account_id,
    };

    state.submitting = true;
    effects.push(Effect::Submit {
        reservation,
        follow_up,
    });
}

/// Favorite request carried along with a submission, when the remember
/// toggle is on and the flags offer a usable write.
fn favorite_write(
    state: &CardState,
    name: Option<String>,
    license_plate: &str,
    account_id: Option<String>,
) -> Option<ServiceRequest> {
    // Favorites require a name; reservations do not.
    let name = name?;
    let flags = action_flags(state);
    if flags.show_add && flags.add_enabled {
        return Some(ServiceRequest::CreateFavorite {
            name,
            license_plate: license_plate.to_string(),
            account_id,
        });
    }
    if flags.show_update && flags.update_enabled {
        let favorite_id = state
            .selected_favorite()
            .and_then(|favorite| favorite.id.clone())?;
        return Some(ServiceRequest::UpdateFavorite {
            favorite_id,
            name,
            license_plate: license_plate.to_string(),
            account_id,
        });
    }
    None
}

fn apply_delete(state: &mut CardState, effects: &mut Vec<Effect>) {
    if state.deleting {
        return;
    }
    let flags = action_flags(state);
    if !flags.delete_enabled {
        return;
    }
    let Some(favorite_id) = state
        .selected_favorite()
        .and_then(|favorite| favorite.id.clone())
    else {
        return;
    };

    state.deleting = true;
    effects.push(Effect::DeleteFavorite {
        request: ServiceRequest::DeleteFavorite {
            favorite_id,
            account_id: state.active_account.clone(),
        },
    });
}

/// Applies a new active account, resetting everything scoped to the old one.
/// A favorites sensor the engine derived for the outgoing account is
/// resolution state, not a host override: it is unpersisted here so it can
/// never be read against the incoming account.
fn set_active(state: &mut CardState, next: Option<String>, effects: &mut Vec<Effect>) {
    if state.active_account == next {
        return;
    }
    let derived = state.identity.slug().map(favorites_entity_for_slug);
    if derived.is_some() && state.config.favorites_entity == derived {
        state.config.favorites_entity = None;
        effects.push(Effect::SaveConfig(state.config.clone()));
    }
    state.active_account = next;
    state.identity.reset();
    state.draft = Draft::default();
    state.favorites.clear();
    state.favorites_entity = None;
}

/// Kicks off resolution when needed and realigns the favorites source.
fn settle(state: &mut CardState, effects: &mut Vec<Effect>, now: DateTime<Utc>) {
    maybe_resolve(state, effects, now);
    align_source(state, effects);
}

/// Starts slug resolution when it is both needed and allowed. An identifier
/// declared on the loaded account resolves locally without the external
/// lookup; everything else goes through [`Effect::ResolveIdentity`].
fn maybe_resolve(state: &mut CardState, effects: &mut Vec<Effect>, now: DateTime<Utc>) {
    if state.config.favorites_entity.is_some() {
        // An explicit favorites sensor suppresses resolution entirely.
        return;
    }
    let Some(account_id) = state.active_account.clone() else {
        return;
    };
    if !state.identity.can_attempt(now) {
        return;
    }

    let declared = state
        .accounts
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|account| account.account_id == account_id)
        .and_then(declared_slug);
    if let Some(slug) = declared {
        state.identity.mark_resolved(&account_id, slug, now);
        return;
    }

    state.identity.begin(&account_id, now);
    effects.push(Effect::ResolveIdentity { account_id });
}

/// Brings `favorites_entity` in line with the config override or the resolved
/// slug, reading the sensor when the source changes. A freshly derived sensor
/// is written back into the config so the next load skips resolution.
fn align_source(state: &mut CardState, effects: &mut Vec<Effect>) {
    let target = match &state.config.favorites_entity {
        Some(entity_id) => Some(entity_id.clone()),
        None => match state.identity.slug() {
            Some(slug) => {
                let entity_id = favorites_entity_for_slug(slug);
                state.config = state.config.with_favorites_entity(&entity_id);
                effects.push(Effect::SaveConfig(state.config.clone()));
                Some(entity_id)
            }
            None => None,
        },
    };

    if state.favorites_entity != target {
        state.favorites_entity = target.clone();
        state.favorites.clear();
        state.draft.selected_favorite = None;
        if let Some(entity_id) = target {
            effects.push(Effect::ReadFavorites { entity_id });
        }
    }
}

fn clamp_selection(state: &mut CardState) {
    if let Some(index) = state.draft.selected_favorite {
        if index >= state.favorites.len() {
            state.draft.selected_favorite = None;
        }
    }
}
