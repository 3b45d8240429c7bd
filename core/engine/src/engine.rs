//! Synchronous runtime around the pure reconciler.
//!
//! One engine instance serves one card. It owns the state, executes effects
//! serially in the order the reconciler emitted them, and feeds their results
//! back in as further changes until no work remains. All calls happen on the
//! caller's thread; hosts that dispatch from multiple threads must serialize
//! access themselves.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::{debug, warn};

use curbside_protocol::{CardConfig, ErrorInfo, Notice, ServiceRequest, INTEGRATION_DOMAIN};

use crate::error::EngineError;
use crate::host::CardHost;
use crate::identity::derive_slug;
use crate::reconcile::{
    action_flags, reconcile, ActionFlags, CardChange, CardState, Effect, FavoriteWrite,
    SubmitOutcome, UserIntent,
};

/// What the shell consumes after driving one change through the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub notices: Vec<Notice>,
    /// Set when the engine wants the host to persist a new card config.
    pub config_to_save: Option<CardConfig>,
}

pub struct CardEngine<H: CardHost> {
    host: H,
    state: CardState,
}

impl<H: CardHost> CardEngine<H> {
    /// An unusable config is rejected up front; everything after construction
    /// degrades instead of failing.
    pub fn new(host: H, config: CardConfig) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        Ok(Self {
            host,
            state: CardState::new(config),
        })
    }

    pub fn state(&self) -> &CardState {
        &self.state
    }

    pub fn flags(&self) -> ActionFlags {
        action_flags(&self.state)
    }

    /// Loads the account listing and settles the initial state. The listing
    /// is the one host call the card cannot start without.
    pub fn bootstrap(&mut self) -> Result<Update, EngineError> {
        let accounts = self.host.list_accounts()?;
        Ok(self.apply(CardChange::AccountsLoaded(accounts)))
    }

    /// Replaces the card config, validating it first.
    pub fn set_config(&mut self, config: CardConfig) -> Result<Update, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        Ok(self.apply(CardChange::ConfigChanged(config)))
    }

    pub fn user(&mut self, intent: UserIntent) -> Update {
        self.apply(CardChange::User(intent))
    }

    /// Periodic nudge from the host; retries cooled-down resolution.
    pub fn refresh(&mut self) -> Update {
        self.apply(CardChange::Refresh)
    }

    /// Drives one change through reconciliation, running every produced
    /// effect and feeding results back until the state is quiet.
    pub fn apply(&mut self, change: CardChange) -> Update {
        let mut update = Update::default();
        let mut queue = VecDeque::from([change]);

        while let Some(change) = queue.pop_front() {
            let reconciled = reconcile(&self.state, &change, Utc::now());
            self.state = reconciled.state;
            for effect in reconciled.effects {
                self.run_effect(effect, &mut update, &mut queue);
            }
        }

        update
    }

    fn run_effect(&self, effect: Effect, update: &mut Update, queue: &mut VecDeque<CardChange>) {
        match effect {
            Effect::ResolveIdentity { account_id } => {
                let result = self.resolve_identity(&account_id);
                queue.push_back(CardChange::IdentityLookupFinished { account_id, result });
            }
            Effect::ReadFavorites { entity_id } => {
                let state = match self.host.read_state(&entity_id) {
                    Ok(state) => state,
                    Err(err) => {
                        warn!(error = %err, entity_id = %entity_id, "Favorites read failed");
                        None
                    }
                };
                queue.push_back(CardChange::EntityChanged { entity_id, state });
            }
            Effect::Submit {
                reservation,
                follow_up,
            } => {
                let outcome = self.run_submit(reservation, follow_up);
                queue.push_back(CardChange::SubmitFinished(outcome));
            }
            Effect::DeleteFavorite { request } => {
                let result = self.call(&request);
                queue.push_back(CardChange::DeleteFinished { result });
            }
            Effect::SaveConfig(config) => update.config_to_save = Some(config),
            Effect::Notify(notice) => update.notices.push(notice),
        }
    }

    fn resolve_identity(&self, account_id: &str) -> Result<String, ErrorInfo> {
        let accounts = self.host.list_accounts()?;
        let registry = self.host.entity_registry()?;
        match derive_slug(account_id, &accounts, &registry) {
            Some(slug) => {
                debug!(account_id = %account_id, slug = %slug, "Resolved account slug");
                Ok(slug)
            }
            None => Err(ErrorInfo::new(
                "unresolved_account",
                "no identifier source produced a slug",
            )),
        }
    }

    /// Reservation first; the favorite follow-up only runs once it landed.
    fn run_submit(
        &self,
        reservation: ServiceRequest,
        follow_up: Option<ServiceRequest>,
    ) -> SubmitOutcome {
        if let Err(error) = self.call(&reservation) {
            return SubmitOutcome::ReservationFailed(error);
        }
        let Some(follow_up) = follow_up else {
            return SubmitOutcome::Completed { favorite: None };
        };
        let write = match follow_up {
            ServiceRequest::UpdateFavorite { .. } => FavoriteWrite::Update,
            _ => FavoriteWrite::Create,
        };
        match self.call(&follow_up) {
            Ok(()) => SubmitOutcome::Completed {
                favorite: Some(write),
            },
            Err(error) => SubmitOutcome::FavoriteFailed { write, error },
        }
    }

    fn call(&self, request: &ServiceRequest) -> Result<(), ErrorInfo> {
        request.validate()?;
        debug!(
            domain = INTEGRATION_DOMAIN,
            service = request.service(),
            "Calling integration service"
        );
        self.host.call_service(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curbside_protocol::{AccountEntry, EntityState, RegistryEntry};
    use serde_json::json;
    use std::sync::Mutex;

    /// Minimal scripted host; the full flow suite lives in `tests/`.
    #[derive(Default)]
    struct FakeHost {
        accounts: Vec<AccountEntry>,
        registry: Vec<RegistryEntry>,
        states: Vec<EntityState>,
        calls: Mutex<Vec<&'static str>>,
        fail_services: bool,
    }

    impl CardHost for FakeHost {
        fn call_service(&self, request: &ServiceRequest) -> Result<(), ErrorInfo> {
            self.calls.lock().expect("lock calls").push(request.service());
            if self.fail_services {
                return Err(ErrorInfo::new("backend_rejected", "scripted failure"));
            }
            Ok(())
        }

        fn list_accounts(&self) -> Result<Vec<AccountEntry>, ErrorInfo> {
            Ok(self.accounts.clone())
        }

        fn entity_registry(&self) -> Result<Vec<RegistryEntry>, ErrorInfo> {
            Ok(self.registry.clone())
        }

        fn read_state(&self, entity_id: &str) -> Result<Option<EntityState>, ErrorInfo> {
            Ok(self
                .states
                .iter()
                .find(|state| state.entity_id == entity_id)
                .cloned())
        }
    }

    fn account(account_id: &str, identifier: Option<&str>) -> AccountEntry {
        AccountEntry {
            account_id: account_id.to_string(),
            title: "Home".to_string(),
            identifier: identifier.map(str::to_string),
        }
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = CardConfig {
            favorites_entity: Some("no-dot".to_string()),
            ..CardConfig::default()
        };
        let result = CardEngine::new(FakeHost::default(), config);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn bootstrap_resolves_and_loads_favorites_in_one_pass() {
        let host = FakeHost {
            accounts: vec![account("entry_a", Some("00012345"))],
            states: vec![EntityState {
                entity_id: "sensor.visitor_parking_00012345_favorites".to_string(),
                state: "1".to_string(),
                attributes: json!({
                    "favorites": [{ "id": 1, "name": "Mom", "license_plate": "AB-12-CD" }]
                }),
            }],
            ..FakeHost::default()
        };
        let mut engine = CardEngine::new(host, CardConfig::default()).expect("valid config");

        let update = engine.bootstrap().expect("bootstrap");
        assert_eq!(engine.state().favorites.len(), 1);
        assert_eq!(
            update
                .config_to_save
                .as_ref()
                .and_then(|config| config.favorites_entity.as_deref()),
            Some("sensor.visitor_parking_00012345_favorites")
        );
    }

    #[test]
    fn submission_feeds_outcome_back_into_state() {
        let host = FakeHost {
            accounts: vec![account("entry_a", Some("00012345"))],
            ..FakeHost::default()
        };
        let mut engine = CardEngine::new(host, CardConfig::default()).expect("valid config");
        engine.bootstrap().expect("bootstrap");

        engine.user(UserIntent::EditPlate("ab-12-cd".to_string()));
        let update = engine.user(UserIntent::Submit);

        assert!(!engine.state().submitting);
        assert_eq!(update.notices.len(), 1);
        assert_eq!(update.notices[0].code, "reservation_created");
        assert_eq!(engine.state().draft.license_plate, "");
    }

    #[test]
    fn failed_service_call_surfaces_as_error_notice() {
        let host = FakeHost {
            accounts: vec![account("entry_a", Some("00012345"))],
            fail_services: true,
            ..FakeHost::default()
        };
        let mut engine = CardEngine::new(host, CardConfig::default()).expect("valid config");
        engine.bootstrap().expect("bootstrap");

        engine.user(UserIntent::EditPlate("ab-12-cd".to_string()));
        let update = engine.user(UserIntent::Submit);

        assert_eq!(update.notices.len(), 1);
        assert_eq!(update.notices[0].code, "reservation_failed");
        assert_eq!(engine.state().draft.license_plate, "ab-12-cd");
    }
}
