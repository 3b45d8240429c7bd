//! Host boundary types for the Curbside visitor parking card.
//!
//! This crate is shared by the card engine and its host adapters to prevent
//! schema drift. The engine remains the authority on decisions, but adapters
//! reuse the same types to decode entity state and shape service calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Integration domain that owns the services and favorites sensors.
pub const INTEGRATION_DOMAIN: &str = "visitor_parking";

pub const SERVICE_CREATE_RESERVATION: &str = "create_reservation";
pub const SERVICE_CREATE_FAVORITE: &str = "create_favorite";
pub const SERVICE_UPDATE_FAVORITE: &str = "update_favorite";
pub const SERVICE_DELETE_FAVORITE: &str = "delete_favorite";

/// Favorites sensors follow `sensor.visitor_parking_<slug>_favorites`.
pub const FAVORITES_ENTITY_PREFIX: &str = "sensor.visitor_parking_";
pub const FAVORITES_ENTITY_SUFFIX: &str = "_favorites";

/// Attribute key carrying the favorites list on a favorites sensor.
pub const ATTR_FAVORITES: &str = "favorites";

pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_UNKNOWN: &str = "unknown";

/// Code + message pair used for host call failures and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// One backend account as reported by the host's account listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_id: String,
    pub title: String,
    /// Identifier declared by the backend, when the account exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// Entity registry row, reduced to what slug recovery needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub entity_id: String,
    pub account_id: String,
}

/// Snapshot of one entity as read from the host state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Value,
}

impl EntityState {
    /// `unknown` and `unavailable` both mean the sensor carries no data.
    pub fn is_missing_data(&self) -> bool {
        self.state == STATE_UNAVAILABLE || self.state == STATE_UNKNOWN
    }
}

/// One saved visitor as exposed by a favorites sensor.
///
/// `id` is assigned by the backend and can lag behind newly created entries,
/// so it stays optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub license_plate: String,
}

/// Backend identifiers arrive as strings or integers depending on firmware.
/// Coerces to a trimmed string; blank or non-scalar values count as absent.
pub fn normalize_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Extracts the favorites list from a sensor snapshot.
///
/// Unknown/unavailable states, a missing or non-list attribute, and malformed
/// entries all degrade to fewer favorites; malformed data is never an error.
pub fn favorites_from_state(state: &EntityState) -> Vec<Favorite> {
    if state.is_missing_data() {
        return Vec::new();
    }
    let Some(raw) = state.attributes.get(ATTR_FAVORITES).and_then(Value::as_array) else {
        return Vec::new();
    };
    raw.iter().filter_map(favorite_from_value).collect()
}

fn favorite_from_value(value: &Value) -> Option<Favorite> {
    let entry = value.as_object()?;
    let name = entry.get("name").and_then(Value::as_str)?.trim();
    let license_plate = entry.get("license_plate").and_then(Value::as_str)?.trim();
    if name.is_empty() || license_plate.is_empty() {
        return None;
    }
    Some(Favorite {
        id: entry.get("id").and_then(normalize_identifier),
        name: name.to_string(),
        license_plate: license_plate.to_string(),
    })
}

/// Entity id of the favorites sensor belonging to an account slug.
pub fn favorites_entity_for_slug(slug: &str) -> String {
    format!(
        "{}{}{}",
        FAVORITES_ENTITY_PREFIX, slug, FAVORITES_ENTITY_SUFFIX
    )
}

/// Inverse of [`favorites_entity_for_slug`]; `None` when the entity id does
/// not follow the naming convention.
pub fn slug_from_favorites_entity(entity_id: &str) -> Option<&str> {
    entity_id
        .strip_prefix(FAVORITES_ENTITY_PREFIX)?
        .strip_suffix(FAVORITES_ENTITY_SUFFIX)
        .filter(|slug| !slug.is_empty())
}

/// Normalizes a plate for submission: surrounding whitespace dropped, upper-cased.
/// Separators are kept; the backend stores plates as entered.
pub fn submission_plate(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Optional visitor name for submission; blank collapses to absent.
pub fn submission_name(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A mutation forwarded to the integration, already payload-shaped.
///
/// `account_id` becomes `config_entry_id` on the wire so multi-account
/// installs can route the call; single-account installs may omit it.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceRequest {
    CreateReservation {
        license_plate: String,
        name: Option<String>,
        account_id: Option<String>,
    },
    CreateFavorite {
        name: String,
        license_plate: String,
        account_id: Option<String>,
    },
    UpdateFavorite {
        favorite_id: String,
        name: String,
        license_plate: String,
        account_id: Option<String>,
    },
    DeleteFavorite {
        favorite_id: String,
        account_id: Option<String>,
    },
}

impl ServiceRequest {
    pub fn service(&self) -> &'static str {
        match self {
            Self::CreateReservation { .. } => SERVICE_CREATE_RESERVATION,
            Self::CreateFavorite { .. } => SERVICE_CREATE_FAVORITE,
            Self::UpdateFavorite { .. } => SERVICE_UPDATE_FAVORITE,
            Self::DeleteFavorite { .. } => SERVICE_DELETE_FAVORITE,
        }
    }

    /// Service call data with the integration's wire keys.
    pub fn payload(&self) -> Value {
        let mut data = Map::new();
        match self {
            Self::CreateReservation {
                license_plate,
                name,
                account_id,
            } => {
                insert_str(&mut data, "license_plate", license_plate);
                if let Some(name) = name {
                    insert_str(&mut data, "name", name);
                }
                insert_account(&mut data, account_id);
            }
            Self::CreateFavorite {
                name,
                license_plate,
                account_id,
            } => {
                insert_str(&mut data, "name", name);
                insert_str(&mut data, "license_plate", license_plate);
                insert_account(&mut data, account_id);
            }
            Self::UpdateFavorite {
                favorite_id,
                name,
                license_plate,
                account_id,
            } => {
                insert_str(&mut data, "favorite_id", favorite_id);
                insert_str(&mut data, "name", name);
                insert_str(&mut data, "license_plate", license_plate);
                insert_account(&mut data, account_id);
            }
            Self::DeleteFavorite {
                favorite_id,
                account_id,
            } => {
                insert_str(&mut data, "favorite_id", favorite_id);
                insert_account(&mut data, account_id);
            }
        }
        Value::Object(data)
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        match self {
            Self::CreateReservation { license_plate, .. } => {
                require_non_blank(license_plate, "invalid_license_plate", "license_plate")
            }
            Self::CreateFavorite {
                name,
                license_plate,
                ..
            } => {
                require_non_blank(name, "invalid_name", "name")?;
                require_non_blank(license_plate, "invalid_license_plate", "license_plate")
            }
            Self::UpdateFavorite {
                favorite_id,
                name,
                license_plate,
                ..
            } => {
                require_non_blank(favorite_id, "invalid_favorite_id", "favorite_id")?;
                require_non_blank(name, "invalid_name", "name")?;
                require_non_blank(license_plate, "invalid_license_plate", "license_plate")
            }
            Self::DeleteFavorite { favorite_id, .. } => {
                require_non_blank(favorite_id, "invalid_favorite_id", "favorite_id")
            }
        }
    }
}

fn insert_str(data: &mut Map<String, Value>, key: &str, value: &str) {
    data.insert(key.to_string(), Value::String(value.to_string()));
}

fn insert_account(data: &mut Map<String, Value>, account_id: &Option<String>) {
    if let Some(account_id) = account_id {
        data.insert(
            "config_entry_id".to_string(),
            Value::String(account_id.clone()),
        );
    }
}

fn require_non_blank(value: &str, code: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(code, format!("{} is required", field)));
    }
    Ok(())
}

/// Dashboard card configuration as stored by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardConfig {
    /// Pins the card to one account; wins over any runtime selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Explicit favorites sensor; suppresses slug resolution entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorites_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl CardConfig {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if let Some(account_id) = &self.account_id {
            if account_id.trim().is_empty() {
                return Err(ErrorInfo::new(
                    "invalid_account_id",
                    "account_id must not be blank",
                ));
            }
        }
        if let Some(entity_id) = &self.favorites_entity {
            if !entity_id.contains('.') {
                return Err(ErrorInfo::new(
                    "invalid_favorites_entity",
                    "favorites_entity must be a full entity id",
                ));
            }
        }
        Ok(())
    }

    /// Copy of this config with the favorites sensor filled in, used when the
    /// engine persists a freshly resolved entity back to the host.
    pub fn with_favorites_entity(&self, entity_id: &str) -> Self {
        let mut updated = self.clone();
        updated.favorites_entity = Some(entity_id.to_string());
        updated
    }
}

/// Severity of a card notice rendered by the host shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

/// User-facing outcome message emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub code: String,
    pub message: String,
}

impl Notice {
    pub fn info(code: &str, message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Info, code, message)
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Warning, code, message)
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Error, code, message)
    }

    fn new(kind: NoticeKind, code: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor_state(state: &str, attributes: Value) -> EntityState {
        EntityState {
            entity_id: "sensor.visitor_parking_home_favorites".to_string(),
            state: state.to_string(),
            attributes,
        }
    }

    #[test]
    fn unavailable_state_yields_no_favorites() {
        let state = sensor_state(
            STATE_UNAVAILABLE,
            json!({ "favorites": [{ "id": 1, "name": "Mom", "license_plate": "AB12CD" }] }),
        );
        assert!(favorites_from_state(&state).is_empty());
    }

    #[test]
    fn unknown_state_yields_no_favorites() {
        let state = sensor_state(STATE_UNKNOWN, json!({ "favorites": [] }));
        assert!(favorites_from_state(&state).is_empty());
    }

    #[test]
    fn malformed_entries_are_dropped() {
        let state = sensor_state(
            "2",
            json!({
                "favorites": [
                    "not-an-object",
                    { "name": "No Plate" },
                    { "name": "   ", "license_plate": "AA11BB" },
                    { "name": "Mom", "license_plate": "AB12CD" },
                ]
            }),
        );
        let favorites = favorites_from_state(&state);
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].name, "Mom");
    }

    #[test]
    fn non_list_favorites_attribute_yields_empty() {
        let state = sensor_state("1", json!({ "favorites": "oops" }));
        assert!(favorites_from_state(&state).is_empty());
    }

    #[test]
    fn integer_ids_are_coerced_to_strings() {
        let state = sensor_state(
            "1",
            json!({ "favorites": [{ "id": 17, "name": "Mom", "license_plate": "AB12CD" }] }),
        );
        let favorites = favorites_from_state(&state);
        assert_eq!(favorites[0].id.as_deref(), Some("17"));
    }

    #[test]
    fn blank_identifier_counts_as_absent() {
        assert_eq!(normalize_identifier(&json!("   ")), None);
        assert_eq!(normalize_identifier(&json!(null)), None);
        assert_eq!(normalize_identifier(&json!(2.5)), None);
        assert_eq!(normalize_identifier(&json!(" abc ")), Some("abc".to_string()));
    }

    #[test]
    fn reservation_payload_uses_wire_keys() {
        let request = ServiceRequest::CreateReservation {
            license_plate: "AB12CD".to_string(),
            name: Some("Mom".to_string()),
            account_id: Some("entry_a".to_string()),
        };
        assert_eq!(request.service(), SERVICE_CREATE_RESERVATION);
        assert_eq!(
            request.payload(),
            json!({ "license_plate": "AB12CD", "name": "Mom", "config_entry_id": "entry_a" })
        );
    }

    #[test]
    fn reservation_payload_omits_absent_name_and_account() {
        let request = ServiceRequest::CreateReservation {
            license_plate: "AB12CD".to_string(),
            name: None,
            account_id: None,
        };
        assert_eq!(request.payload(), json!({ "license_plate": "AB12CD" }));
    }

    #[test]
    fn update_favorite_requires_favorite_id() {
        let request = ServiceRequest::UpdateFavorite {
            favorite_id: "  ".to_string(),
            name: "Mom".to_string(),
            license_plate: "AB12CD".to_string(),
            account_id: None,
        };
        let err = request.validate().unwrap_err();
        assert_eq!(err.code, "invalid_favorite_id");
    }

    #[test]
    fn create_favorite_requires_name_and_plate() {
        let request = ServiceRequest::CreateFavorite {
            name: "".to_string(),
            license_plate: "AB12CD".to_string(),
            account_id: None,
        };
        assert_eq!(request.validate().unwrap_err().code, "invalid_name");

        let request = ServiceRequest::CreateFavorite {
            name: "Mom".to_string(),
            license_plate: " ".to_string(),
            account_id: None,
        };
        assert_eq!(
            request.validate().unwrap_err().code,
            "invalid_license_plate"
        );
    }

    #[test]
    fn submission_plate_trims_and_uppercases() {
        assert_eq!(submission_plate("  ab-12-cd "), "AB-12-CD");
    }

    #[test]
    fn submission_name_collapses_blank_to_absent() {
        assert_eq!(submission_name("   "), None);
        assert_eq!(submission_name(" Mom "), Some("Mom".to_string()));
    }

    #[test]
    fn favorites_entity_naming_round_trips() {
        let entity_id = favorites_entity_for_slug("main_street_12");
        assert_eq!(entity_id, "sensor.visitor_parking_main_street_12_favorites");
        assert_eq!(
            slug_from_favorites_entity(&entity_id),
            Some("main_street_12")
        );
        assert_eq!(slug_from_favorites_entity("sensor.other"), None);
        assert_eq!(
            slug_from_favorites_entity("sensor.visitor_parking__favorites"),
            None
        );
    }

    #[test]
    fn config_rejects_bare_entity_name() {
        let config = CardConfig {
            favorites_entity: Some("favorites".to_string()),
            ..CardConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err().code,
            "invalid_favorites_entity"
        );
    }

    #[test]
    fn config_accepts_minimal_shape() {
        assert!(CardConfig::default().validate().is_ok());
        let config = CardConfig {
            account_id: Some("entry_a".to_string()),
            favorites_entity: Some("sensor.visitor_parking_home_favorites".to_string()),
            title: Some("Guests".to_string()),
        };
        assert!(config.validate().is_ok());
    }
}
