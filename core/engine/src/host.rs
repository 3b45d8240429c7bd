//! The narrow seam between the engine and whatever hosts it.
//!
//! Four calls cover everything the card consumes; hosts implement this
//! against their frontend bridge, tests implement it with scripted data.

use curbside_protocol::{AccountEntry, EntityState, ErrorInfo, RegistryEntry, ServiceRequest};

pub trait CardHost: Send + Sync {
    /// Invokes one integration service. The request carries the service name
    /// and the payload shape; the host adds transport.
    fn call_service(&self, request: &ServiceRequest) -> Result<(), ErrorInfo>;

    /// Lists the integration's accounts.
    fn list_accounts(&self) -> Result<Vec<AccountEntry>, ErrorInfo>;

    /// Lists registry entries owned by the integration.
    fn entity_registry(&self) -> Result<Vec<RegistryEntry>, ErrorInfo>;

    /// Reads one entity, `None` when it does not exist.
    fn read_state(&self, entity_id: &str) -> Result<Option<EntityState>, ErrorInfo>;
}
