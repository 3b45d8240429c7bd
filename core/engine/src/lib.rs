//! # curbside-engine
//!
//! Decision engine for the Curbside visitor parking card: everything the card
//! decides lives here, everything it renders stays in the host shell.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Hosts wrap with async if needed.
//! - **Not thread-safe**: One engine per card, driven from one logical thread.
//! - **Pure core**: [`reconcile::reconcile`] maps (state, change, now) to
//!   (state, effects) with no host calls and no ambient clock; the runtime in
//!   [`engine`] executes effects and feeds results back.
//! - **Graceful degradation**: Malformed favorites data and failed lookups
//!   narrow what the card offers, they never crash it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use curbside_engine::{CardEngine, UserIntent};
//!
//! let mut engine = CardEngine::new(host, config)?;
//! engine.bootstrap()?;
//! engine.user(UserIntent::EditPlate("ab-12-cd".into()));
//! let update = engine.user(UserIntent::Submit);
//! ```

pub mod engine;
pub mod error;
pub mod host;
pub mod identity;
pub mod matcher;
pub mod normalize;
pub mod reconcile;
pub mod selection;

pub use engine::{CardEngine, Update};
pub use error::EngineError;
pub use host::CardHost;
pub use identity::{IdentityState, IdentityTracker, RESOLVE_COOLDOWN_SECS};
pub use reconcile::{
    action_flags, reconcile, ActionFlags, CardChange, CardState, Draft, Effect, FavoriteWrite,
    Reconciled, SubmitOutcome, UserIntent,
};
