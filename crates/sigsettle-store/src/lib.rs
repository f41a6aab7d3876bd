//! Persistence abstraction over signal and subscription records.
//!
//! The engine and dispatcher depend only on the [`SignalStore`] and
//! [`SubscriptionStore`] traits. Field names of the persisted records are
//! the serde names of [`sigsettle_core::Signal`] and
//! [`sigsettle_core::Subscription`].
//!
//! The bundled implementation keeps records in memory and can mirror every
//! signal write to an append-only JSON Lines journal that is replayed on
//! startup.

pub mod error;
pub mod journal;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use journal::SignalJournal;
pub use memory::{InMemorySignalStore, InMemorySubscriptionStore};
pub use store::{DeliveryOutcome, SignalQuery, SignalStore, SubscriptionStore};
