//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces the core calls out through. Concrete
//! implementations live in the services and in the CLI.

mod observer;

pub use observer::{CompositeObserver, MigrationEvent, MigrationObserver, NoopObserver};
