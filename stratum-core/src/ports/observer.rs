//! Observer port - progress and audit hooks for the migration runner

use std::time::Duration;

use crate::domain::{Direction, MigrationId};

/// Something that happened while running a migration
#[derive(Debug)]
pub enum MigrationEvent<'a> {
    /// The action is about to run inside a fresh transaction
    Started {
        id: &'a MigrationId,
        direction: Direction,
    },
    /// The transaction committed
    Completed {
        id: &'a MigrationId,
        direction: Direction,
        duration: Duration,
    },
    /// The transaction was rolled back
    Failed {
        id: &'a MigrationId,
        direction: Direction,
        error: &'a anyhow::Error,
    },
}

impl MigrationEvent<'_> {
    pub fn id(&self) -> &MigrationId {
        match self {
            MigrationEvent::Started { id, .. }
            | MigrationEvent::Completed { id, .. }
            | MigrationEvent::Failed { id, .. } => id,
        }
    }
}

/// Receives runner events
///
/// Observers must not fail the run; anything they do is best effort.
pub trait MigrationObserver {
    fn on_event(&self, event: &MigrationEvent<'_>);
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MigrationObserver for NoopObserver {
    fn on_event(&self, _event: &MigrationEvent<'_>) {}
}

/// Fans events out to several observers in order
#[derive(Default)]
pub struct CompositeObserver<'a> {
    observers: Vec<&'a dyn MigrationObserver>,
}

impl<'a> CompositeObserver<'a> {
    pub fn new() -> Self {
        Self { observers: Vec::new() }
    }

    pub fn with(mut self, observer: &'a dyn MigrationObserver) -> Self {
        self.observers.push(observer);
        self
    }
}

impl MigrationObserver for CompositeObserver<'_> {
    fn on_event(&self, event: &MigrationEvent<'_>) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}
