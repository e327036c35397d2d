use crate::client::FileStatusClient;
use crate::error::Result;
use crate::event::Event;
use crate::storage::models::FileDiff;
use crate::storage::MutationOp;
use crate::store::MetaStore;
use crate::translator::{EventTranslator, Translation};
use serde::Deserialize;
use tracing::{debug, info_span, Span};

/// When derived diffs reach the diff log relative to the mutation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffDelivery {
    /// Diffs are written in the same transaction as the mutation batch.
    #[default]
    Batched,
    /// Each event's diffs are appended as soon as it is translated. A failed
    /// batch afterwards leaves those diffs behind.
    Eager,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub events: usize,
    pub ops: usize,
    pub diffs: usize,
}

/// Applies ordered event batches to a metadata store.
pub struct EventApplier<'a, C, S> {
    client: &'a C,
    store: &'a S,
    delivery: DiffDelivery,
    span: Span,
}

impl<'a, C, S> EventApplier<'a, C, S>
where
    C: FileStatusClient,
    S: MetaStore,
{
    pub fn new(client: &'a C, store: &'a S) -> Self {
        Self {
            client,
            store,
            delivery: DiffDelivery::default(),
            span: info_span!("event_applier"),
        }
    }

    pub fn with_delivery(mut self, delivery: DiffDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Log under the caller's span instead of the default `event_applier` one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Translate every event in order, then submit all mutations as one batch.
    ///
    /// The first failing event aborts the call; nothing from this batch is
    /// submitted except, with `DiffDelivery::Eager`, diffs already appended.
    pub fn apply(&self, events: &[Event]) -> Result<ApplyReport> {
        let _enter = self.span.enter();
        let mut translator = EventTranslator::new(self.client, self.store);

        let mut ops: Vec<MutationOp> = Vec::new();
        let mut pending: Vec<FileDiff> = Vec::new();
        let mut written = 0;

        for event in events {
            debug!("Event type = {}, path = {}", event.kind(), event.path());
            let Translation { ops: generated, diffs } = translator.translate(event)?;
            ops.extend(generated);
            match self.delivery {
                DiffDelivery::Eager => {
                    for diff in &diffs {
                        self.store.append(diff)?;
                    }
                    written += diffs.len();
                }
                DiffDelivery::Batched => pending.extend(diffs),
            }
        }

        match self.delivery {
            DiffDelivery::Eager => self.store.execute(&ops)?,
            DiffDelivery::Batched => {
                self.store.commit(&ops, &pending)?;
                written += pending.len();
            }
        }

        debug!(
            "Applied {} events: {} mutation ops, {} file diffs",
            events.len(),
            ops.len(),
            written
        );
        Ok(ApplyReport {
            events: events.len(),
            ops: ops.len(),
            diffs: written,
        })
    }
}
