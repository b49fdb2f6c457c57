//! Constant-time inbound dispatch.
//!
//! A dense flat table, one slot per `(data-specifier, source)` pair, routes
//! a reassembled transfer straight to its subscriber without ever scanning a
//! list of sessions. Promiscuous subscribers (no fixed source) and selective
//! subscribers (one fixed source) occupy distinct slots of the same table
//! and are both consulted on every inbound transfer.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::serialization::descriptor::Descriptor;
use crate::serialization::value::Value;
use crate::transfer::TransferMetadata;
use crate::types::{DataSpecifier, NUM_NODE_IDS, NUM_SERVICES, NUM_SUBJECTS, NodeId, ServiceRole};

/// Number of slots in the dense dispatch table: every subject plus both
/// service roles, each crossed with every possible source (plus the
/// promiscuous "any source" slot).
pub const DISPATCH_TABLE_SIZE: usize = (NUM_SUBJECTS + 2 * NUM_SERVICES) * (NUM_NODE_IDS + 1);

/// Maps a `(data-specifier, source)` pair onto its slot in the dense table.
/// `source = None` addresses the promiscuous slot. Injective over its
/// domain: distinct inputs always land on distinct indices.
pub fn dispatch_index(data_specifier: DataSpecifier, source: Option<NodeId>) -> usize {
    let dim1 = match data_specifier {
        DataSpecifier::Message(subject_id) => subject_id as usize,
        DataSpecifier::Service {
            service_id,
            role: ServiceRole::Client,
        } => NUM_SUBJECTS + service_id as usize,
        DataSpecifier::Service {
            service_id,
            role: ServiceRole::Server,
        } => NUM_SUBJECTS + NUM_SERVICES + service_id as usize,
    };
    let dim2 = source.map(|n| n as usize).unwrap_or(NUM_NODE_IDS);
    dim1 * (NUM_NODE_IDS + 1) + dim2
}

/// A subscribed input: a backlog of completed, already-unpacked transfers
/// awaiting a `try_receive` call, plus the descriptor used to unpack them.
pub struct InputSession<C: embedded_time::Clock> {
    pub data_specifier: DataSpecifier,
    pub source: Option<NodeId>,
    pub descriptor: Rc<Descriptor>,
    queue: RefCell<VecDeque<(TransferMetadata<C>, Value)>>,
    capacity: usize,
}

impl<C: embedded_time::Clock> InputSession<C> {
    fn new(data_specifier: DataSpecifier, source: Option<NodeId>, descriptor: Rc<Descriptor>, capacity: usize) -> Self {
        Self {
            data_specifier,
            source,
            descriptor,
            queue: RefCell::new(VecDeque::new()),
            capacity,
        }
    }

    /// Enqueues a reassembled transfer. A backlog already at capacity drops
    /// its oldest entry rather than refusing the new one, so a slow
    /// subscriber loses history instead of wedging the dispatcher.
    pub fn deliver(&self, metadata: TransferMetadata<C>, value: Value) {
        let mut queue = self.queue.borrow_mut();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back((metadata, value));
    }

    /// Pops the next completed transfer, if any. A true suspending
    /// `receive()` is left to the embedding executor: dispatch itself never
    /// yields, per the crate's cooperative scheduling model.
    pub fn try_receive(&self) -> Option<(TransferMetadata<C>, Value)> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

/// The dense inbound dispatch table.
pub struct InputDispatchTable<C: embedded_time::Clock> {
    slots: Vec<Option<Rc<InputSession<C>>>>,
}

impl<C: embedded_time::Clock> InputDispatchTable<C> {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(DISPATCH_TABLE_SIZE);
        slots.resize_with(DISPATCH_TABLE_SIZE, || None);
        Self { slots }
    }

    /// Idempotent: returns the session already occupying this slot, or
    /// builds one via `factory` and inserts it.
    pub fn get_or_create(
        &mut self,
        data_specifier: DataSpecifier,
        source: Option<NodeId>,
        capacity: usize,
        factory: impl FnOnce() -> Rc<Descriptor>,
    ) -> Rc<InputSession<C>> {
        let index = dispatch_index(data_specifier, source);
        if let Some(existing) = &self.slots[index] {
            return existing.clone();
        }
        let session = Rc::new(InputSession::new(data_specifier, source, factory(), capacity));
        self.slots[index] = Some(session.clone());
        session
    }

    pub fn find(&self, data_specifier: DataSpecifier, source: Option<NodeId>) -> Option<Rc<InputSession<C>>> {
        self.slots[dispatch_index(data_specifier, source)].clone()
    }

    pub fn close(&mut self, data_specifier: DataSpecifier, source: Option<NodeId>) {
        self.slots[dispatch_index(data_specifier, source)] = None;
    }

    /// Delivers one inbound transfer to both the selective slot for `source`
    /// (if populated) and the promiscuous slot (if populated) — both may
    /// fire for the same frame. `unpack` is invoked once per populated slot
    /// since two slots may in principle disagree on descriptor.
    pub fn route(
        &self,
        data_specifier: DataSpecifier,
        source: Option<NodeId>,
        metadata: &TransferMetadata<C>,
        mut unpack: impl FnMut(&Descriptor) -> Option<Value>,
    ) {
        if let Some(source) = source {
            if let Some(session) = &self.slots[dispatch_index(data_specifier, Some(source))] {
                if let Some(value) = unpack(&session.descriptor) {
                    session.deliver(metadata.clone(), value);
                }
            }
        }

        if let Some(session) = &self.slots[dispatch_index(data_specifier, None)] {
            if let Some(value) = unpack(&session.descriptor) {
                session.deliver(metadata.clone(), value);
            }
        }
    }
}

impl<C: embedded_time::Clock> Default for InputDispatchTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_table_size_matches_formula() {
        assert_eq!(DISPATCH_TABLE_SIZE, (NUM_SUBJECTS + 2 * NUM_SERVICES) * (NUM_NODE_IDS + 1));
    }

    #[test]
    fn message_and_service_indices_are_injective_within_a_sample() {
        let mut seen = alloc::vec::Vec::new();
        let cases = [
            (DataSpecifier::Message(0), None),
            (DataSpecifier::Message(0), Some(7)),
            (DataSpecifier::Message(100), Some(7)),
            (
                DataSpecifier::Service {
                    service_id: 10,
                    role: ServiceRole::Client,
                },
                Some(7),
            ),
            (
                DataSpecifier::Service {
                    service_id: 10,
                    role: ServiceRole::Server,
                },
                Some(7),
            ),
        ];
        for (spec, source) in cases {
            let index = dispatch_index(spec, source);
            assert!(index < DISPATCH_TABLE_SIZE);
            assert!(!seen.contains(&index), "duplicate index {index}");
            seen.push(index);
        }
    }

    #[test]
    fn promiscuous_and_selective_slots_are_distinct() {
        let spec = DataSpecifier::Message(100);
        assert_ne!(dispatch_index(spec, None), dispatch_index(spec, Some(7)));
    }
}
