//! Output-session registry.
//!
//! A single map keyed by `(data-specifier, destination)`, with a `None`
//! destination meaning "broadcast" for messages and otherwise unused for
//! services (every service output is unicast). Lookup is hashed rather than
//! the dispatch table's dense indexing, since output creation is driven by
//! the local user, not by wire traffic, and isn't on any hot path.

use alloc::rc::Rc;
use core::cell::Cell;

#[cfg(feature = "std")]
use std::collections::HashMap;

use crate::serialization::descriptor::Descriptor;
use crate::types::{DataSpecifier, NodeId, TransferId, TRANSFER_ID_MODULO};

/// A registered output. Closing it (via [`OutputRegistry::close`]) marks it
/// dead in place; holders of a stale `Rc` observe `is_closed()` rather than
/// a dangling reference.
pub struct OutputSession {
    pub data_specifier: DataSpecifier,
    pub destination: Option<NodeId>,
    pub descriptor: Rc<Descriptor>,
    closed: Cell<bool>,
    next_transfer_id: Cell<TransferId>,
    loopback_count: Cell<u32>,
}

impl OutputSession {
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Returns this session's next transfer-id, advancing the counter
    /// modulo 32 for the following call.
    pub fn next_transfer_id(&self) -> TransferId {
        let id = self.next_transfer_id.get();
        self.next_transfer_id.set((id + 1) % TRANSFER_ID_MODULO);
        id
    }

    /// Delivers a loopback echo of a frame this session sent. Every hit in
    /// [`OutputRegistry::find`] routes here exactly once per echoed frame,
    /// matching the original transport's per-output `handle_loopback_frame`
    /// notification; this is a best-effort diagnostic counter, not a
    /// delivery guarantee.
    pub fn handle_loopback_frame(&self) {
        self.loopback_count.set(self.loopback_count.get() + 1);
    }

    pub fn loopback_count(&self) -> u32 {
        self.loopback_count.get()
    }
}

#[derive(Eq, PartialEq, Hash)]
struct OutputKey {
    data_specifier: DataSpecifier,
    destination: Option<NodeId>,
}

#[cfg(feature = "std")]
pub struct OutputRegistry {
    sessions: HashMap<OutputKey, Rc<OutputSession>>,
}

#[cfg(feature = "std")]
impl OutputRegistry {
    pub fn new() -> Self {
        Self { sessions: HashMap::new() }
    }

    /// Returns the existing session for `(data_specifier, destination)`, or
    /// builds one via `factory` (invoked only on a miss) and registers it.
    pub fn get_or_create(
        &mut self,
        data_specifier: DataSpecifier,
        destination: Option<NodeId>,
        factory: impl FnOnce() -> Rc<Descriptor>,
    ) -> Rc<OutputSession> {
        let key = OutputKey {
            data_specifier,
            destination,
        };
        if let Some(existing) = self.sessions.get(&key) {
            return existing.clone();
        }

        let session = Rc::new(OutputSession {
            data_specifier,
            destination,
            descriptor: factory(),
            closed: Cell::new(false),
            next_transfer_id: Cell::new(0),
            loopback_count: Cell::new(0),
        });
        self.sessions.insert(key, session.clone());
        session
    }

    pub fn find(&self, data_specifier: DataSpecifier, destination: Option<NodeId>) -> Option<Rc<OutputSession>> {
        self.sessions
            .get(&OutputKey {
                data_specifier,
                destination,
            })
            .cloned()
    }

    /// The finalizer half of session close: removes the registry entry and
    /// marks any other outstanding handle closed.
    pub fn close(&mut self, data_specifier: DataSpecifier, destination: Option<NodeId>) {
        let key = OutputKey {
            data_specifier,
            destination,
        };
        if let Some(session) = self.sessions.remove(&key) {
            session.closed.set(true);
        }
    }

    pub fn clear(&mut self) {
        for session in self.sessions.values() {
            session.closed.set(true);
        }
        self.sessions.clear();
    }
}

#[cfg(feature = "std")]
impl Default for OutputRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::serialization::descriptor::{CompoundDescriptor, CompoundKind};

    fn dummy_descriptor() -> Rc<Descriptor> {
        Rc::new(Descriptor::Compound(CompoundDescriptor {
            kind: CompoundKind::Message,
            data_type_id: 341,
            base_crc: 0,
            signature: 0,
            fields: alloc::vec::Vec::new(),
            constants: alloc::vec::Vec::new(),
            is_union: false,
            response: None,
        }))
    }

    #[test]
    fn repeated_get_or_create_returns_same_session() {
        let mut registry = OutputRegistry::new();
        let spec = DataSpecifier::Message(341);
        let mut built = 0;
        let a = registry.get_or_create(spec, None, || {
            built += 1;
            dummy_descriptor()
        });
        let b = registry.get_or_create(spec, None, || {
            built += 1;
            dummy_descriptor()
        });
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(built, 1);
    }

    #[test]
    fn close_marks_session_closed_and_frees_the_slot() {
        let mut registry = OutputRegistry::new();
        let spec = DataSpecifier::Message(341);
        let session = registry.get_or_create(spec, None, dummy_descriptor);
        registry.close(spec, None);
        assert!(session.is_closed());
        assert!(registry.find(spec, None).is_none());
    }
}
