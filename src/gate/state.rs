use std::fmt;

/// Lifecycle of the producer behind a [`Gate`](crate::Gate).
///
/// ```text
/// Inactive ──attach──► Activating ──activate() returns──► Active
///    ▲                                                      │
///    │                                               last detach
///    │                                                      ▼
///    └────────── grace elapsed, still empty ──── DrainingToInactive
///                                                 │        ▲
///                                          attach │        │ last detach
///                                                 ▼        │
///                                                  Active ─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// No producer running, no consumers.
    Inactive,
    /// Activation routine in flight.
    Activating,
    /// Producer running with at least one consumer (or activation just returned).
    Active,
    /// No consumers; producer kept alive until the grace period elapses.
    DrainingToInactive,
}

impl ProducerState {
    /// True unless the producer is fully torn down.
    pub fn is_live(self) -> bool {
        !matches!(self, ProducerState::Inactive)
    }

    /// Short stable label (snake_case) for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            ProducerState::Inactive => "inactive",
            ProducerState::Activating => "activating",
            ProducerState::Active => "active",
            ProducerState::DrainingToInactive => "draining",
        }
    }
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Identity of one attached consumer within its gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Consumers currently attached to one gate, in attach order.
///
/// Membership changes are the only trigger for [`ProducerState`] transitions,
/// so hooks get a read-only view; only attach and detach on the gate mutate it.
///
/// ```compile_fail
/// fn prune(set: &mut relayvisor::ConsumerSet<()>) {
///     set.retain(|_| false);
/// }
/// ```
#[derive(Debug)]
pub struct ConsumerSet<C> {
    entries: Vec<(ConsumerId, C)>,
    next_id: u64,
}

impl<C> ConsumerSet<C> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    pub(crate) fn insert(&mut self, consumer: C) -> ConsumerId {
        let id = ConsumerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, consumer));
        id
    }

    pub(crate) fn remove(&mut self, id: ConsumerId) -> Option<C> {
        let pos = self.entries.iter().position(|(cid, _)| *cid == id)?;
        Some(self.entries.remove(pos).1)
    }

    pub(crate) fn drain(&mut self) -> Vec<C> {
        self.entries.drain(..).map(|(_, c)| c).collect()
    }

    /// Number of attached consumers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates consumers in attach order.
    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.entries.iter().map(|(_, c)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_not_reused() {
        let mut set = ConsumerSet::new();
        let a = set.insert("a");
        assert_eq!(set.remove(a), Some("a"));
        let b = set.insert("b");
        assert_ne!(a, b);
        assert_eq!(set.remove(a), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_drain_keeps_attach_order() {
        let mut set = ConsumerSet::new();
        set.insert(1);
        set.insert(2);
        set.insert(3);
        assert_eq!(set.drain(), vec![1, 2, 3]);
        assert!(set.is_empty());
    }
}
