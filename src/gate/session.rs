use std::fmt;
use std::sync::Weak;

use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::executor::Executor;
use crate::sync::lock;

use super::core::GateInner;
use super::hooks::GateHooks;
use super::state::ConsumerSet;

/// One activation of a gate's producer.
///
/// Handed to [`GateHooks::activate`]. It stays *current* until the gate tears
/// the producer down; after that every operation on it is a no-op (or, for
/// [`Session::fail`], a report to the side channel).
pub struct Session<H: GateHooks> {
    pub(crate) gate: Weak<GateInner<H>>,
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
    pub(crate) executor: Executor,
}

impl<H: GateHooks> Clone for Session<H> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            generation: self.generation,
            token: self.token.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<H: GateHooks> fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.generation)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl<H: GateHooks> Session<H> {
    /// Monotonic activation counter of the owning gate.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token cancelled when this session is torn down.
    ///
    /// Producer work spawned during `activate` should stop when it fires.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Executor of the owning gate; producer work belongs on it.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Resolves once the session has been torn down.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// True while this session's producer has not been torn down.
    pub fn is_current(&self) -> bool {
        let Some(gate) = self.gate.upgrade() else {
            return false;
        };
        let st = lock(&gate.state);
        st.generation == self.generation && st.phase.is_live()
    }

    /// Runs `f` over the consumers and cache under the gate lock.
    ///
    /// Returns `None` if the session is no longer current.
    pub fn with_consumers<R>(
        &self,
        f: impl FnOnce(&ConsumerSet<H::Consumer>, &mut H::Cache) -> R,
    ) -> Option<R> {
        let gate = self.gate.upgrade()?;
        let mut st = lock(&gate.state);
        if st.generation != self.generation || !st.phase.is_live() {
            return None;
        }
        let st = &mut *st;
        Some(f(&st.consumers, &mut st.cache))
    }

    /// Signals end-of-stream: closes every consumer and tears the producer down.
    ///
    /// Returns `false` if the session was no longer current.
    pub fn complete(&self) -> bool {
        match self.gate.upgrade() {
            Some(gate) => GateInner::complete(&gate, self.generation),
            None => false,
        }
    }

    /// Signals failure: the error goes to every attached consumer, or to the
    /// reporter when none is attached (or the session is stale).
    pub fn fail(&self, error: RelayError) {
        match self.gate.upgrade() {
            Some(gate) => GateInner::fail(&gate, self.generation, error),
            None => tracing::warn!(%error, "failure after gate was dropped"),
        }
    }
}
