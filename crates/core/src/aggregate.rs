//! Command/event state machine contract.

/// A state machine driven by commands.
///
/// `handle` inspects the current state and either emits events or rejects the
/// command with `Error`, leaving state untouched. `apply` folds one event into
/// state. Neither performs I/O, so replaying the same commands always yields
/// the same state.
pub trait Aggregate {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Events applied so far.
    fn version(&self) -> u64;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
