//! Replication contract shared by every synchronized aggregate.

/// A value replicated from an authoritative copy to remote copies.
///
/// `capture_initializer` produces a full snapshot from which an equivalent
/// value can be built; `collect_delta` returns what changed since the
/// previous collection (or `None`), and `apply_delta` brings a remote copy
/// up to date. Applying the collected delta to a copy taken before the
/// changes yields a value equal to the original.
///
/// Aggregates whose deltas create or destroy physics bodies (participations,
/// component sets) take the physics world as an extra argument and expose
/// the same three operations as inherent methods.
pub trait Networked {
    type Init;
    type Delta;

    fn capture_initializer(&self) -> Self::Init;

    fn apply_delta(&mut self, delta: &Self::Delta);

    fn collect_delta(&mut self) -> Option<Self::Delta>;
}

/// Semantic validity check for values received from the network.
///
/// Sum types already rule out missing variant payloads; this catches
/// what the type system cannot (empty names, non-finite floats, ...).
pub trait VerifyStructure {
    fn verify_structure(&self) -> bool;
}

impl<T: VerifyStructure> VerifyStructure for Option<T> {
    fn verify_structure(&self) -> bool {
        self.as_ref().map_or(true, VerifyStructure::verify_structure)
    }
}
