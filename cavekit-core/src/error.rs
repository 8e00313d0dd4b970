//! Core errors.
//!
//! Resolution misses (unknown path, unknown tome, unknown machine in a
//! query position) are not errors; those surface as root fallbacks or
//! `None`. These variants are the dispatch-time failures.

use escapement::MachineError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("tome `{0}` is already registered")]
    DuplicateTome(String),

    #[error("unknown tome `{0}`")]
    UnknownTome(String),

    #[error("tome `{tome}` has no machine `{machine}`")]
    UnknownMachine { tome: String, machine: String },

    #[error("address `{0}` does not resolve to a machine")]
    Unresolvable(String),

    #[error(transparent)]
    Machine(#[from] MachineError),
}
