//! The application-side mutation processor.
//!
//! Receives an inbound push, authoritatively sequences each mutation
//! against the client's persisted `lastMutationID`, and dispatches the
//! application's mutators inside one database transaction per mutation.
//! The ordering contract: for every client, committed mutation IDs are
//! exactly `1, 2, 3, ...` with no gaps and no repeats.

mod clients;
mod crud;
mod metrics;
mod mutators;
mod process;


pub use crud::{
    TableCrud,
    TableRegistry,
    TableSpec,
};
pub use mutators::{
    Mutator,
    MutatorRegistry,
    MutatorTx,
};
pub use process::{
    ProcessParams,
    ProcessorConfig,
    PushProcessor,
};
