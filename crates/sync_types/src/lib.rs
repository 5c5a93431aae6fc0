//! Wire types for the relay push protocol.
//!
//! Everything a client sends when pushing mutations, everything the
//! upstream push endpoint replies with, and the downstream messages fanned
//! back out to clients. These types define the JSON wire format, so field
//! spellings here (`clientGroupID`, `mutationIDs`, ...) are load-bearing.

mod auth;
mod downstream;
mod push;
mod response;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod types;

pub use auth::AuthToken;
pub use downstream::Downstream;
pub use push::{
    Mutation,
    MutationKind,
    PushBody,
    PUSH_VERSION,
};
pub use response::{
    MutationError,
    MutationErrorKind,
    MutationOk,
    MutationResponse,
    MutationResult,
    PushError,
    PushErrorKind,
    PushOk,
    PushResponse,
};
pub use types::{
    ClientGroupId,
    ClientId,
    MutationId,
};
