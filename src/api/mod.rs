//! Purpose: Define the stable public Rust API boundary for whiterabbit clients.
//! Exports: Entities, envelopes, the decoder entry points, transport, and service clients.
//! Role: Public, additive-only surface over `core` and the remote transport.
//! Invariants: Callers never need to reach into `core` for normal use.

mod remote;
mod service;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::entity::{
    ACCOUNT_TYPE_URL, Account, AccountType, JOURNAL_TYPE_URL, Journal, ProtoMessage, Timestamp,
};
pub use crate::core::envelope::{
    AccountQuery, AnyValue, CompoundResult, FindAllRequest, FindAllResponse, IncludedMap,
    JournalQuery,
};
pub use crate::core::error::{DecodeError, Error, ErrorKind};
pub use crate::core::registry::{
    DecodedEntity, EntityKind, IncludedPolicy, IncludedReport, SkippedEntry, TypeRegistry,
    decode_included, decode_included_with,
};
pub use crate::core::wire::WireError;
pub use remote::{ApiResult, RemoteClient, Transport};
pub use service::{
    ACCOUNT_FIND_ALL, AccountServiceClient, JOURNAL_FIND_ALL, JournalAccounts,
    JournalServiceClient, accounts_of_first_journal,
};
