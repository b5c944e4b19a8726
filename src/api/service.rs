//! Purpose: Typed clients for `JournalService` and `AccountService` FindAll calls.
//! Exports: `JournalServiceClient`, `AccountServiceClient`, `JournalAccounts`,
//!          `accounts_of_first_journal`, method path constants.
//! Role: Encode queries, call the transport, parse envelopes, and resolve included entries.
//! Invariants: Calls are sequential; every step propagates its error with the method attached.
//! Invariants: No retries; retry policy belongs to the caller and covers fetch and decode together.
#![allow(clippy::result_large_err)]

use std::marker::PhantomData;

use serde::Serialize;

use super::remote::{ApiResult, Transport};
use crate::core::entity::{Account, Journal, ProtoMessage};
use crate::core::envelope::{
    AccountQuery, CompoundResult, FindAllRequest, FindAllResponse, JournalQuery,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::registry::IncludedPolicy;

pub const JOURNAL_FIND_ALL: &str = "/whiterabbit.journal.v1.JournalService/FindAll";
pub const ACCOUNT_FIND_ALL: &str = "/whiterabbit.account.v1.AccountService/FindAll";

/// Generic FindAll caller shared by the per-service clients.
struct FindAllCall<T, Q, V> {
    transport: T,
    method: &'static str,
    _marker: PhantomData<fn(Q) -> V>,
}

impl<T, Q, V> FindAllCall<T, Q, V>
where
    T: Transport,
    Q: ProtoMessage + Default + Clone,
    V: ProtoMessage,
{
    fn find_all(&self, query: &Q) -> ApiResult<FindAllResponse<V>> {
        let request = FindAllRequest::new(query.clone()).encode();
        let bytes = self.transport.unary(self.method, &request)?;
        let response = FindAllResponse::<V>::decode(&bytes).map_err(|err| {
            Error::from(err)
                .with_message("malformed FindAll response")
                .with_method(self.method)
        })?;
        tracing::debug!(
            method = self.method,
            values = response.values.len(),
            included = response.included.len(),
            "find_all returned"
        );
        Ok(response)
    }

    fn find_all_resolved(&self, query: &Q, policy: IncludedPolicy) -> ApiResult<CompoundResult<V>> {
        let response = self.find_all(query)?;
        response
            .resolve(policy)
            .map_err(|err| Error::from(err).with_method(self.method))
    }
}

pub struct JournalServiceClient<T> {
    call: FindAllCall<T, JournalQuery, Journal>,
}

impl<T: Transport> JournalServiceClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            call: FindAllCall {
                transport,
                method: JOURNAL_FIND_ALL,
                _marker: PhantomData,
            },
        }
    }

    /// Raw envelope; included entries are still encoded.
    pub fn find_all(&self, query: &JournalQuery) -> ApiResult<FindAllResponse<Journal>> {
        self.call.find_all(query)
    }

    pub fn find_all_resolved(
        &self,
        query: &JournalQuery,
        policy: IncludedPolicy,
    ) -> ApiResult<CompoundResult<Journal>> {
        self.call.find_all_resolved(query, policy)
    }
}

pub struct AccountServiceClient<T> {
    call: FindAllCall<T, AccountQuery, Account>,
}

impl<T: Transport> AccountServiceClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            call: FindAllCall {
                transport,
                method: ACCOUNT_FIND_ALL,
                _marker: PhantomData,
            },
        }
    }

    pub fn find_all(&self, query: &AccountQuery) -> ApiResult<FindAllResponse<Account>> {
        self.call.find_all(query)
    }

    pub fn find_all_resolved(
        &self,
        query: &AccountQuery,
        policy: IncludedPolicy,
    ) -> ApiResult<CompoundResult<Account>> {
        self.call.find_all_resolved(query, policy)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JournalAccounts {
    pub journal: Journal,
    pub accounts: CompoundResult<Account>,
}

/// Finds all journals, then the accounts of the first one.
pub fn accounts_of_first_journal<J, A>(
    journals: &JournalServiceClient<J>,
    accounts: &AccountServiceClient<A>,
    policy: IncludedPolicy,
) -> ApiResult<JournalAccounts>
where
    J: Transport,
    A: Transport,
{
    let found = journals.find_all(&JournalQuery::default())?;
    let Some(journal) = found.values.into_iter().next() else {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("no journals found")
            .with_method(JOURNAL_FIND_ALL)
            .with_hint("Create a journal first, or pass --journal explicitly."));
    };
    tracing::debug!(journal = %journal.id, "using first journal");
    let query = AccountQuery::for_journals([journal.id.clone()]);
    let accounts = accounts.find_all_resolved(&query, policy)?;
    Ok(JournalAccounts { journal, accounts })
}
