//! Purpose: Hold top-level CLI command dispatch for `whiterabbit`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Remote commands resolve configuration lazily so offline commands need no endpoint.
//! Invariants: Every command emits exactly one JSON document on success.

use std::io::{self, Read};

use clap::CommandFactory;
use serde_json::json;

use super::*;
use whiterabbit::api::{
    Account, AccountQuery, AccountServiceClient, FindAllResponse, Journal, JournalQuery,
    JournalServiceClient, ProtoMessage, TypeRegistry, accounts_of_first_journal,
};
use whiterabbit::core::frame::{self, MAX_MESSAGE_LEN};

pub(super) fn dispatch_command(
    command: Command,
    connection: ConnectionArgs,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "whiterabbit", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_json(json!({
                "name": "whiterabbit",
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Types => {
            let registry = TypeRegistry::global();
            let types = registry
                .type_urls()
                .into_iter()
                .filter_map(|url| {
                    registry
                        .kind_of(url)
                        .map(|kind| json!({ "type_url": url, "kind": kind.as_str() }))
                })
                .collect::<Vec<_>>();
            emit_json(json!({ "types": types }));
            Ok(RunOutcome::ok())
        }
        Command::Journals { ids, included } => {
            let client = connection.resolve()?.client()?;
            let journals = JournalServiceClient::new(client);
            let result = journals.find_all_resolved(&JournalQuery { id: ids }, included.policy())?;
            emit_json(to_json(&result)?);
            Ok(RunOutcome::ok())
        }
        Command::Accounts {
            journals,
            ids,
            included,
        } => {
            let client = connection.resolve()?.client()?;
            let accounts = AccountServiceClient::new(client.clone());
            // Explicit ids are looked up across journals; no filter means the first journal.
            if journals.is_empty() && ids.is_empty() {
                let result = accounts_of_first_journal(
                    &JournalServiceClient::new(client),
                    &accounts,
                    included.policy(),
                )?;
                emit_json(to_json(&result)?);
            } else {
                let query = AccountQuery {
                    id: ids,
                    journal_id: journals,
                };
                let result = accounts.find_all_resolved(&query, included.policy())?;
                emit_json(to_json(&result)?);
            }
            Ok(RunOutcome::ok())
        }
        Command::Decode {
            input,
            values,
            grpc_web,
            included,
        } => {
            let raw = read_input(&input)?;
            let message = if grpc_web {
                unwrap_grpc_web(&raw)?
            } else {
                raw
            };
            let value = match values {
                ValuesKind::Account => decode_offline::<Account>(&message, included)?,
                ValuesKind::Journal => decode_offline::<Journal>(&message, included)?,
            };
            emit_json(value);
            Ok(RunOutcome::ok())
        }
    }
}

fn decode_offline<T>(message: &[u8], included: IncludedArgs) -> Result<Value, Error>
where
    T: ProtoMessage + serde::Serialize,
{
    let response = FindAllResponse::<T>::decode(message)
        .map_err(|err| Error::from(err).with_message("input is not a FindAll response"))?;
    let result = response.resolve(included.policy())?;
    to_json(&result)
}

fn unwrap_grpc_web(body: &[u8]) -> Result<Vec<u8>, Error> {
    let decoded = frame::decode_body(body, MAX_MESSAGE_LEN)?;
    if let Some(status) = decoded.trailers.status().filter(|status| *status != 0) {
        let mut err = Error::new(ErrorKind::Usage)
            .with_message(format!("captured response carries grpc-status {status}"));
        if let Some(message) = decoded.trailers.message() {
            err = err.with_hint(message);
        }
        return Err(err);
    }
    let mut messages = decoded.messages.into_iter();
    match (messages.next(), messages.next()) {
        (Some(message), None) => Ok(message),
        _ => Err(Error::new(ErrorKind::Corrupt)
            .with_message("expected exactly one message in gRPC-web body")),
    }
}

fn read_input(input: &str) -> Result<Vec<u8>, Error> {
    if input == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read stdin")
                .with_source(err)
        })?;
        return Ok(buf);
    }
    std::fs::read(input).map_err(|err| {
        let kind = if err.kind() == io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message(format!("failed to read {input}"))
            .with_source(err)
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to render result as json")
            .with_source(err)
    })
}
