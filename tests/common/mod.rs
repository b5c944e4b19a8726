//! Purpose: In-process gRPC-web fixture server for the whiterabbit services.
//! Exports: `Fixture`, `FixtureServer`, sample entity builders.
//! Role: Lets integration tests exercise the real HTTP transport, framing, and bearer metadata.
//! Invariants: Binds 127.0.0.1 on an ephemeral port; shut down when the handle drops.
//! Invariants: Every request is recorded so tests can assert on what the client sent.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;

use whiterabbit::api::{
    Account, AccountQuery, AccountType, AnyValue, FindAllRequest, FindAllResponse, Journal,
    JournalQuery, Timestamp,
};
use whiterabbit::core::frame::{self, MAX_MESSAGE_LEN, Trailers};

const GRPC_WEB: &str = "application/grpc-web+proto";

#[derive(Default)]
pub struct Fixture {
    pub token: Option<String>,
    pub journals: Vec<Journal>,
    pub accounts: Vec<Account>,
    /// Included map returned with every account response.
    pub account_included: BTreeMap<String, AnyValue>,
    pub seen_account_queries: Mutex<Vec<AccountQuery>>,
    pub seen_authorization: Mutex<Vec<Option<String>>>,
}

pub struct FixtureServer {
    pub base_url: String,
    pub fixture: Arc<Fixture>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FixtureServer {
    pub fn start(fixture: Fixture) -> Self {
        let fixture = Arc::new(fixture);
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind fixture");
        listener.set_nonblocking(true).expect("nonblocking");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = router(fixture.clone());

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("listener");
                let _ = axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
            });
        });

        Self {
            base_url: format!("http://{addr}"),
            fixture,
            shutdown: Some(shutdown_tx),
        }
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn router(fixture: Arc<Fixture>) -> Router {
    Router::new()
        .route(
            "/whiterabbit.journal.v1.JournalService/FindAll",
            post(find_journals),
        )
        .route(
            "/whiterabbit.account.v1.AccountService/FindAll",
            post(find_accounts),
        )
        .route("/fixture.v1.Plain/Call", post(plain_text))
        .route("/fixture.v1.Overloaded/Call", post(overloaded))
        .route("/fixture.v1.Streaming/Call", post(two_messages))
        .route("/fixture.v1.Failing/Call", post(failing_in_trailers))
        .with_state(fixture)
}

fn authorize(headers: &HeaderMap, fixture: &Fixture) -> Result<(), Response> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    fixture
        .seen_authorization
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
        .push(value.clone());
    let Some(token) = fixture.token.as_ref() else {
        return Ok(());
    };
    if value.as_deref() == Some(format!("Bearer {token}").as_str()) {
        Ok(())
    } else {
        Err(trailers_only(16, "invalid%20bearer%20token"))
    }
}

async fn find_journals(
    State(fixture): State<Arc<Fixture>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&headers, &fixture) {
        return response;
    }
    let Some(request) = request_message(&body) else {
        return trailers_only(3, "bad%20request%20frame");
    };
    let Ok(request) = FindAllRequest::<JournalQuery>::decode(&request) else {
        return trailers_only(3, "bad%20request");
    };
    let values = fixture
        .journals
        .iter()
        .filter(|journal| request.query.id.is_empty() || request.query.id.contains(&journal.id))
        .cloned()
        .collect();
    unary_ok(FindAllResponse {
        values,
        included: BTreeMap::new(),
    }
    .encode())
}

async fn find_accounts(
    State(fixture): State<Arc<Fixture>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(&headers, &fixture) {
        return response;
    }
    let Some(request) = request_message(&body) else {
        return trailers_only(3, "bad%20request%20frame");
    };
    let Ok(request) = FindAllRequest::<AccountQuery>::decode(&request) else {
        return trailers_only(3, "bad%20request");
    };
    fixture
        .seen_account_queries
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
        .push(request.query.clone());
    let query = request.query;
    let values = fixture
        .accounts
        .iter()
        .filter(|account| query.journal_id.is_empty() || query.journal_id.contains(&account.journal_id))
        .filter(|account| query.id.is_empty() || query.id.contains(&account.id))
        .cloned()
        .collect();
    unary_ok(FindAllResponse {
        values,
        included: fixture.account_included.clone(),
    }
    .encode())
}

async fn plain_text() -> Response {
    ([(header::CONTENT_TYPE, "text/plain")], "hello").into_response()
}

async fn overloaded() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response()
}

async fn two_messages() -> Response {
    let mut body = frame::encode_message(b"one").expect("frame");
    body.extend(frame::encode_message(b"two").expect("frame"));
    body.extend(frame::encode_trailers(&Trailers::new().with("grpc-status", "0")).expect("trailers"));
    ([(header::CONTENT_TYPE, GRPC_WEB)], body).into_response()
}

async fn failing_in_trailers() -> Response {
    let trailers = Trailers::new()
        .with("grpc-status", "2")
        .with("grpc-message", "rate%2541");
    let body = frame::encode_trailers(&trailers).expect("trailers");
    ([(header::CONTENT_TYPE, GRPC_WEB)], body).into_response()
}

fn request_message(body: &[u8]) -> Option<Vec<u8>> {
    let decoded = frame::decode_body(body, MAX_MESSAGE_LEN).ok()?;
    decoded.messages.into_iter().next()
}

fn unary_ok(message: Vec<u8>) -> Response {
    let mut body = frame::encode_message(&message).expect("frame");
    body.extend(frame::encode_trailers(&Trailers::new().with("grpc-status", "0")).expect("trailers"));
    ([(header::CONTENT_TYPE, GRPC_WEB)], body).into_response()
}

fn trailers_only(code: u32, message: &str) -> Response {
    (
        [
            ("content-type", GRPC_WEB.to_string()),
            ("grpc-status", code.to_string()),
            ("grpc-message", message.to_string()),
        ],
        Vec::<u8>::new(),
    )
        .into_response()
}

pub fn journal(id: &str, name: &str) -> Journal {
    Journal {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        currency: "EUR".to_string(),
        created_at: Some(Timestamp::new(1_700_000_000, 0)),
    }
}

pub fn account(id: &str, journal_id: &str, name: &str, account_type: AccountType) -> Account {
    Account {
        id: id.to_string(),
        journal_id: journal_id.to_string(),
        name: name.to_string(),
        description: String::new(),
        account_type,
        parent_id: None,
        created_at: None,
    }
}

/// Two journals; accounts spread across both; the included map carries the first journal.
pub fn ledger_fixture(token: Option<&str>) -> Fixture {
    let general = journal("j-1", "General");
    Fixture {
        token: token.map(str::to_string),
        journals: vec![general.clone(), journal("j-2", "Payroll")],
        accounts: vec![
            account("a-1", "j-1", "Cash", AccountType::Asset),
            account("a-2", "j-1", "Revenue", AccountType::Income),
            account("a-3", "j-2", "Wages", AccountType::Expense),
        ],
        account_included: [("j-1".to_string(), AnyValue::pack(&general))]
            .into_iter()
            .collect(),
        ..Fixture::default()
    }
}
