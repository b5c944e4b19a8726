//! Purpose: `whiterabbit` CLI entry point.
//! Role: Binary crate root; parses args, installs logging, runs commands, emits JSON on stdout.
//! Invariants: Command results are JSON on stdout (pretty on a TTY, one line otherwise).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use whiterabbit::api::{Error, ErrorKind, IncludedPolicy, to_exit_code};
use whiterabbit::config::{ClientConfig, ConfigOverrides, ENV_BASE_URL, ENV_TOKEN};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `whiterabbit --help` for usage."));
            }
        },
    };

    init_tracing(cli.verbose);
    command_dispatch::dispatch_command(cli.command, cli.connection)
}

#[derive(Parser)]
#[command(
    name = "whiterabbit",
    version,
    about = "Query whiterabbit journals and accounts and decode their compound responses",
    long_about = None,
    after_help = r#"EXAMPLES
  $ whiterabbit journals
  $ whiterabbit accounts                       # accounts of the first journal
  $ whiterabbit accounts --id a-3              # by id, across journals
  $ whiterabbit accounts --journal j-1 --skip-unknown
  $ whiterabbit decode response.bin --values account

ENVIRONMENT
  WHITERABBIT_API_URL     service endpoint (default http://[::1]:50051)
  WHITERABBIT_TOKEN       bearer token
  WHITERABBIT_TIMEOUT_MS  per-call timeout, 0 disables
  RUST_LOG                log filter for stderr diagnostics"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Raise stderr log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug, Default)]
struct ConnectionArgs {
    #[arg(long, global = true, help = format!("Service base url (overrides {ENV_BASE_URL})"))]
    url: Option<String>,
    #[arg(long, global = true, help = format!("Bearer token (overrides {ENV_TOKEN})"))]
    token: Option<String>,
    #[arg(long, global = true, value_hint = ValueHint::FilePath, help = "Read the bearer token from a file")]
    token_file: Option<PathBuf>,
    #[arg(long, global = true, help = "Per-call timeout in milliseconds (0 disables)")]
    timeout_ms: Option<u64>,
}

impl ConnectionArgs {
    fn resolve(self) -> Result<ClientConfig, Error> {
        ClientConfig::from_env()?.apply(ConfigOverrides {
            base_url: self.url,
            token: self.token,
            token_file: self.token_file,
            timeout_ms: self.timeout_ms,
        })
    }
}

#[derive(Args, Clone, Copy, Debug, Default)]
struct IncludedArgs {
    /// Skip included entries with unknown type urls instead of failing
    #[arg(long)]
    skip_unknown: bool,
}

impl IncludedArgs {
    fn policy(self) -> IncludedPolicy {
        if self.skip_unknown {
            IncludedPolicy::SkipUnknown
        } else {
            IncludedPolicy::FailFast
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ValuesKind {
    Account,
    Journal,
}

#[derive(Subcommand)]
enum Command {
    /// Find journals and decode their included entities
    Journals {
        /// Restrict to these journal ids
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<String>,
        #[command(flatten)]
        included: IncludedArgs,
    },
    /// Find accounts; without --journal or --id, uses the first journal found
    Accounts {
        /// Restrict to accounts of these journals
        #[arg(long = "journal", value_name = "ID")]
        journals: Vec<String>,
        /// Restrict to these account ids
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<String>,
        #[command(flatten)]
        included: IncludedArgs,
    },
    /// Decode a captured FindAll response offline
    Decode {
        /// Response file, or `-` for stdin
        #[arg(value_hint = ValueHint::FilePath)]
        input: String,
        /// Message type of the primary values
        #[arg(long, value_enum)]
        values: ValuesKind,
        /// Input is a gRPC-web body (framed, with trailers)
        #[arg(long)]
        grpc_web: bool,
        #[command(flatten)]
        included: IncludedArgs,
    },
    /// List the type urls this client can decode
    Types,
    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Print version info
    Version,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: Value) {
    let text = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    match text {
        Ok(text) => println!("{text}"),
        Err(err) => emit_error(
            &Error::new(ErrorKind::Internal)
                .with_message("json encode failed")
                .with_source(err),
        ),
    }
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::Busy => "service is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(method) = err.method() {
        inner.insert("method".to_string(), json!(method));
    }
    if let Some(entry) = err.entry() {
        inner.insert("entry".to_string(), json!(entry));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(method) = err.method() {
        lines.push(format!("method: {method}"));
    }
    if let Some(entry) = err.entry() {
        lines.push(format!("entry: {entry}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
