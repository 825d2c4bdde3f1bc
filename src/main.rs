//! Purpose: `krd` CLI entry point.
//! Role: Binary crate root; parses the database path, opens it, runs the HTTP server.
//! Invariants: Exactly one positional argument; anything else prints usage and exits non-zero.
//! Invariants: The server binds the fixed loopback address `BIND_ADDR`.
//! Invariants: Process exit code is derived from `core::error::to_exit_code`.
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, ValueHint, error::ErrorKind as ClapErrorKind};
use tracing::info;

use krd::core::db::Database;
use krd::core::error::{Error, ErrorKind, to_exit_code};

mod serve;

const BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 9797);

#[derive(Parser)]
#[command(
    name = "krd",
    version,
    about = "Browse and edit a SQLite database file from a web browser",
    override_usage = "krd <DATABASE>"
)]
struct Cli {
    /// SQLite database file to open in place.
    #[arg(value_name = "DATABASE", value_hint = ValueHint::FilePath)]
    database: PathBuf,
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                return Ok(());
            }
            _ => {
                eprintln!("{}", Cli::command().render_usage());
                return Err(Error::new(ErrorKind::Usage).with_message(clap_error_summary(&err)));
            }
        },
    };

    serve::init_tracing();

    let db = Database::open(&cli.database)?;
    let config = serve::ServeConfig {
        bind: SocketAddr::from(BIND_ADDR),
        database: db.clone(),
    };
    info!("http://localhost:{}", config.bind.port());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })?;
    let result = runtime.block_on(serve::serve(config));

    info!(path = %db.path().display(), "closing db");
    drop(db);
    result?;
    info!("bye");
    Ok(())
}

fn emit_error(err: &Error) {
    eprintln!("error: {err}");
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        eprintln!("  caused by: {inner}");
        source = inner.source();
    }
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
