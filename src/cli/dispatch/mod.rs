use crate::cli::{
    actions::{server::Args, Action},
    commands::{oauth, session, token, ARG_DSN, ARG_GRPC_PORT, ARG_PORT, ARG_REQUEST_TIMEOUT},
};
use anyhow::{bail, Context, Result};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let grpc_port = matches
        .get_one::<u16>(ARG_GRPC_PORT)
        .copied()
        .unwrap_or(9090);
    if port == grpc_port {
        bail!("--{ARG_PORT} and --{ARG_GRPC_PORT} must differ");
    }

    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let request_timeout_seconds = matches
        .get_one::<u64>(ARG_REQUEST_TIMEOUT)
        .copied()
        .unwrap_or(10);

    Ok(Action::Server(Args {
        port,
        grpc_port,
        dsn,
        request_timeout_seconds,
        token: token::Options::parse(matches)?,
        session: session::Options::parse(matches)?,
        oauth: oauth::Options::parse(matches)?,
    }))
}
