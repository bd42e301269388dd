use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_REDIS_URL: &str = "redis-url";
pub const ARG_ACCESS_SESSION_DB: &str = "access-session-db";
pub const ARG_REFRESH_SESSION_DB: &str = "refresh-session-db";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Session store address")
                .env("TECHFEED_REDIS_URL")
                .default_value("redis://127.0.0.1:6379"),
        )
        .arg(
            Arg::new(ARG_ACCESS_SESSION_DB)
                .long(ARG_ACCESS_SESSION_DB)
                .help("Logical database index for access sessions")
                .env("TECHFEED_ACCESS_SESSION_DB")
                .default_value("0")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_SESSION_DB)
                .long(ARG_REFRESH_SESSION_DB)
                .help("Logical database index for refresh sessions")
                .env("TECHFEED_REFRESH_SESSION_DB")
                .default_value("1")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub redis_url: String,
    pub access_db: i64,
    pub refresh_db: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if both namespaces point at the same database index.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let redis_url = matches
            .get_one::<String>(ARG_REDIS_URL)
            .cloned()
            .context("missing required argument: --redis-url")?;
        let access_db = matches
            .get_one::<i64>(ARG_ACCESS_SESSION_DB)
            .copied()
            .unwrap_or(0);
        let refresh_db = matches
            .get_one::<i64>(ARG_REFRESH_SESSION_DB)
            .copied()
            .unwrap_or(1);

        if access_db == refresh_db {
            bail!(
                "--{ARG_ACCESS_SESSION_DB} and --{ARG_REFRESH_SESSION_DB} must differ (both are {access_db})"
            );
        }

        Ok(Self {
            redis_url,
            access_db,
            refresh_db,
        })
    }
}
