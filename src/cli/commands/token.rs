use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_TOKEN_ISSUER: &str = "token-issuer";
pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_ISSUER)
                .long(ARG_TOKEN_ISSUER)
                .help("Issuer claim for access and refresh tokens")
                .env("TECHFEED_TOKEN_ISSUER")
                .default_value("techfeed"),
        )
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HS256 signing secret shared by both token kinds")
                .env("TECHFEED_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token lifetime in seconds")
                .env("TECHFEED_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long(ARG_REFRESH_TOKEN_TTL)
                .help("Refresh token lifetime in seconds")
                .env("TECHFEED_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub issuer: String,
    pub secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if the secret is missing or a lifetime is not positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let issuer = matches
            .get_one::<String>(ARG_TOKEN_ISSUER)
            .cloned()
            .context("missing required argument: --token-issuer")?;
        let secret = matches
            .get_one::<String>(ARG_TOKEN_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --token-secret")?;
        let access_ttl_seconds = matches
            .get_one::<i64>(ARG_ACCESS_TOKEN_TTL)
            .copied()
            .unwrap_or(3600);
        let refresh_ttl_seconds = matches
            .get_one::<i64>(ARG_REFRESH_TOKEN_TTL)
            .copied()
            .unwrap_or(2_592_000);

        if access_ttl_seconds <= 0 {
            bail!("--{ARG_ACCESS_TOKEN_TTL} must be positive");
        }
        if refresh_ttl_seconds <= 0 {
            bail!("--{ARG_REFRESH_TOKEN_TTL} must be positive");
        }

        Ok(Self {
            issuer,
            secret,
            access_ttl_seconds,
            refresh_ttl_seconds,
        })
    }
}
