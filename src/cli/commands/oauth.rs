use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_GOOGLE_REDIRECT_URL: &str = "google-redirect-url";
pub const ARG_GOOGLE_OAUTH_STATE: &str = "google-oauth-state";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("TECHFEED_GOOGLE_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("TECHFEED_GOOGLE_CLIENT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_GOOGLE_REDIRECT_URL)
                .long(ARG_GOOGLE_REDIRECT_URL)
                .help("Callback URL registered with Google, example: https://techfeed.dev/v1/oauth/google/callback")
                .env("TECHFEED_GOOGLE_REDIRECT_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_GOOGLE_OAUTH_STATE)
                .long(ARG_GOOGLE_OAUTH_STATE)
                .help("State value sent with the login URL and expected back on the callback")
                .env("TECHFEED_GOOGLE_OAUTH_STATE")
                .hide_env_values(true)
                .required(true),
        )
}

#[derive(Debug)]
pub struct Options {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_url: Url,
    pub state: SecretString,
}

impl Options {
    /// # Errors
    /// Returns an error if a value is missing or the redirect URL does not parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let client_id = matches
            .get_one::<String>(ARG_GOOGLE_CLIENT_ID)
            .cloned()
            .context("missing required argument: --google-client-id")?;
        let client_secret = matches
            .get_one::<String>(ARG_GOOGLE_CLIENT_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --google-client-secret")?;
        let redirect_url = matches
            .get_one::<String>(ARG_GOOGLE_REDIRECT_URL)
            .context("missing required argument: --google-redirect-url")?;
        let redirect_url = Url::parse(redirect_url)
            .with_context(|| format!("invalid --google-redirect-url: {redirect_url}"))?;
        let state = matches
            .get_one::<String>(ARG_GOOGLE_OAUTH_STATE)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --google-oauth-state")?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_url,
            state,
        })
    }
}
