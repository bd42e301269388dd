use crate::{
    api,
    auth::{
        AuthService, GoogleConfig, GoogleIdentity, PgUserDirectory, RedisSessionStore,
        SystemClock, TokenCodec, TokenKind,
    },
    cli::{
        commands::{oauth, session, token},
        telemetry,
    },
    rpc,
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{signal, sync::watch};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub grpc_port: u16,
    pub dsn: String,
    pub request_timeout_seconds: u64,
    pub token: token::Options,
    pub session: session::Options,
    pub oauth: oauth::Options,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            debug!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                debug!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}

// Resolves once shutdown is requested or the sender is gone.
fn wait_for(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if a backing service is unreachable or a server fails.
pub async fn execute(args: Args) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let request_timeout = Duration::from_secs(args.request_timeout_seconds);

    let access_sessions = RedisSessionStore::connect(
        &args.session.redis_url,
        args.session.access_db,
        args.token.access_ttl_seconds,
        request_timeout,
    )
    .await
    .context("Failed to connect to access session store")?;
    let refresh_sessions = RedisSessionStore::connect(
        &args.session.redis_url,
        args.session.refresh_db,
        args.token.refresh_ttl_seconds,
        request_timeout,
    )
    .await
    .context("Failed to connect to refresh session store")?;

    let google = GoogleConfig::new(
        args.oauth.client_id,
        args.oauth.client_secret,
        args.oauth.redirect_url,
        args.oauth.state,
    )
    .context("Invalid Google endpoint")?
    .with_timeout(request_timeout);
    let identity = GoogleIdentity::new(google).context("Failed to build HTTP client")?;

    let clock = Arc::new(SystemClock);
    let access_codec = TokenCodec::new(
        &args.token.issuer,
        &args.token.secret,
        args.token.access_ttl_seconds,
        clock.clone(),
    );
    let refresh_codec = TokenCodec::new(
        &args.token.issuer,
        &args.token.secret,
        args.token.refresh_ttl_seconds,
        clock,
    );

    let service = Arc::new(AuthService::new(
        Arc::new(PgUserDirectory::new(pool)),
        Arc::new(identity),
        TokenKind::new(access_codec, Arc::new(access_sessions)),
        TokenKind::new(refresh_codec, Arc::new(refresh_sessions)),
    ));

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });

    let result = tokio::try_join!(
        api::serve(
            service.clone(),
            args.port,
            request_timeout,
            wait_for(rx.clone())
        ),
        rpc::serve(service, args.grpc_port, request_timeout, wait_for(rx)),
    );

    info!("Gracefully shutdown");
    telemetry::shutdown_tracer();

    result.map(|_| ())
}
