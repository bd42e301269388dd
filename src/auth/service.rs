use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, instrument};

use super::{
    utils::{normalize_email, valid_email},
    AuthError, DirectoryError, IdentityProvider, NewPrincipal, PasswordHasher, Principal,
    PrincipalId, SessionError, SessionStore, TokenCodec, TokenVerifier, UserDirectory,
};

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Codec and session store for one token kind.
#[derive(Clone)]
pub struct TokenKind {
    pub codec: TokenCodec,
    pub sessions: Arc<dyn SessionStore>,
}

impl TokenKind {
    #[must_use]
    pub fn new(codec: TokenCodec, sessions: Arc<dyn SessionStore>) -> Self {
        Self { codec, sessions }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Externally visible projection of a principal; never carries the hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Principal> for UserSnapshot {
    fn from(principal: Principal) -> Self {
        Self {
            id: principal.id,
            name: principal.name,
            email: principal.email,
            created_at: principal.created_at,
            updated_at: principal.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalOrigin {
    Existing,
    Created,
}

#[derive(Debug, Clone)]
pub struct FederatedSignin {
    pub tokens: TokenPair,
    pub origin: PrincipalOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyStatus {
    pub database: bool,
    pub session_store: bool,
}

impl DependencyStatus {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.database && self.session_store
    }
}

pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    identity: Arc<dyn IdentityProvider>,
    hasher: PasswordHasher,
    access: TokenKind,
    refresh: TokenKind,
}

impl AuthService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserDirectory>,
        identity: Arc<dyn IdentityProvider>,
        access: TokenKind,
        refresh: TokenKind,
    ) -> Self {
        Self {
            users,
            identity,
            hasher: PasswordHasher::default(),
            access,
            refresh,
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Verifier over the access codec and access session store.
    #[must_use]
    pub fn verifier(&self) -> TokenVerifier {
        TokenVerifier::new(self.access.codec.clone(), self.access.sessions.clone())
    }

    /// # Errors
    /// `InvalidArgument` for empty or malformed input, `DuplicateEmail` if taken.
    #[instrument(skip_all)]
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserSnapshot, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::invalid_argument("name is required"));
        }
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::invalid_argument("email is required"));
        }
        if password.is_empty() {
            return Err(AuthError::invalid_argument("password is required"));
        }
        if !valid_email(&email) {
            return Err(AuthError::invalid_argument("invalid email"));
        }

        let password_hash = self.hash_password(password).await?;
        let principal = self
            .users
            .create(NewPrincipal {
                name: name.to_string(),
                email,
                password_hash,
            })
            .await?;

        info!(principal = principal.id, "principal created");

        Ok(principal.into())
    }

    /// # Errors
    /// `AuthenticationFailed` for unknown emails and wrong passwords alike.
    #[instrument(skip_all)]
    pub async fn signin(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::invalid_argument("email is required"));
        }
        if password.is_empty() {
            return Err(AuthError::invalid_argument("password is required"));
        }

        let principal = match self.users.get_by_email(&email).await {
            Ok(principal) => principal,
            Err(err) => {
                if !matches!(err, DirectoryError::NotFound) {
                    error!("Failed to look up principal by email: {err}");
                }
                self.burn_verification(password).await;
                return Err(AuthError::AuthenticationFailed);
            }
        };

        // Federated-only principals have no hash; spend the same work anyway.
        if principal.password_hash.is_empty() {
            self.burn_verification(password).await;
            return Err(AuthError::AuthenticationFailed);
        }

        self.verify_password(password, &principal.password_hash)
            .await?;

        self.issue_pair(principal.id).await
    }

    /// Removes both session records. Missing records are not an error.
    ///
    /// # Errors
    /// `Internal` if a session store fails.
    #[instrument(skip(self))]
    pub async fn signout(&self, principal: PrincipalId) -> Result<(), AuthError> {
        let key = principal.0.to_string();
        let access = self.access.sessions.delete(&key).await;
        let refresh = self.refresh.sessions.delete(&key).await;

        for result in [access, refresh] {
            match result {
                Ok(()) | Err(SessionError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }
        }

        debug!(principal = principal.0, "sessions removed");

        Ok(())
    }

    /// Mint a new access token from a live refresh token. The refresh token
    /// itself is not rotated.
    ///
    /// # Errors
    /// `InvalidToken` if the refresh token is invalid or no longer recorded.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AccessToken, AuthError> {
        let claims = self.refresh.codec.validate(refresh_token)?;
        let id = claims.principal_id().ok_or(AuthError::InvalidToken)?;

        let live = match self.refresh.sessions.get(&claims.sub).await {
            Ok(live) => live,
            Err(SessionError::NotFound) => return Err(AuthError::InvalidToken),
            Err(err) => return Err(err.into()),
        };
        if !bool::from(live.as_bytes().ct_eq(claims.jti.as_bytes())) {
            return Err(AuthError::InvalidToken);
        }

        let access = self.access.codec.generate(id)?;
        self.access.sessions.set(&claims.sub, &access.id).await?;

        Ok(AccessToken {
            access_token: access.token,
            token_type: TOKEN_TYPE_BEARER,
            expires_in: self.access.codec.lifetime_seconds(),
        })
    }

    /// # Errors
    /// `NotFound` if the principal no longer exists.
    #[instrument(skip(self))]
    pub async fn get_signin_user(&self, principal: PrincipalId) -> Result<UserSnapshot, AuthError> {
        Ok(self.users.get_by_id(principal.0).await?.into())
    }

    #[must_use]
    pub fn google_login_url(&self) -> String {
        self.identity.login_url()
    }

    /// # Errors
    /// `InvalidState` on state mismatch, `ExchangeFailed`/`ProfileFetchFailed`
    /// when the provider fails.
    #[instrument(skip_all)]
    pub async fn google_login_callback(
        &self,
        state: &str,
        code: &str,
    ) -> Result<FederatedSignin, AuthError> {
        if !self.identity.check_state(state) {
            return Err(AuthError::InvalidState);
        }
        if code.is_empty() {
            return Err(AuthError::invalid_argument("code is required"));
        }

        let token = self.identity.exchange_code(code).await?;
        let profile = self.identity.fetch_profile(&token).await?;
        let email = normalize_email(&profile.email);

        let (principal, origin) = match self.users.get_by_email(&email).await {
            Ok(principal) => (principal, PrincipalOrigin::Existing),
            Err(DirectoryError::NotFound) => {
                let created = self
                    .users
                    .create(NewPrincipal {
                        name: profile.name,
                        email: email.clone(),
                        password_hash: String::new(),
                    })
                    .await;
                match created {
                    Ok(principal) => {
                        info!(principal = principal.id, "federated principal created");
                        (principal, PrincipalOrigin::Created)
                    }
                    // Lost a race with a concurrent first sign-in.
                    Err(DirectoryError::DuplicateEmail) => (
                        self.users.get_by_email(&email).await?,
                        PrincipalOrigin::Existing,
                    ),
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        };

        let tokens = self.issue_pair(principal.id).await?;

        Ok(FederatedSignin { tokens, origin })
    }

    pub async fn dependency_status(&self) -> DependencyStatus {
        let database = match self.users.ping().await {
            Ok(()) => true,
            Err(err) => {
                error!("Failed to ping user directory: {err}");
                false
            }
        };
        let session_store = match self.access.sessions.ping().await {
            Ok(()) => true,
            Err(err) => {
                error!("Failed to ping session store: {err}");
                false
            }
        };
        DependencyStatus {
            database,
            session_store,
        }
    }

    /// Access first, then refresh. A failure in between leaves a live access
    /// session; retrying sign-in overwrites both.
    async fn issue_pair(&self, id: u64) -> Result<TokenPair, AuthError> {
        let key = id.to_string();
        let access = self.access.codec.generate(id)?;
        let refresh = self.refresh.codec.generate(id)?;

        self.access.sessions.set(&key, &access.id).await?;
        self.refresh.sessions.set(&key, &refresh.id).await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: TOKEN_TYPE_BEARER,
            expires_in: self.access.codec.lifetime_seconds(),
        })
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(AuthError::internal)??;
        Ok(hash)
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<(), AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(AuthError::internal)??;
        Ok(())
    }

    async fn burn_verification(&self, password: &str) {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let _ = tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await;
    }
}
