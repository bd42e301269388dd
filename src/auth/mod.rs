//! Authentication and session core.
//!
//! Components are assembled leaves-first: [`PasswordHasher`], two [`TokenCodec`]s
//! (access and refresh), two [`SessionStore`]s, an [`IdentityProvider`] and a
//! [`UserDirectory`] feed the [`AuthService`] orchestrator. The [`TokenVerifier`]
//! built from the access codec and access store backs both request authorizers.
//!
//! ## Session invariant
//!
//! For each principal at most one access identity and one refresh identity are
//! live. Issuing a token of a kind overwrites the previous identity of that kind;
//! a token is accepted only while its `jti` equals the recorded identity.

mod clock;
mod deadline;
mod error;
pub mod federated;
mod password;
mod service;
pub mod session;
mod token;
pub mod users;
mod utils;
mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use deadline::Deadline;
pub use error::AuthError;
pub use federated::{
    GoogleConfig, GoogleIdentity, IdentityProvider, OAuthError, Profile, ProviderToken,
};
pub use password::{PasswordError, PasswordHasher};
pub use service::{
    AccessToken, AuthService, DependencyStatus, FederatedSignin, PrincipalOrigin, TokenKind,
    TokenPair, UserSnapshot, TOKEN_TYPE_BEARER,
};
pub use session::{MemorySessionStore, RedisSessionStore, SessionError, SessionStore};
pub use token::{Claims, IssuedToken, TokenCodec, TokenError, CLOCK_SKEW_SECONDS};
pub use users::{
    DirectoryError, MemoryUserDirectory, NewPrincipal, PgUserDirectory, Principal, UserDirectory,
};
pub use verifier::{extract_bearer_token, PrincipalId, TokenVerifier, INVALID_TOKEN};
