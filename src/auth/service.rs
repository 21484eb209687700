//! The authentication flows, orchestrating store, hasher, and tokens.

use crate::account::{Account, CredentialStore, NewAccount, StoreError};
use crate::password::PasswordVerifier;
use crate::token::{TokenError, TokenKind, TokenPair, TokenService};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

/// Pragmatic email shape check: local part, `@`, domain with a TLD.
/// Deliberately not full RFC 5322; matches the envelope ordinary
/// addresses live in.
static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// Registration input. Field presence and blankness are the HTTP layer's
/// concern; this type carries what survived that check.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: String,
    pub last_name: String,
}

/// Why an auth flow failed. Display strings double as the user-facing
/// messages the HTTP layer sends.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Passwords don't match")]
    PasswordMismatch,
    #[error("Enter a valid email address.")]
    InvalidEmail,
    #[error("A user with that username already exists.")]
    DuplicateUsername,
    #[error("user with this email already exists.")]
    DuplicateEmail,
    /// Covers both unknown-username and wrong-password so responses never
    /// reveal which usernames exist.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User account is disabled")]
    AccountDisabled,
    /// A presented token failed validation; the variant says how.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// A valid token whose subject no longer resolves to an account.
    #[error("token subject no longer exists")]
    UnknownSubject,
    #[error("store failure: {0}")]
    Store(StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateUsername => AuthError::DuplicateUsername,
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            other => AuthError::Store(other),
        }
    }
}

/// Registration, login, refresh, and token-resolution flows over a
/// credential store, a password hasher, and the token service.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    passwords: PasswordVerifier,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        passwords: PasswordVerifier,
        tokens: TokenService,
    ) -> Self {
        Self {
            store,
            passwords,
            tokens,
        }
    }

    /// Register a new account and issue its first token pair.
    ///
    /// Validation order is fixed: password confirmation, then email shape,
    /// then the store's uniqueness checks inside the insert.
    pub async fn register(
        &self,
        registration: Registration,
        now: DateTime<Utc>,
    ) -> Result<(Account, TokenPair), AuthError> {
        if registration.password != registration.password_confirm {
            return Err(AuthError::PasswordMismatch);
        }
        if !EMAIL_SHAPE.is_match(&registration.email) {
            return Err(AuthError::InvalidEmail);
        }

        let password_hash = self.passwords.hash(&registration.password)?;
        let account = self
            .store
            .create(
                NewAccount {
                    username: registration.username,
                    email: registration.email,
                    password_hash,
                    first_name: registration.first_name,
                    last_name: registration.last_name,
                },
                now,
            )
            .await?;

        let pair = self.tokens.issue(&account.id, now);
        tracing::info!(username = %account.username, id = %account.id, "account registered");
        Ok((account, pair))
    }

    /// Authenticate a username/password pair, record the login instant,
    /// and issue a fresh token pair.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<(Account, TokenPair), AuthError> {
        let Some(account) = self.store.find_by_username(username).await? else {
            // Unknown user burns the same hashing work as a wrong password;
            // both paths report the same error.
            self.passwords.verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };

        if !self.passwords.verify(password, &account.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !account.is_active {
            return Err(AuthError::AccountDisabled);
        }

        self.store.touch_last_login(&account.id, now).await?;
        let pair = self.tokens.issue(&account.id, now);
        let account = Account {
            last_login: Some(now),
            updated_at: now,
            ..account
        };
        tracing::info!(username = %account.username, "login succeeded");
        Ok((account, pair))
    }

    /// Exchange a refresh token for a rotated pair. Stateless: the subject
    /// is not re-resolved here, the gate re-checks it on the next request.
    pub fn refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        Ok(self.tokens.refresh(refresh_token, now)?)
    }

    /// Resolve the account behind a bearer access token.
    ///
    /// Failures stay precise here (token sub-case, unknown subject,
    /// disabled account) so the boundary can log them before collapsing
    /// everything into one uniform rejection.
    pub async fn resolve_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        let claims = self.tokens.validate(token, now, TokenKind::Access)?;
        let Some(account) = self.store.find_by_id(&claims.sub).await? else {
            return Err(AuthError::UnknownSubject);
        };
        if !account.is_active {
            return Err(AuthError::AccountDisabled);
        }
        Ok(account)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
