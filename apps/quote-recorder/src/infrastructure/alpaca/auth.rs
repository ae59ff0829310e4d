//! Alpaca WebSocket Authentication
//!
//! Alpaca requires authentication within 10 seconds of connection
//! establishment.
//!
//! # Authentication Flow
//!
//! 1. Connect to WebSocket endpoint
//! 2. Receive `{"T":"success","msg":"connected"}` from server
//! 3. Send `{"action":"auth","key":"...","secret":"..."}`
//! 4. Receive `{"T":"success","msg":"authenticated"}` or error
//!
//! # Error Codes
//!
//! - 401: Not authenticated
//! - 402: Authentication failed (invalid credentials)
//! - 403: Already authenticated
//! - 404: Authentication timeout (>10 seconds)
//! - 406: Connection limit exceeded
//!
//! # References
//!
//! - [Stock Streaming Auth](https://docs.alpaca.markets/docs/streaming-market-data)

use std::time::Duration;

use thiserror::Error;

use super::messages::{AuthRequest, ErrorMessage, SuccessKind, SuccessMessage};

/// Maximum time allowed for authentication after connection.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Visible prefix length when logging an API key.
const MASKED_KEY_PREFIX: usize = 5;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Not authenticated (must authenticate before subscribing).
    #[error("not authenticated: must authenticate before making requests")]
    NotAuthenticated,

    /// Authentication failed (invalid credentials).
    #[error("authentication failed: invalid API key or secret")]
    InvalidCredentials,

    /// Already authenticated.
    #[error("already authenticated: connection is already authenticated")]
    AlreadyAuthenticated,

    /// Authentication did not complete within [`AUTH_TIMEOUT`].
    #[error("authentication timeout: must authenticate within 10 seconds")]
    Timeout,

    /// Connection limit exceeded.
    #[error("connection limit exceeded: too many concurrent connections")]
    ConnectionLimitExceeded,

    /// Credentials were malformed or a message arrived out of order.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Any other server error.
    #[error("server error ({code}): {message}")]
    ServerError {
        /// Error code from server
        code: i32,
        /// Error message from server
        message: String,
    },
}

impl From<&ErrorMessage> for AuthError {
    fn from(err: &ErrorMessage) -> Self {
        match err.code {
            401 => Self::NotAuthenticated,
            402 => Self::InvalidCredentials,
            403 => Self::AlreadyAuthenticated,
            404 => Self::Timeout,
            406 => Self::ConnectionLimitExceeded,
            code => Self::ServerError {
                code,
                message: err.msg.clone(),
            },
        }
    }
}

// =============================================================================
// Authentication State
// =============================================================================

/// Current state of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Socket open, server greeting not yet seen.
    #[default]
    Disconnected,

    /// Greeting received, credentials not yet sent.
    Connected,

    /// Credentials sent, awaiting response.
    Authenticating,

    /// Successfully authenticated.
    Authenticated,

    /// Server rejected the session.
    Failed,
}

impl AuthState {
    /// Check if currently authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Connected but credentials not yet sent.
    #[must_use]
    pub const fn can_authenticate(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Alpaca API credentials.
///
/// `Debug` redacts the secret; use [`Credentials::masked_key`] for logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either key or secret is empty.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Result<Self, AuthError> {
        let key = key.into();
        let secret = secret.into();

        if key.trim().is_empty() {
            return Err(AuthError::InvalidMessage(
                "API key cannot be empty".to_string(),
            ));
        }
        if secret.trim().is_empty() {
            return Err(AuthError::InvalidMessage(
                "API secret cannot be empty".to_string(),
            ));
        }

        Ok(Self { key, secret })
    }

    /// First five characters of the key followed by `*****`.
    #[must_use]
    pub fn masked_key(&self) -> String {
        let prefix: String = self.key.chars().take(MASKED_KEY_PREFIX).collect();
        format!("{prefix}*****")
    }

    /// Build the market data authentication request.
    #[must_use]
    pub fn to_auth_request(&self) -> AuthRequest {
        AuthRequest::new(self.key.clone(), self.secret.clone())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.masked_key())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Authentication state machine for one market data connection.
#[derive(Debug)]
pub struct AuthHandler {
    credentials: Credentials,
    state: AuthState,
}

impl AuthHandler {
    /// Create a handler in the [`AuthState::Disconnected`] state.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Disconnected,
        }
    }

    /// Get the current authentication state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Check if currently authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    /// Produce the auth request and move to [`AuthState::Authenticating`].
    #[must_use]
    pub fn create_auth_request(&mut self) -> AuthRequest {
        self.state = AuthState::Authenticating;
        self.credentials.to_auth_request()
    }

    /// Process a success message from the server.
    ///
    /// Returns `Ok(true)` once authenticated and `Ok(false)` for the
    /// connection greeting, after which the caller sends credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidMessage`] for an `authenticated` message
    /// that arrives before credentials were sent.
    pub fn on_success(&mut self, msg: &SuccessMessage) -> Result<bool, AuthError> {
        match msg.msg {
            SuccessKind::Connected => {
                self.state = AuthState::Connected;
                Ok(false)
            }
            SuccessKind::Authenticated if self.state == AuthState::Authenticating => {
                self.state = AuthState::Authenticated;
                Ok(true)
            }
            SuccessKind::Authenticated => {
                self.state = AuthState::Failed;
                Err(AuthError::InvalidMessage(
                    "authenticated before credentials were sent".to_string(),
                ))
            }
        }
    }

    /// Process an error message from the server.
    pub fn on_error(&mut self, msg: &ErrorMessage) -> AuthError {
        self.state = AuthState::Failed;
        AuthError::from(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(kind: SuccessKind) -> SuccessMessage {
        SuccessMessage {
            msg_type: "success".to_string(),
            msg: kind,
        }
    }

    #[test]
    fn credentials_reject_blank_parts() {
        assert!(Credentials::new("", "secret").is_err());
        assert!(Credentials::new("key", "  ").is_err());
    }

    #[test]
    fn masked_key_shows_five_characters() {
        let creds = Credentials::new("PKABCDEFGHIJ", "s").unwrap();
        assert_eq!(creds.masked_key(), "PKABC*****");

        let short = Credentials::new("PK", "s").unwrap();
        assert_eq!(short.masked_key(), "PK*****");
    }

    #[test]
    fn debug_redacts_secret_and_key() {
        let creds = Credentials::new("PKABCDEFGHIJ", "super_secret").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("PKABC*****"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret"));
        assert!(!debug.contains("PKABCDEFGHIJ"));
    }

    #[test]
    fn handler_happy_path() {
        let mut handler = AuthHandler::new(Credentials::new("key", "secret").unwrap());
        assert_eq!(handler.state(), AuthState::Disconnected);

        assert!(!handler.on_success(&success(SuccessKind::Connected)).unwrap());
        assert!(handler.state().can_authenticate());

        let request = handler.create_auth_request();
        assert_eq!(request.key, "key");
        assert_eq!(handler.state(), AuthState::Authenticating);

        assert!(handler.on_success(&success(SuccessKind::Authenticated)).unwrap());
        assert!(handler.is_authenticated());
    }

    #[test]
    fn handler_rejects_premature_authenticated() {
        let mut handler = AuthHandler::new(Credentials::new("key", "secret").unwrap());
        assert!(handler.on_success(&success(SuccessKind::Authenticated)).is_err());
        assert_eq!(handler.state(), AuthState::Failed);
    }

    #[test]
    fn handler_maps_error_codes() {
        let mut handler = AuthHandler::new(Credentials::new("key", "secret").unwrap());
        let err = handler.on_error(&ErrorMessage {
            msg_type: "error".to_string(),
            code: 402,
            msg: "auth failed".to_string(),
        });
        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(handler.state(), AuthState::Failed);

        let other = AuthError::from(&ErrorMessage {
            msg_type: "error".to_string(),
            code: 500,
            msg: "internal error".to_string(),
        });
        assert!(matches!(other, AuthError::ServerError { code: 500, .. }));
    }
}
