//! Venue WebSocket Authentication
//!
//! The venue expects authentication right after the socket opens.
//!
//! # Authentication Flow
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Receive `{"ev":"status","status":"connected"}`
//! 3. Send `{"action":"auth","params":"<API key>"}`
//! 4. Receive `auth_success`, or `auth_failed` / `auth_timeout` /
//!    `max_connections`

use thiserror::Error;

use super::messages::{ControlRequest, StatusKind, StatusMessage};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// API key missing or empty.
    #[error("missing API key")]
    MissingApiKey,

    /// Authentication failed (invalid credentials).
    #[error("authentication failed: invalid API key")]
    InvalidCredentials,

    /// Authentication not completed in time.
    #[error("authentication timeout")]
    Timeout,

    /// Connection limit exceeded.
    #[error("connection limit exceeded: too many concurrent connections")]
    ConnectionLimitExceeded,

    /// Unexpected error from the venue.
    #[error("server error: {0}")]
    ServerError(String),
}

// =============================================================================
// Authentication State
// =============================================================================

/// Current state of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Socket not yet acknowledged.
    #[default]
    Disconnected,

    /// Connected but not authenticated.
    Connected,

    /// Authentication request sent, awaiting response.
    Authenticating,

    /// Successfully authenticated.
    Authenticated,

    /// Authentication failed.
    Failed,
}

impl AuthState {
    /// Check if currently authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Check if ready to authenticate (connected but not yet authenticated).
    #[must_use]
    pub const fn can_authenticate(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Venue API credential.
///
/// `Debug` redacts the key for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingApiKey` if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self, AuthError> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(AuthError::MissingApiKey);
        }
        Ok(Self { api_key })
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Tracks the handshake for one socket.
///
/// A fresh handler is used for every connection attempt.
#[derive(Debug)]
pub struct AuthHandler {
    credentials: Credentials,
    state: AuthState,
}

impl AuthHandler {
    /// Create a new authentication handler.
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

    /// Create the authentication request and move to `Authenticating`.
    #[must_use]
    pub fn create_auth_request(&mut self) -> ControlRequest {
        self.state = AuthState::Authenticating;
        ControlRequest::auth(self.credentials.api_key())
    }

    /// Process a status message during the handshake.
    ///
    /// Returns `Ok(true)` once authenticated, `Ok(false)` if more messages
    /// are needed (check [`AuthState::can_authenticate`] to know when to
    /// send the request).
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` matching a rejection status.
    pub fn on_status(&mut self, msg: &StatusMessage) -> Result<bool, AuthError> {
        let outcome = match msg.kind() {
            StatusKind::Connected => {
                if self.state == AuthState::Disconnected {
                    self.state = AuthState::Connected;
                }
                return Ok(false);
            }
            StatusKind::AuthSuccess => {
                self.state = AuthState::Authenticated;
                return Ok(true);
            }
            StatusKind::AuthFailed => AuthError::InvalidCredentials,
            StatusKind::AuthTimeout => AuthError::Timeout,
            StatusKind::MaxConnections => AuthError::ConnectionLimitExceeded,
            StatusKind::Error(message) if !self.is_authenticated() => {
                AuthError::ServerError(message)
            }
            _ => return Ok(self.is_authenticated()),
        };
        self.state = AuthState::Failed;
        Err(outcome)
    }

    /// Reset to disconnected state.
    pub const fn reset(&mut self) {
        self.state = AuthState::Disconnected;
    }
}
