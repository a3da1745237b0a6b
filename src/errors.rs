// =============================================================================
// Error taxonomy — classifies venue/IO failures into retry policy buckets
// =============================================================================
//
// Numeric codes mirror the error-code table carried over from the original
// grid engine's constants module, kept here only for log correlation — they
// are not HTTP status codes and nothing in this crate serves HTTP.
// =============================================================================

use std::fmt;

/// Coarse classification of a failure, independent of which venue produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// DNS, connection reset, generic timeout. Always retryable.
    Network,
    /// Venue asked us to slow down. Retry after an extended delay.
    RateLimit,
    /// Venue flagged abusive request volume. Retry after a long delay.
    DdosProtection,
    /// Bad credentials or revoked permissions. Never retry.
    Authentication,
    /// Wallet does not have enough margin for this specific order.
    InsufficientFunds,
    /// Order parameters rejected by the venue (size, price, notional).
    InvalidOrder,
    /// Cancel target no longer exists — treated as a successful cancel.
    OrderNotFound,
    /// Symbol or global settings fail validation before any order is placed.
    ConfigurationInvalid,
    /// Not enough history to compute an indicator or score.
    DataInsufficient,
    /// Venue is down for maintenance or otherwise unavailable.
    ExchangeUnavailable,
    /// Anything else; treated conservatively as non-retryable.
    Internal,
}

impl ErrorKind {
    /// Legacy numeric code, kept for log correlation with the original engine.
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::Network => 1001,
            ErrorKind::RateLimit => 4001,
            ErrorKind::DdosProtection => 4002,
            ErrorKind::Authentication => 2001,
            ErrorKind::InsufficientFunds => 3001,
            ErrorKind::InvalidOrder => 3002,
            ErrorKind::OrderNotFound => 3003,
            ErrorKind::ConfigurationInvalid => 5003,
            ErrorKind::DataInsufficient => 5003,
            ErrorKind::ExchangeUnavailable => 5001,
            ErrorKind::Internal => 5003,
        }
    }

    /// Whether a call that failed this way should be retried at all.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::RateLimit
                | ErrorKind::DdosProtection
                | ErrorKind::ExchangeUnavailable
        )
    }

    /// Minimum delay before the next attempt, layered on top of the
    /// centralized backoff schedule in [`crate::retry`].
    pub fn min_retry_delay(self) -> std::time::Duration {
        use std::time::Duration;
        match self {
            ErrorKind::RateLimit => Duration::from_secs(60),
            ErrorKind::DdosProtection => Duration::from_secs(120),
            _ => Duration::ZERO,
        }
    }

    /// Whether this failure should halt the owning symbol loop entirely
    /// rather than simply skipping the one order.
    pub fn is_terminal_for_symbol(self) -> bool {
        matches!(
            self,
            ErrorKind::Authentication | ErrorKind::ConfigurationInvalid
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "Network",
            ErrorKind::RateLimit => "RateLimit",
            ErrorKind::DdosProtection => "DdosProtection",
            ErrorKind::Authentication => "Authentication",
            ErrorKind::InsufficientFunds => "InsufficientFunds",
            ErrorKind::InvalidOrder => "InvalidOrder",
            ErrorKind::OrderNotFound => "OrderNotFound",
            ErrorKind::ConfigurationInvalid => "ConfigurationInvalid",
            ErrorKind::DataInsufficient => "DataInsufficient",
            ErrorKind::ExchangeUnavailable => "ExchangeUnavailable",
            ErrorKind::Internal => "Internal",
        };
        write!(f, "{name}({})", self.code())
    }
}

/// A classified failure carrying enough context to log and act on without
/// re-parsing a venue error string at every call site.
#[derive(Debug, Clone)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub symbol: Option<String>,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            symbol: None,
            message: message.into(),
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Classify a raw HTTP status + venue message into an [`ErrorKind`].
    /// Deliberately conservative: unknown statuses fall back to `Internal`
    /// (non-retryable) rather than risk looping on a failure we don't
    /// understand.
    pub fn classify(status: u16, body: &str) -> ErrorKind {
        let lower = body.to_lowercase();
        match status {
            401 | 403 => ErrorKind::Authentication,
            429 => ErrorKind::RateLimit,
            418 => ErrorKind::DdosProtection,
            404 if lower.contains("order") => ErrorKind::OrderNotFound,
            503 | 502 | 504 => ErrorKind::ExchangeUnavailable,
            400 if lower.contains("insufficient") || lower.contains("margin") => {
                ErrorKind::InsufficientFunds
            }
            400 if lower.contains("notional") || lower.contains("invalid") => {
                ErrorKind::InvalidOrder
            }
            _ if lower.contains("timeout") || lower.contains("connection") => ErrorKind::Network,
            _ => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(s) => write!(f, "[{s}] {}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for EngineError {}

/// Process exit codes, per the external interface contract.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const CONFIGURATION_INVALID: i32 = 2;
    pub const AUTHENTICATION_FAILURE: i32 = 3;
    pub const UNRECOVERABLE_VENUE_ERROR: i32 = 4;
    pub const USER_SHUTDOWN: i32 = 130;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_retryable_with_extended_delay() {
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::RateLimit.min_retry_delay() >= std::time::Duration::from_secs(60));
    }

    #[test]
    fn auth_is_terminal_and_not_retryable() {
        assert!(!ErrorKind::Authentication.is_retryable());
        assert!(ErrorKind::Authentication.is_terminal_for_symbol());
    }

    #[test]
    fn classify_429_as_rate_limit() {
        assert_eq!(EngineError::classify(429, ""), ErrorKind::RateLimit);
    }

    #[test]
    fn classify_unknown_as_internal_not_retryable() {
        let kind = EngineError::classify(599, "mystery failure");
        assert_eq!(kind, ErrorKind::Internal);
        assert!(!kind.is_retryable());
    }
}
