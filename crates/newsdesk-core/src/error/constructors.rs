//! Constructor methods for NewsdeskError

use super::types::NewsdeskError;

impl NewsdeskError {
    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: None,
            context: None,
        }
    }

    /// Create a transport error carrying an HTTP status
    pub fn transport_with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: Some(status),
            context: None,
        }
    }

    /// Create a transport error with context
    pub fn transport_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: None,
            context: Some(context.into()),
        }
    }

    /// Create a timeout error
    ///
    /// Timeouts carry status 408 so the retry layers classify them the same
    /// way the vendors' own request-timeout responses are classified.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code: Some(408),
            context: None,
        }
    }

    /// Create a new provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a provider error carrying an HTTP status
    pub fn provider_with_status(
        provider: impl Into<String>,
        message: impl Into<String>,
        status: u16,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code: Some(status),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a new decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new prompt error
    pub fn prompt(message: impl Into<String>) -> Self {
        Self::Prompt {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            context: None,
        }
    }

    /// Create a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}
