//! Status accessors and display helpers for NewsdeskError

use super::types::NewsdeskError;

impl NewsdeskError {
    /// HTTP status observed for this failure, when one exists.
    ///
    /// Transport and provider errors carry the vendor status; every other
    /// stage fails without one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transport { status_code, .. } => *status_code,
            Self::Provider { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Whether this failure stems from configuration and must never be retried.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Render the message with its status tag, matching the historical
    /// `[Code: N] message` form the UI layer displays in error blocks.
    pub fn display_with_code(&self) -> String {
        match self.status_code() {
            Some(code) => format!("[Code: {}] {}", code, self),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_preserved_on_transport_and_provider() {
        let t = NewsdeskError::transport_with_status("too many requests", 429);
        assert_eq!(t.status_code(), Some(429));

        let p = NewsdeskError::provider_with_status("google", "quota exhausted", 403);
        assert_eq!(p.status_code(), Some(403));

        let c = NewsdeskError::config("missing API key");
        assert_eq!(c.status_code(), None);
    }

    #[test]
    fn timeout_maps_to_408() {
        let e = NewsdeskError::timeout("request timed out after 60s");
        assert_eq!(e.status_code(), Some(408));
    }

    #[test]
    fn display_with_code_tags_status() {
        let e = NewsdeskError::transport_with_status("service unavailable", 503);
        let rendered = e.display_with_code();
        assert!(rendered.starts_with("[Code: 503]"));
        assert!(rendered.contains("service unavailable"));

        let plain = NewsdeskError::prompt("template not found");
        assert!(!plain.display_with_code().contains("[Code:"));
    }
}
