//! Brain size quota.
//!
//! A brain's size is the sum of the sizes of its distinct files. An upload is
//! rejected when it would push that sum past the limit. Callers that bring
//! their own embedding credential get the larger limit.

use std::fmt;

/// Size limits in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub max_brain_size: u64,
    pub max_brain_size_with_key: u64,
}

/// Rejection produced by [`QuotaPolicy::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub limit: u64,
    pub current: u64,
    pub incoming: u64,
    pub remaining: u64,
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Brain will exceed maximum capacity with this upload. Maximum file allowed is: {}",
            format_bytes(self.remaining)
        )
    }
}

impl std::error::Error for QuotaExceeded {}

impl QuotaPolicy {
    pub fn limit(&self, has_credential: bool) -> u64 {
        if has_credential {
            self.max_brain_size_with_key
        } else {
            self.max_brain_size
        }
    }

    /// Free space left in a brain currently holding `current` bytes.
    pub fn remaining(&self, current: u64, has_credential: bool) -> u64 {
        self.limit(has_credential).saturating_sub(current)
    }

    /// Reject when `current + incoming > limit`.
    pub fn check(
        &self,
        current: u64,
        incoming: u64,
        has_credential: bool,
    ) -> Result<(), QuotaExceeded> {
        let limit = self.limit(has_credential);
        if current.saturating_add(incoming) > limit {
            return Err(QuotaExceeded {
                limit,
                current,
                incoming,
                remaining: limit.saturating_sub(current),
            });
        }
        Ok(())
    }
}

/// Human-readable size with two decimals on a 1024 base: `"1.50 KB"`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> QuotaPolicy {
        QuotaPolicy {
            max_brain_size: 1000,
            max_brain_size_with_key: 5000,
        }
    }

    #[test]
    fn test_rejects_upload_past_limit() {
        let err = policy().check(800, 300, false).unwrap_err();
        assert_eq!(err.remaining, 200);
        assert!(err.to_string().contains("exceed maximum capacity"));
        assert!(err.to_string().contains("200.00 B"));
    }

    #[test]
    fn test_accepts_upload_within_limit() {
        assert!(policy().check(800, 150, false).is_ok());
        assert!(policy().check(800, 200, false).is_ok());
    }

    #[test]
    fn test_credential_raises_limit() {
        assert!(policy().check(800, 300, true).is_ok());
        assert_eq!(policy().remaining(800, true), 4200);
    }

    #[test]
    fn test_remaining_saturates_when_over() {
        assert_eq!(policy().remaining(1500, false), 0);
        let err = policy().check(1500, 1, false).unwrap_err();
        assert_eq!(err.remaining, 0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(52_428_800), "50.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
