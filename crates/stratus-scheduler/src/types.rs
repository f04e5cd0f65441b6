/// Result of checking one daemon against one template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    /// Daemon name
    pub daemon_name: String,
    /// Whether the daemon passed the filter
    pub passed: bool,
    /// Reason for failure (if any)
    pub reason: Option<String>,
}

impl FilterResult {
    /// Create a passing filter result
    pub fn pass(daemon_name: String) -> Self {
        Self {
            daemon_name,
            passed: true,
            reason: None,
        }
    }

    /// Create a failing filter result
    pub fn fail(daemon_name: String, reason: String) -> Self {
        Self {
            daemon_name,
            passed: false,
            reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_result() {
        let pass = FilterResult::pass("fluent-bit".to_string());
        assert!(pass.passed);
        assert!(pass.reason.is_none());

        let fail = FilterResult::fail("fluent-bit".to_string(), "Untolerated taint".to_string());
        assert!(!fail.passed);
        assert_eq!(fail.reason, Some("Untolerated taint".to_string()));
    }
}
