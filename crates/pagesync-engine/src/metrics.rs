//! Metric names recorded by the engine.

/// Inbound messages dispatched past the auth gate (counter, labels: kind).
pub const DISPATCH_TOTAL: &str = "pagesync_dispatch_total";
/// Handler failures converted into resets (counter, labels: error_type).
pub const HANDLER_FAILURES_TOTAL: &str = "pagesync_handler_failures_total";
/// Reset signals emitted, both keep=false leaves and failure resets (counter, labels: cause).
pub const RESETS_TOTAL: &str = "pagesync_resets_total";
/// Auth handshakes (counter, labels: result).
pub const AUTH_TOTAL: &str = "pagesync_auth_total";
/// Page traffic dropped because the session is not verified (counter).
pub const UNAUTHORIZED_DROPPED_TOTAL: &str = "pagesync_unauthorized_dropped_total";
/// Commits issued (counter, labels: scope).
pub const COMMITS_TOTAL: &str = "pagesync_commits_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_snake_case() {
        for name in [
            DISPATCH_TOTAL,
            HANDLER_FAILURES_TOTAL,
            RESETS_TOTAL,
            AUTH_TOTAL,
            UNAUTHORIZED_DROPPED_TOTAL,
            COMMITS_TOTAL,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
