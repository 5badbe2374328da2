use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FOLIO_LOG";
const DEFAULT_FILTER: &str = "info";

/// Pick the filter directive: an explicit flag, then `FOLIO_LOG`, then the
/// configured setting, then `info`.
/// Blank candidates are skipped.
pub fn resolve_filter(flag: Option<&str>, env: Option<&str>, configured: Option<&str>) -> String {
    fn given(f: Option<&str>) -> Option<&str> {
        f.filter(|f| !f.trim().is_empty())
    }
    given(flag)
        .or_else(|| given(env))
        .or_else(|| given(configured))
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_env_beats_settings() {
        assert_eq!(resolve_filter(Some("trace"), Some("debug"), Some("warn")), "trace");
        assert_eq!(resolve_filter(None, Some("debug"), Some("warn")), "debug");
        assert_eq!(resolve_filter(None, None, Some("warn")), "warn");
        assert_eq!(resolve_filter(None, None, None), "info");
    }

    #[test]
    fn blank_candidates_fall_through() {
        assert_eq!(resolve_filter(None, Some(""), Some("warn")), "warn");
        assert_eq!(resolve_filter(Some("  "), Some("debug"), None), "debug");
        assert_eq!(resolve_filter(Some(""), Some(" "), Some("")), "info");
    }
}
