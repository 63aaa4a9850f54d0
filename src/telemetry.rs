//! Tracing initialization. A single init path gated by the `json-logs`
//! feature (structured for production, human-readable for local runs) —
//! mirrors the teacher's pattern of one feature-gated logging backend
//! rather than per-call format branching.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(feature = "json-logs")]
    {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    }
    #[cfg(not(feature = "json-logs"))]
    {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
