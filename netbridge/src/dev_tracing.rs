//! Development helper: initialize a tracing subscriber when `RUST_LOG` is set.
//!
//! Tests, benches and the demo call `netbridge::dev_tracing::init_tracing()`
//! to get structured logs while debugging. The library itself never installs
//! a global subscriber.

/// No-op when `RUST_LOG` is not set or a global subscriber already exists.
pub fn init_tracing() {
    use std::env;

    if env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(false)
            .try_init();
    }
}
