//! Tracing setup for the simulator.
//!
//! Tracing goes to stderr and is tuned with `RUST_LOG`. The diary and the
//! Timeline JSON export are written regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Week and action progress from this crate, warnings from dependencies.
pub const DEFAULT_FILTER: &str = "warn,sim=info";

/// `RUST_LOG` when set and parseable, otherwise [`DEFAULT_FILTER`].
pub fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the stderr subscriber. A second call is a no-op.
///
/// ```bash
/// RUST_LOG=sim::simulate=debug sim run --weeks 1 --offline
/// ```
pub fn init() {
    let directives = std::env::var("RUST_LOG").ok();
    let _ = tracing_subscriber::registry()
        .with(filter_from(directives.as_deref()))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_filter() {
        let default = EnvFilter::new(DEFAULT_FILTER).to_string();
        assert_eq!(filter_from(None).to_string(), default);
        assert_eq!(filter_from(Some("  ")).to_string(), default);
        assert_eq!(filter_from(Some("sim=notalevel")).to_string(), default);
        assert_eq!(
            filter_from(Some("sim=debug")).to_string(),
            EnvFilter::new("sim=debug").to_string()
        );
    }
}
