//! Tracing setup for hosts embedding the provisioner
//!
//! `RUST_LOG` controls verbosity (default `info`). Only output key names are
//! ever logged; values of secret outputs and secret parameters never are.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber
///
/// Returns false if a global subscriber was already set (e.g. by the host).
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_refused() {
        init_tracing();
        assert!(!init_tracing());
    }
}
