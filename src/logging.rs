use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install a global fmt subscriber filtered by `config.log_filter`.
///
/// An unparseable filter falls back to `warn`. Returns false if a subscriber was
/// already set, so calling this more than once is harmless.
pub fn init(config: &Config) -> bool {
    let filter = match EnvFilter::try_new(&config.log_filter) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("invalid log filter '{}': {e}", config.log_filter);
            EnvFilter::new("warn")
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_refused() {
        let config = Config::default();
        init(&config);
        assert!(!init(&config));
    }
}
