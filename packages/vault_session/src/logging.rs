use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialize logging once at process start.
///
/// Library events are emitted through `tracing`, which forwards them to the
/// `log` facade; `env_logger` prints them. Levels come from `RUST_LOG`, e.g.
/// `RUST_LOG=vault_session=debug`.
pub fn init() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_micros()
            .init();
        log::debug!("Structured logging initialized");
    });
}

/// Logging for tests; safe to call from every test
pub fn init_test() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}
