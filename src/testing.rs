use std::sync::Once;

static INIT: Once = Once::new();

/// Routes library logs to the captured test output. Safe to call from every
/// test; the subscriber is installed once per process.
pub(crate) fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "larkbot=debug".into()),
            )
            .with_test_writer()
            .init();
    });
}
