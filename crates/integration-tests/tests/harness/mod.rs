#![allow(dead_code)]

pub mod config;
pub mod mock_provider;

/// Route library logs to the test output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("prism_llm=debug"))
        .with_test_writer()
        .try_init();
}
