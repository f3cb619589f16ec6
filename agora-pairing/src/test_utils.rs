// SPDX-License-Identifier: MIT OR Apache-2.0

/// Install a tracing subscriber when `RUST_LOG` is set, for example `RUST_LOG=agora_pairing=debug`.
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}
