use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::engine::{Engine, EngineConfig};

/// Initialize tracing controlled by `RUST_LOG`. Safe to call repeatedly —
/// only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Opens an engine with the default configuration.
pub fn open_default(dir: &Path) -> Engine {
    init_tracing();
    Engine::open(dir, EngineConfig::default()).expect("open engine")
}

/// A configuration that flushes after a few small writes and compacts
/// aggressively, so short tests exercise the full write path.
pub fn tiny_config() -> EngineConfig {
    EngineConfig {
        memtable_size_threshold: 64,
        size_ratio: 2,
        ..EngineConfig::default()
    }
}

/// Simulates a crash: the engine is abandoned without running `Drop`, so
/// nothing is flushed and the WAL keeps its records.
pub fn crash(engine: Engine) {
    std::mem::forget(engine);
}
