use once_cell::sync::OnceCell;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;

// Keep the non-blocking worker guard alive for the entire process lifetime
pub static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
pub static INIT_ONCE: Once = Once::new();
pub static INIT_ERROR: OnceCell<String> = OnceCell::new();

// Mirrors the debug helper entity, refreshed at the start of every cycle
static DETAIL_AT_INFO: AtomicBool = AtomicBool::new(false);

pub fn set_detail_promoted(promoted: bool) {
    DETAIL_AT_INFO.store(promoted, Ordering::Relaxed);
}

pub fn detail_promoted() -> bool {
    DETAIL_AT_INFO.load(Ordering::Relaxed)
}
