//! Interrupt handling: SIGINT/SIGTERM stop the run between candidates.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use crate::core::errors::{ReclaimError, Result};

/// Exit status used when a second signal forces an immediate stop.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Register SIGINT and SIGTERM against a shared flag.
///
/// The first signal only sets the flag; the deletion in flight completes and
/// the loop stops before the next candidate. A second signal while the flag is
/// set terminates the process.
pub fn install_interrupt_flag() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        // Order matters: the shutdown check must see the flag before it is set.
        flag::register_conditional_shutdown(signal, FORCED_EXIT_CODE, Arc::clone(&interrupted))
            .and_then(|_| flag::register(signal, Arc::clone(&interrupted)))
            .map_err(|e| ReclaimError::Runtime {
                details: format!("failed to register handler for signal {signal}: {e}"),
            })?;
    }
    Ok(interrupted)
}
