//! Process-wide installation.
//!
//! Call sites that cannot be handed an interceptor explicitly can look one up
//! here. Installation happens at most once per process; later attempts fail
//! and leave the registered interceptor in place, so wrapping never stacks.

use std::sync::OnceLock;

use crate::error::InterceptError;
use crate::interceptor::Interceptor;

static INSTALLED: OnceLock<Interceptor> = OnceLock::new();

/// Register `interceptor` for the whole process.
pub fn install(interceptor: Interceptor) -> Result<&'static Interceptor, InterceptError> {
    let mut fresh = false;
    let installed = INSTALLED.get_or_init(|| {
        fresh = true;
        interceptor
    });
    if fresh {
        Ok(installed)
    } else {
        Err(InterceptError::AlreadyInstalled {
            relay_base: installed.relay_base().to_string(),
        })
    }
}

/// The process-wide interceptor, if one was installed.
pub fn installed() -> Option<&'static Interceptor> {
    INSTALLED.get()
}
