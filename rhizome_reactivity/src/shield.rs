use std::panic::{AssertUnwindSafe, catch_unwind};

/// Runs a user-supplied callback, containing any panic it raises.
///
/// Every callback site in the engine goes through here: one faulting
/// subscriber must not abort the listeners queued after it, and must not
/// leave a mutation half-applied. The fault is reported and the caller
/// continues with the remaining work.
pub fn shielded<R>(label: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => Some(r),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(target: "rhizome", callback = label, panic = %msg, "callback fault contained");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shielded_passes_value_through() {
        assert_eq!(shielded("ok", || 7), Some(7));
    }

    #[test]
    fn test_shielded_contains_panic() {
        let hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        let out = shielded("boom", || -> i32 { panic!("expected") });
        std::panic::set_hook(hook);
        assert_eq!(out, None);
    }
}
