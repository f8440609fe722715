// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a caller and a running detector.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::CancelToken;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn cancel_is_visible_across_threads() {
        let token = Arc::new(CancelToken::new());
        assert!(!token.is_cancelled());

        let remote = Arc::clone(&token);
        thread::spawn(move || remote.cancel())
            .join()
            .expect("cancel thread should join");
        assert!(token.is_cancelled());
    }
}
