//! Emergency pause
//!
//! Process-wide gate checked first by `initiate`, `attest` and
//! `claim_refund`. Configuration calls are not gated. Nothing is queued
//! while paused; callers retry after unpause.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Default)]
pub struct PauseController {
    paused: AtomicBool,
}

impl PauseController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the flag changed
    pub fn pause(&self) -> bool {
        !self.paused.swap(true, Ordering::SeqCst)
    }

    /// Returns `true` if the flag changed
    pub fn unpause(&self) -> bool {
        self.paused.swap(false, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn ensure_not_paused(&self) -> BridgeResult<()> {
        if self.is_paused() {
            return Err(BridgeError::Paused);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_toggle() {
        let pause = PauseController::new();
        assert!(!pause.is_paused());
        assert!(pause.ensure_not_paused().is_ok());

        assert!(pause.pause());
        assert!(!pause.pause());
        assert_eq!(pause.ensure_not_paused(), Err(BridgeError::Paused));

        assert!(pause.unpause());
        assert!(!pause.unpause());
        assert!(pause.ensure_not_paused().is_ok());
    }
}
