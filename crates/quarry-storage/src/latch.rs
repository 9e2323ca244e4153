use std::sync::atomic::{AtomicU32, Ordering};

/// A lightweight reader-writer spinlock using a single `AtomicU32`.
///
/// Encoding:
/// - `0` = unlocked
/// - `u32::MAX` = write-locked
/// - `1..u32::MAX-1` = number of concurrent readers
///
/// Page latches are held for short, bounded critical sections (a scan of one
/// page), so spinning beats parking.
pub struct RwLatch {
    state: AtomicU32,
}

const UNLOCKED: u32 = 0;
const WRITE_LOCKED: u32 = u32::MAX;

impl RwLatch {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
        }
    }

    /// Acquire shared (read) access. Spins until successful.
    pub fn lock_shared(&self) {
        loop {
            let current = self.state.load(Ordering::Relaxed);
            if current == WRITE_LOCKED {
                std::hint::spin_loop();
                continue;
            }
            if self
                .state
                .compare_exchange_weak(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            std::hint::spin_loop();
        }
    }

    /// Try to acquire shared access. Returns true on success.
    pub fn try_lock_shared(&self) -> bool {
        let current = self.state.load(Ordering::Relaxed);
        if current == WRITE_LOCKED {
            return false;
        }
        self.state
            .compare_exchange_weak(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release shared access.
    pub fn unlock_shared(&self) {
        let prev = self.state.fetch_sub(1, Ordering::Release);
        debug_assert!(prev != UNLOCKED && prev != WRITE_LOCKED);
    }

    /// Acquire exclusive (write) access. Spins until successful.
    pub fn lock_exclusive(&self) {
        loop {
            if self
                .state
                .compare_exchange_weak(UNLOCKED, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            std::hint::spin_loop();
        }
    }

    /// Try to acquire exclusive access. Returns true on success.
    pub fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release exclusive access.
    pub fn unlock_exclusive(&self) {
        let prev = self.state.swap(UNLOCKED, Ordering::Release);
        debug_assert_eq!(prev, WRITE_LOCKED);
    }

    /// Check if the latch is currently write-locked.
    pub fn is_write_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == WRITE_LOCKED
    }

    /// Check if the latch is unlocked (no readers or writers).
    pub fn is_unlocked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == UNLOCKED
    }

    /// Get the number of current readers (0 if unlocked or write-locked).
    pub fn reader_count(&self) -> u32 {
        let s = self.state.load(Ordering::Relaxed);
        if s == WRITE_LOCKED { 0 } else { s }
    }
}

impl Default for RwLatch {
    fn default() -> Self {
        Self::new()
    }
}
