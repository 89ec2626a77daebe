//! RAII guard marking a connection unusable when a write is cut short.
//!
//! Futures can be dropped at any `.await` (a timeout, a `select!` losing
//! branch, a coordinator shutdown). A frame write dropped half-way leaves
//! the peer with a length prefix and part of a body; every later frame on
//! that stream would be misparsed. The guard sets the flag on creation and
//! only `disarm()` clears it, so an interrupted write leaves the connection
//! poisoned.
//!
//! ```rust
//! use netbridge_core::poison::PoisonGuard;
//!
//! let mut poisoned = false;
//! {
//!     let guard = PoisonGuard::new(&mut poisoned);
//!     // ... write the whole frame ...
//!     guard.disarm();
//! }
//! assert!(!poisoned);
//! ```
//!
//! A poisoned connection is never reset; it is closed and, on the worker
//! side, re-established.

pub struct PoisonGuard<'a> {
    flag: &'a mut bool,
}

impl<'a> PoisonGuard<'a> {
    /// Arm the guard. The flag reads `true` until [`disarm`](Self::disarm).
    #[inline]
    pub fn new(flag: &'a mut bool) -> Self {
        *flag = true;
        Self { flag }
    }

    /// Call only once the entire frame has been written.
    #[inline]
    pub fn disarm(self) {
        *self.flag = false;
    }
}
