//! Structural self-checks for the lattice and partition types.
//!
//! Checks are always available through [`DebugInvariants::validate_invariants`];
//! the panicking assertion only fires in debug builds or with the
//! `check-invariants` feature.

use crate::lbm_error::LbmError;

pub trait DebugInvariants {
    /// Name used in the panic message.
    const CONTEXT: &'static str;

    /// Validate invariants and return the first violation found.
    fn validate_invariants(&self) -> Result<(), LbmError>;

    /// Panic on a violation when invariant checking is enabled.
    #[inline]
    fn debug_assert_invariants(&self) {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = self.validate_invariants() {
            log::error!("{} invariants violated: {e}", Self::CONTEXT);
            panic!("[invariants] {}: {e}", Self::CONTEXT);
        }
    }
}
