//! # Transaction status flags reported by a producer session.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Set of transaction flags (`IN_ERROR`, `FATAL_ERROR`, `ABORTABLE_ERROR`).
///
/// `FATAL_ERROR` and `ABORTABLE_ERROR` are always reported together with `IN_ERROR`
/// by well-behaved transports; the checks below do not rely on it.
///
/// ```
/// use txvisor::TxnStatus;
///
/// let status = TxnStatus::IN_ERROR | TxnStatus::ABORTABLE_ERROR;
/// assert!(status.is_abortable());
/// assert!(!status.is_fatal());
/// assert!(TxnStatus::READY.is_ready());
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TxnStatus(u8);

impl TxnStatus {
    /// No flag set.
    pub const READY: TxnStatus = TxnStatus(0);
    /// The current transaction hit an error.
    pub const IN_ERROR: TxnStatus = TxnStatus(1);
    /// The session cannot continue and must be recreated.
    pub const FATAL_ERROR: TxnStatus = TxnStatus(1 << 1);
    /// The current transaction can be aborted to recover.
    pub const ABORTABLE_ERROR: TxnStatus = TxnStatus(1 << 2);

    /// True if every flag of `other` is set in `self`.
    #[inline]
    pub fn contains(self, other: TxnStatus) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no flag is set.
    #[inline]
    pub fn is_ready(self) -> bool {
        self.0 == 0
    }

    /// True if any error flag is set.
    #[inline]
    pub fn is_in_error(self) -> bool {
        !self.is_ready()
    }

    #[inline]
    pub fn is_fatal(self) -> bool {
        self.contains(Self::FATAL_ERROR)
    }

    #[inline]
    pub fn is_abortable(self) -> bool {
        self.contains(Self::ABORTABLE_ERROR)
    }
}

impl BitOr for TxnStatus {
    type Output = TxnStatus;

    fn bitor(self, rhs: TxnStatus) -> TxnStatus {
        TxnStatus(self.0 | rhs.0)
    }
}

impl BitOrAssign for TxnStatus {
    fn bitor_assign(&mut self, rhs: TxnStatus) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ready() {
            return f.write_str("READY");
        }
        let names = [
            (Self::IN_ERROR, "IN_ERROR"),
            (Self::FATAL_ERROR, "FATAL_ERROR"),
            (Self::ABORTABLE_ERROR, "ABORTABLE_ERROR"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&set.join(" | "))
    }
}
