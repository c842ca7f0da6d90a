//! Error policy bits and branch tags.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use tf_core::{Error, Result};

/// How [`Script::run_action`](crate::Script::run_action) treats a failing
/// action.
///
/// The empty policy fails fast and runs the rollback sequence. `CONTINUE`
/// suppresses the error and therefore also skips rollback. `LOG` reports
/// the error through the state's error logger without suppressing it.
/// `SKIP_ROLLBACK` returns the error without running rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Policy(u8);

impl Policy {
    pub const FAIL: Policy = Policy(0);
    pub const CONTINUE: Policy = Policy(1 << 1);
    pub const LOG: Policy = Policy(1 << 2);
    pub const SKIP_ROLLBACK: Policy = Policy(1 << 3);

    const KNOWN: u8 = Self::CONTINUE.0 | Self::LOG.0 | Self::SKIP_ROLLBACK.0;

    /// Build a policy from raw bits, rejecting bits that have no meaning.
    pub fn from_bits(bits: u8) -> Result<Policy> {
        let policy = Policy(bits);
        if !policy.is_known() {
            return Err(Error::config(format!("unknown policy: {bits:#04x}")));
        }
        Ok(policy)
    }

    /// Build a policy from raw bits without validating them.
    pub const fn from_bits_retain(bits: u8) -> Policy {
        Policy(bits)
    }

    /// Parse policy bit names as they appear in configuration files.
    pub fn from_names<I, S>(names: I) -> Result<Policy>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Policy::FAIL;
        for name in names {
            policy |= match name.as_ref() {
                "fail" => Policy::FAIL,
                "continue" => Policy::CONTINUE,
                "log" => Policy::LOG,
                "skip_rollback" => Policy::SKIP_ROLLBACK,
                other => return Err(Error::config(format!("unknown policy name {other:?}"))),
            };
        }
        Ok(policy)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Policy) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_known(self) -> bool {
        self.0 & !Self::KNOWN == 0
    }
}

impl BitOr for Policy {
    type Output = Policy;

    fn bitor(self, rhs: Policy) -> Policy {
        Policy(self.0 | rhs.0)
    }
}

impl BitOrAssign for Policy {
    fn bitor_assign(&mut self, rhs: Policy) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("fail");
        }
        if !self.is_known() {
            return write!(f, "{:#04x}", self.0);
        }
        let mut names = Vec::new();
        if self.contains(Policy::CONTINUE) {
            names.push("continue");
        }
        if self.contains(Policy::LOG) {
            names.push("log");
        }
        if self.contains(Policy::SKIP_ROLLBACK) {
            names.push("skip_rollback");
        }
        f.write_str(&names.join("|"))
    }
}

/// One-shot tag an action sets for [`switch`](crate::switch) to consume.
///
/// Values below [`Branch::CUSTOM`] are reserved for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Branch(pub i64);

impl Branch {
    pub const UNSET: Branch = Branch(0);
    pub const TRUE: Branch = Branch(1);
    pub const FALSE: Branch = Branch(2);
    pub const COMMIT: Branch = Branch(3);
    pub const ROLLBACK: Branch = Branch(4);

    /// The smallest value free for caller use.
    pub const CUSTOM: Branch = Branch(1024);

    /// A caller-defined branch, `offset` above [`Branch::CUSTOM`].
    ///
    /// Returns `None` when the offset is negative or overflows.
    pub const fn custom(offset: i64) -> Option<Branch> {
        if offset < 0 {
            return None;
        }
        match Self::CUSTOM.0.checked_add(offset) {
            Some(v) => Some(Branch(v)),
            None => None,
        }
    }

    pub const fn is_custom(self) -> bool {
        self.0 >= Self::CUSTOM.0
    }
}

impl From<bool> for Branch {
    fn from(b: bool) -> Self {
        if b {
            Branch::TRUE
        } else {
            Branch::FALSE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policy_is_fail_fast() {
        let p = Policy::default();
        assert_eq!(p, Policy::FAIL);
        assert!(!p.contains(Policy::CONTINUE));
        assert_eq!(p.to_string(), "fail");
    }

    #[test]
    fn bits_combine() {
        let p = Policy::CONTINUE | Policy::LOG;
        assert!(p.contains(Policy::CONTINUE));
        assert!(p.contains(Policy::LOG));
        assert!(!p.contains(Policy::SKIP_ROLLBACK));
        assert_eq!(p.to_string(), "continue|log");
    }

    #[test]
    fn unknown_bits_rejected() {
        assert!(Policy::from_bits(0x0e).is_ok());
        let err = Policy::from_bits(0x01).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!Policy::from_bits_retain(0x80).is_known());
    }

    #[test]
    fn names_parse() {
        let p = Policy::from_names(["log", "skip_rollback"]).unwrap();
        assert_eq!(p, Policy::LOG | Policy::SKIP_ROLLBACK);
        assert!(Policy::from_names(["loud"]).is_err());
    }

    #[test]
    fn custom_branches_start_at_threshold() {
        assert!(Branch::custom(0).unwrap().is_custom());
        assert_eq!(Branch::custom(1), Some(Branch(1025)));
    }

    #[test]
    fn custom_branch_offset_out_of_range() {
        assert_eq!(Branch::custom(i64::MAX), None);
        assert_eq!(Branch::custom(-1), None);
        assert!(!Branch::ROLLBACK.is_custom());
        assert_eq!(Branch::from(true), Branch::TRUE);
    }
}
