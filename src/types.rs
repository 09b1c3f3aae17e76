//! Core types for MiniKV
//!
//! Identifiers for sites, transactions, and variables, plus the placement
//! rules that decide which sites hold a copy of which variable.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{MiniKvError, Result};

/// Number of data sites in the system
pub const SITE_COUNT: u32 = 10;

/// Number of variables (x1..x20)
pub const VARIABLE_COUNT: u32 = 20;

/// Site identifier, 1..=10
pub type SiteId = u32;

/// Transaction identifier as written in scripts, e.g. "T1"
pub type TxnId = String;

/// Logical timestamp (the clock value)
pub type Timestamp = u64;

/// Variable identifier, `x1`..`x20`.
///
/// Even-indexed variables are replicated at every site; an odd-indexed
/// variable has a single copy at site `1 + (index mod 10)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(u32);

impl Serialize for VarId {
    /// Serialized by name (`"x7"`), matching the script syntax; this also
    /// makes dump snapshots render with readable JSON keys
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl VarId {
    /// Construct from a raw index. Returns `None` outside 1..=20.
    pub fn new(index: u32) -> Option<Self> {
        if (1..=VARIABLE_COUNT).contains(&index) {
            Some(VarId(index))
        } else {
            None
        }
    }

    /// Parse a script variable name such as `x7`
    pub fn parse(name: &str) -> Result<Self> {
        let index = name
            .strip_prefix('x')
            .and_then(|digits| digits.parse::<u32>().ok())
            .ok_or_else(|| MiniKvError::bad_variable(name))?;
        VarId::new(index).ok_or_else(|| MiniKvError::bad_variable(name))
    }

    /// The numeric index, 1..=20
    pub fn index(&self) -> u32 {
        self.0
    }

    /// Even-indexed variables have a copy at every site
    pub fn is_replicated(&self) -> bool {
        self.0 % 2 == 0
    }

    /// The sole home of an odd-indexed variable
    pub fn home_site(&self) -> SiteId {
        1 + (self.0 % SITE_COUNT)
    }

    /// All sites holding a copy of this variable, in ascending id order
    pub fn sites(&self) -> Vec<SiteId> {
        if self.is_replicated() {
            (1..=SITE_COUNT).collect()
        } else {
            vec![self.home_site()]
        }
    }

    /// Whether this variable is resident at the given site
    pub fn resides_at(&self, site: SiteId) -> bool {
        self.is_replicated() || self.home_site() == site
    }

    /// The value every copy starts with: `10 * index`
    pub fn initial_value(&self) -> i64 {
        10 * i64::from(self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_names() {
        for i in 1..=VARIABLE_COUNT {
            let var = VarId::parse(&format!("x{}", i)).unwrap();
            assert_eq!(var.index(), i);
            assert_eq!(var.to_string(), format!("x{}", i));
        }
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        for name in ["x0", "x21", "y3", "x", "3", "xx2", "x2x"] {
            assert!(VarId::parse(name).is_err(), "accepted {}", name);
        }
    }

    #[test]
    fn test_placement_rules() {
        let even = VarId::new(8).unwrap();
        assert!(even.is_replicated());
        assert_eq!(even.sites(), (1..=10).collect::<Vec<_>>());

        let odd = VarId::new(3).unwrap();
        assert!(!odd.is_replicated());
        assert_eq!(odd.home_site(), 4);
        assert_eq!(odd.sites(), vec![4]);
        assert!(odd.resides_at(4));
        assert!(!odd.resides_at(5));

        // x11 and x1 both live at site 2
        assert_eq!(VarId::new(11).unwrap().home_site(), 2);
        assert_eq!(VarId::new(1).unwrap().home_site(), 2);
    }

    #[test]
    fn test_initial_values() {
        assert_eq!(VarId::new(1).unwrap().initial_value(), 10);
        assert_eq!(VarId::new(20).unwrap().initial_value(), 200);
    }
}
