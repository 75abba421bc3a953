//! Invariant ledger for contract tests
//!
//! Production code states its invariants with [`check_invariant!`]. Each check
//! is counted in a thread-local ledger so a contract test can prove that the
//! code path under test actually evaluated the invariants it depends on.
//!
//! ```rust,ignore
//! check_invariant!(max > min, CONTRAST_WINDOW_ORDERED, "ContrastModel::set_window");
//!
//! #[test]
//! fn contract_contrast_window() {
//!     livescope::invariants::assert_contract("auto scale", &[CONTRAST_WINDOW_ORDERED]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

/// Display maximum is strictly above the display minimum.
pub const CONTRAST_WINDOW_ORDERED: &str = "contrast window max exceeds min";
/// Both contrast bounds lie inside the sample range of the current frame.
pub const CONTRAST_WINDOW_IN_RANGE: &str = "contrast window within sample range";
/// Every pixel lands in exactly one histogram bin.
pub const HISTOGRAM_COUNTS_EVERY_PIXEL: &str = "histogram total equals pixel count";

thread_local! {
    static LEDGER: RefCell<HashMap<&'static str, usize>> = RefCell::new(HashMap::new());
}

/// Evaluate an invariant, record it in the ledger, panic if it does not hold.
#[macro_export]
macro_rules! check_invariant {
    ($condition:expr, $invariant:expr) => {
        $crate::invariants::record($condition, $invariant, None)
    };
    ($condition:expr, $invariant:expr, $context:expr) => {
        $crate::invariants::record($condition, $invariant, Some($context))
    };
}

#[doc(hidden)]
pub fn record(holds: bool, invariant: &'static str, context: Option<&str>) {
    LEDGER.with(|ledger| {
        *ledger.borrow_mut().entry(invariant).or_insert(0) += 1;
    });

    if !holds {
        panic!(
            "invariant violated in {}: {}",
            context.unwrap_or("<unknown>"),
            invariant
        );
    }
}

/// Number of times `invariant` was checked on this thread.
pub fn times_checked(invariant: &str) -> usize {
    LEDGER.with(|ledger| ledger.borrow().get(invariant).copied().unwrap_or(0))
}

/// Panic unless every listed invariant was checked at least once on this thread.
pub fn assert_contract(name: &str, required: &[&str]) {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|invariant| times_checked(invariant) == 0)
        .collect();

    if !missing.is_empty() {
        panic!(
            "contract '{}' never checked:\n  - {}",
            name,
            missing.join("\n  - ")
        );
    }
}

pub fn clear_ledger() {
    LEDGER.with(|ledger| ledger.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_counts_checks() {
        clear_ledger();
        check_invariant!(true, CONTRAST_WINDOW_ORDERED);
        check_invariant!(true, CONTRAST_WINDOW_ORDERED, "test");
        assert_eq!(times_checked(CONTRAST_WINDOW_ORDERED), 2);
        assert_contract("ordered", &[CONTRAST_WINDOW_ORDERED]);
    }

    #[test]
    #[should_panic(expected = "never checked")]
    fn test_missing_contract_panics() {
        clear_ledger();
        assert_contract("histogram", &[HISTOGRAM_COUNTS_EVERY_PIXEL]);
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn test_violation_panics() {
        check_invariant!(false, CONTRAST_WINDOW_IN_RANGE, "test");
    }
}
