//! subnet-sync: convergence engine for subnet sub-resources.
//!
//! Diffs a subnet's desired route table associations and tags against the
//! latest observed state and applies the minimal set of provider calls.

pub mod api;
pub mod diff;
pub mod reconciler;
pub mod test_util;
pub mod types;
