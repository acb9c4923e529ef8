//! Executes a single test function and reports it through `klog`.
//!
//! A genuine panic-recovery path (longjmp back to the suite runner) needs
//! an architecture-specific unwind/setjmp trampoline that is out of scope
//! here (`spec.md` non-goals name the trampoline assembly as an external
//! seam); a failing assertion returns `TestResult::Fail` through ordinary
//! control flow instead of panicking, so this runner only needs to invoke
//! the test and log its outcome.

use super::TestResult;

pub fn run_single_test(name: &str, test_fn: impl FnOnce() -> TestResult) -> TestResult {
    let result = test_fn();
    match result {
        TestResult::Pass => crate::klog_debug!("  ok   {}", name),
        TestResult::Fail | TestResult::Panic => crate::klog_info!("  FAIL {}", name),
        TestResult::Skipped => crate::klog_debug!("  skip {}", name),
    }
    result
}
