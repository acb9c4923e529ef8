//! NIC driver coverage for the paths that do not require a mapped device:
//! `spec.md` §4.6's "no disk" style failure when no NIC has been attached.
//! Exercising `init` itself needs a real (or emulated) 82540EM MMIO BAR, so
//! that path is left to integration testing against actual hardware.

use chronos_abi::error::ChronosError;
use chronos_lib::testing::TestResult;
use chronos_lib::{assert_eq_test, define_test_suite, pass};

use crate::nic;

fn test_is_present_false_before_init() -> TestResult {
    assert_eq_test!(nic::is_present(), false);
    pass!()
}

fn test_net_transmit_fails_without_device() -> TestResult {
    let result = nic::net_transmit(&[0u8; 16]);
    assert_eq_test!(result.err(), Some(ChronosError::NoDisk));
    pass!()
}

fn test_net_receive_fails_without_device() -> TestResult {
    let mut buf = [0u8; 16];
    let result = nic::net_receive(&mut buf);
    assert_eq_test!(result.err(), Some(ChronosError::NoDisk));
    pass!()
}

fn test_mac_address_fails_without_device() -> TestResult {
    let result = nic::mac_address();
    assert_eq_test!(result.err(), Some(ChronosError::NoDisk));
    pass!()
}

define_test_suite!(
    nic,
    [
        test_is_present_false_before_init,
        test_net_transmit_fails_without_device,
        test_net_receive_fails_without_device,
        test_mac_address_fails_without_device,
    ]
);
