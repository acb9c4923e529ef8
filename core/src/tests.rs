//! Coverage for the environment table and the rendezvous IPC primitives
//! built on it, in the style of `chronos_mm::tests`: plain functions
//! driving the real allocator (no mocks), collected into suites with
//! `define_test_suite!`.

use chronos_abi::env::{EnvId, EnvStatus, EnvType, PteFlags};
use chronos_abi::error::ChronosError;
use chronos_abi::syscall::{SyscallArgs, SYS_PAGE_ALLOC};
use chronos_lib::testing::TestResult;
use chronos_lib::{assert_eq_test, assert_ok, assert_test, define_test_suite, pass};

use crate::env;
use crate::ipc;
use crate::syscall::syscall_dispatch;

fn test_env_alloc_assigns_distinct_ids() -> TestResult {
    let a = assert_ok!(env::env_alloc(0, EnvType::User));
    let b = assert_ok!(env::env_alloc(0, EnvType::User));
    assert_test!(a != b);
    env::env_destroy(a);
    env::env_destroy(b);
    pass!()
}

fn test_env_alloc_sets_parent_and_status() -> TestResult {
    let parent = assert_ok!(env::env_alloc(0, EnvType::User));
    let child = assert_ok!(env::env_alloc(parent, EnvType::User));
    env::with_env(child, |e| {
        assert_eq_test!(e.parent_id, parent);
        assert_eq_test!(e.status, EnvStatus::NotRunnable);
        pass!()
    });
    env::env_destroy(child);
    env::env_destroy(parent);
    pass!()
}

fn test_env_destroy_frees_slot_for_reuse() -> TestResult {
    let a = assert_ok!(env::env_alloc(0, EnvType::User));
    env::env_destroy(a);
    env::with_env(a, |e| {
        assert_eq_test!(e.status, EnvStatus::Free);
        pass!()
    });
    pass!()
}

fn test_env_set_status_rejects_dying_and_free() -> TestResult {
    let a = assert_ok!(env::env_alloc(0, EnvType::User));
    assert_test!(env::env_set_status(a, EnvStatus::Dying).is_err());
    assert_test!(env::env_set_status(a, EnvStatus::Free).is_err());
    assert_ok!(env::env_set_status(a, EnvStatus::Runnable));
    env::env_destroy(a);
    pass!()
}

fn test_envid2env_rejects_stale_generation() -> TestResult {
    let a = assert_ok!(env::env_alloc(0, EnvType::User));
    env::env_destroy(a);
    let result = env::envid2env(a, false);
    assert_eq_test!(result.err(), Some(ChronosError::BadEnv));
    pass!()
}

fn test_envid2env_checkperm_requires_parent() -> TestResult {
    let parent = assert_ok!(env::env_alloc(0, EnvType::User));
    let other = assert_ok!(env::env_alloc(0, EnvType::User));
    env::set_current_envid(Some(other));
    let result = env::envid2env(parent, true);
    assert_eq_test!(result.err(), Some(ChronosError::BadEnv));
    env::set_current_envid(None);
    env::env_destroy(parent);
    env::env_destroy(other);
    pass!()
}

fn test_ipc_try_send_fails_when_receiver_not_waiting() -> TestResult {
    let sender = assert_ok!(env::env_alloc(0, EnvType::User));
    let receiver = assert_ok!(env::env_alloc(0, EnvType::User));
    let result = ipc::ipc_try_send(sender, receiver, 42, 0, PteFlags::empty());
    assert_eq_test!(result.err(), Some(ChronosError::IpcNotRecv));
    env::env_destroy(sender);
    env::env_destroy(receiver);
    pass!()
}

fn test_ipc_recv_then_send_delivers_value() -> TestResult {
    let sender = assert_ok!(env::env_alloc(0, EnvType::User));
    let receiver = assert_ok!(env::env_alloc(0, EnvType::User));

    ipc::ipc_recv(receiver, 0, 0);
    env::with_env(receiver, |e| {
        assert_test!(e.ipc_recving);
        pass!()
    });

    assert_ok!(ipc::ipc_try_send(sender, receiver, 99, 0, PteFlags::empty()));
    env::with_env(receiver, |e| {
        assert_test!(!e.ipc_recving);
        assert_eq_test!(e.ipc_from, sender);
        assert_eq_test!(e.ipc_value, 99);
        assert_eq_test!(e.status, EnvStatus::Runnable);
        pass!()
    });

    env::env_destroy(sender);
    env::env_destroy(receiver);
    pass!()
}

fn test_ipc_recv_honors_from_filter() -> TestResult {
    let wanted: EnvId = assert_ok!(env::env_alloc(0, EnvType::User));
    let unwanted = assert_ok!(env::env_alloc(0, EnvType::User));
    let receiver = assert_ok!(env::env_alloc(0, EnvType::User));

    ipc::ipc_recv(receiver, 0, wanted);
    let result = ipc::ipc_try_send(unwanted, receiver, 1, 0, PteFlags::empty());
    assert_eq_test!(result.err(), Some(ChronosError::IpcNotRecv));

    assert_ok!(ipc::ipc_try_send(wanted, receiver, 7, 0, PteFlags::empty()));
    env::with_env(receiver, |e| {
        assert_eq_test!(e.ipc_from, wanted);
        pass!()
    });

    env::env_destroy(wanted);
    env::env_destroy(unwanted);
    env::env_destroy(receiver);
    pass!()
}

fn test_page_alloc_rejects_disallowed_perm_bits() -> TestResult {
    let caller = assert_ok!(env::env_alloc(0, EnvType::User));
    env::set_current_envid(Some(caller));

    // Bit 7 is outside PteFlags::SYSCALL (PRESENT|WRITABLE|USER|COW|SHARED).
    let args = SyscallArgs {
        num: SYS_PAGE_ALLOC as u32,
        a1: caller,
        a2: 0x1000,
        a3: 1 << 7,
        a4: 0,
        a5: 0,
    };
    let result = syscall_dispatch(args);
    assert_eq_test!(result, ChronosError::Inval.code());

    env::set_current_envid(None);
    env::env_destroy(caller);
    pass!()
}

define_test_suite!(
    env,
    [
        test_env_alloc_assigns_distinct_ids,
        test_env_alloc_sets_parent_and_status,
        test_env_destroy_frees_slot_for_reuse,
        test_env_set_status_rejects_dying_and_free,
        test_envid2env_rejects_stale_generation,
        test_envid2env_checkperm_requires_parent,
        test_page_alloc_rejects_disallowed_perm_bits,
    ]
);

define_test_suite!(
    ipc,
    [
        test_ipc_try_send_fails_when_receiver_not_waiting,
        test_ipc_recv_then_send_delivers_value,
        test_ipc_recv_honors_from_filter,
    ]
);
