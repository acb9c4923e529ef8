//! Per-CPU bookkeeping.
//!
//! A single-CPU teaching kernel has exactly one "CPU": the BSP, always
//! index 0. This module keeps the teacher's per-CPU accounting API (so
//! callers don't special-case the CPU count) but drops the GS-base
//! resident PCR and the AP bring-up path entirely — there is nothing to
//! bring up.

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};

use crate::InitFlag;

/// Upper bound on CPU count. Single-CPU Non-goal: always exactly 1 online.
pub const MAX_CPUS: usize = 1;

const PERCPU_INIT_MAGIC: u64 = 0x5350_4350_5543_5055;

#[repr(C, align(64))]
pub struct PerCpuData {
    pub cpu_id: u32,
    pub apic_id: u32,
    pub init_magic: u64,
    pub current_task: AtomicPtr<()>,
    pub kernel_stack_top: AtomicU64,
    pub preempt_count: AtomicU32,
    pub in_interrupt: AtomicBool,
    pub scheduler: AtomicPtr<()>,
    pub online: AtomicBool,
    pub context_switches: AtomicU64,
    pub interrupt_count: AtomicU64,
    pub syscall_pid: AtomicU32,
}

impl PerCpuData {
    pub const fn new() -> Self {
        Self {
            cpu_id: 0,
            apic_id: 0,
            init_magic: 0,
            current_task: AtomicPtr::new(ptr::null_mut()),
            kernel_stack_top: AtomicU64::new(0),
            preempt_count: AtomicU32::new(0),
            in_interrupt: AtomicBool::new(false),
            scheduler: AtomicPtr::new(ptr::null_mut()),
            online: AtomicBool::new(false),
            context_switches: AtomicU64::new(0),
            interrupt_count: AtomicU64::new(0),
            syscall_pid: AtomicU32::new(u32::MAX),
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.init_magic == PERCPU_INIT_MAGIC
    }

    pub fn mark_initialized(&mut self) {
        self.init_magic = PERCPU_INIT_MAGIC;
    }
}

// SAFETY: all mutable fields are atomics; the struct is only ever touched
// by the single CPU that owns it.
unsafe impl Send for PerCpuData {}
unsafe impl Sync for PerCpuData {}

static BSP_DATA: PerCpuData = PerCpuData::new();
static BSP_APIC_ID: AtomicU32 = AtomicU32::new(0);
static BSP_ONLINE: AtomicBool = AtomicBool::new(false);
static BSP_INIT: InitFlag = InitFlag::new();

/// Record the BSP's APIC ID and mark it online. A no-op after the first
/// call.
pub fn init_bsp(apic_id: u32) {
    if !BSP_INIT.init_once() {
        return;
    }
    BSP_APIC_ID.store(apic_id, Ordering::Release);
    BSP_ONLINE.store(true, Ordering::Release);
}

#[inline]
pub fn get_current_cpu() -> usize {
    0
}

#[inline]
pub fn cpu_index_from_apic_id(apic_id: u32) -> Option<usize> {
    if apic_id == BSP_APIC_ID.load(Ordering::Acquire) {
        Some(0)
    } else {
        None
    }
}

#[inline]
pub fn apic_id_from_cpu_index(cpu_id: usize) -> Option<u32> {
    if cpu_id == 0 {
        Some(BSP_APIC_ID.load(Ordering::Acquire))
    } else {
        None
    }
}

#[inline]
pub fn get_percpu_data() -> &'static PerCpuData {
    &BSP_DATA
}

#[inline]
pub fn get_cpu_count() -> usize {
    1
}

#[inline]
pub fn get_online_cpu_count() -> usize {
    if BSP_ONLINE.load(Ordering::Acquire) { 1 } else { 0 }
}

pub fn mark_cpu_online(cpu_id: usize) {
    if cpu_id == 0 {
        BSP_ONLINE.store(true, Ordering::Release);
    }
}

pub fn mark_cpu_offline(cpu_id: usize) {
    if cpu_id == 0 {
        BSP_ONLINE.store(false, Ordering::Release);
    }
}

#[inline]
pub fn is_cpu_online(cpu_id: usize) -> bool {
    cpu_id == 0 && BSP_ONLINE.load(Ordering::Acquire)
}

#[inline]
pub fn get_bsp_apic_id() -> u32 {
    BSP_APIC_ID.load(Ordering::Acquire)
}

#[inline]
pub fn is_bsp() -> bool {
    true
}

static LAPIC_ID_FN: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

/// Register the LAPIC ID reader from the APIC driver. Kept for driver
/// parity even though `is_bsp`/`get_current_cpu` never consult it.
pub fn register_lapic_id_fn(f: fn() -> u32) {
    LAPIC_ID_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
pub fn set_current_task(task: *mut ()) {
    BSP_DATA.current_task.store(task, Ordering::Release);
}

#[inline]
pub fn get_current_task() -> *mut () {
    BSP_DATA.current_task.load(Ordering::Acquire)
}

#[inline]
pub fn set_kernel_stack_top(stack_top: u64) {
    BSP_DATA.kernel_stack_top.store(stack_top, Ordering::Release);
}

#[inline]
pub fn get_kernel_stack_top() -> u64 {
    BSP_DATA.kernel_stack_top.load(Ordering::Acquire)
}

#[inline]
pub fn increment_context_switches() {
    BSP_DATA.context_switches.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn increment_interrupt_count() {
    BSP_DATA.interrupt_count.fetch_add(1, Ordering::Relaxed);
}

pub type SendIpiToCpuFn = fn(u32, u8);

static SEND_IPI_TO_CPU_FN: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

/// Register an IPI sender. On a single CPU there is never another CPU to
/// signal; kept so drivers that still probe for a local APIC compile
/// unchanged.
pub fn register_send_ipi_to_cpu_fn(f: SendIpiToCpuFn) {
    SEND_IPI_TO_CPU_FN.store(f as *mut (), Ordering::Release);
}

pub fn send_ipi_to_cpu(target_apic_id: u32, vector: u8) {
    let fn_ptr = SEND_IPI_TO_CPU_FN.load(Ordering::Acquire);
    if !fn_ptr.is_null() {
        let f: SendIpiToCpuFn = unsafe { core::mem::transmute(fn_ptr) };
        f(target_apic_id, vector);
    }
}
