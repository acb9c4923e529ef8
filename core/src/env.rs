//! The environment table: `NENV` isolation units, each with its own page
//! directory, saved trap frame, IPC rendezvous slots, page-fault upcall,
//! and status (`spec.md` §3, §4.2).
//!
//! Kept as a single fixed-size array behind one lock, in the teacher's
//! `task_struct.rs`/`scheduler.rs` style (const-initialized array, atomic
//! status, generation-tagged ids) but pared down to what a single-CPU
//! exokernel needs: no per-CPU records, no signal/futex state, no thread
//! groups.

use core::ptr;

use chronos_abi::addr::PhysAddr;
use chronos_abi::env::{
    EnvId, EnvPublic, EnvStatus, EnvType, ENVPUBLIC_PER_PAGE, NENV, PteFlags, TrapFrame, UENVS_PAGES, envx,
};
use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_lib::IrqMutex;
use chronos_mm::hhdm::PhysAddrHhdm;
use chronos_mm::paging::ProcessPageDir;
use chronos_mm::vm;

/// The read-only environment-table mirror at `chronos_abi::UENVS`: the
/// same `UENVS_PAGES` physical frames get mapped into every environment's
/// directory (see `env_alloc`), so there is one copy in memory and every
/// environment sees every other's public fields.
static MIRROR_FRAMES: IrqMutex<Option<[PhysAddr; UENVS_PAGES]>> = IrqMutex::new(None);

/// Allocate the backing frames for the `UENVS` mirror. Must run once,
/// before the first `env_alloc`, as part of kernel boot.
pub fn init_mirror() -> ChronosResult<()> {
    let mut frames = [PhysAddr::NULL; UENVS_PAGES];
    for slot in frames.iter_mut() {
        *slot = vm::page_alloc()?;
    }
    *MIRROR_FRAMES.lock() = Some(frames);
    Ok(())
}

/// Republish environment `id`'s public fields into the mirror. Called
/// after every mutation a reader might care about: allocation, destruction,
/// status changes, and both ends of an IPC rendezvous.
pub fn sync_mirror(id: EnvId) {
    let frames = MIRROR_FRAMES.lock();
    let Some(frames) = frames.as_ref() else {
        return;
    };
    let rec = with_env(id, |e| EnvPublic {
        env_id: e.env_id,
        parent_id: e.parent_id,
        status: e.status,
        env_type: e.env_type,
        ipc_recving: e.ipc_recving as u8,
        ipc_from: e.ipc_from,
        ipc_value: e.ipc_value,
        ipc_perm: e.ipc_perm,
        ..EnvPublic::EMPTY
    });
    let idx = envx(id);
    let page = idx / ENVPUBLIC_PER_PAGE;
    let offset = idx % ENVPUBLIC_PER_PAGE;
    // SAFETY: `frames[page]` is a dedicated mirror frame never used for
    // anything else, reachable through the HHDM, and `offset` is in range
    // by construction (`UENVS_PAGES` is sized to cover every `envx`).
    unsafe {
        let ptr = frames[page].to_virt().as_mut_ptr::<EnvPublic>().add(offset);
        ptr.write_unaligned(rec);
    }
}

/// Maximum length of a `chdir`-settable current-working-directory string,
/// stored inline so the environment struct stays plain old data.
pub const CWD_MAX_LEN: usize = 128;

/// One isolation unit. Every field named in `spec.md` §3's "Environment"
/// data-model entry has a home here.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Environment {
    pub env_id: EnvId,
    pub parent_id: EnvId,
    pub status: EnvStatus,
    pub env_type: EnvType,
    pub pgdir: *mut ProcessPageDir,
    pub trap_frame: TrapFrame,
    pub pgfault_upcall: u64,

    /// True while this environment is blocked inside `ipc_recv`.
    pub ipc_recving: bool,
    /// Destination VA the environment asked to receive a page at.
    pub ipc_dstva: u64,
    /// `0` means "accept from anyone"; otherwise the only sender accepted.
    pub ipc_from_filter: EnvId,
    /// Sender of the most recently completed receive.
    pub ipc_from: EnvId,
    /// Value delivered by the most recently completed receive.
    pub ipc_value: u32,
    /// Permission bits the transferred page (if any) was mapped with.
    pub ipc_perm: PteFlags,

    pub cwd: [u8; CWD_MAX_LEN],
    pub cwd_len: usize,

    pub run_count: u64,
}

impl Environment {
    const fn free(slot_generation: u32) -> Self {
        Self {
            env_id: slot_generation,
            parent_id: 0,
            status: EnvStatus::Free,
            env_type: EnvType::Idle,
            pgdir: ptr::null_mut(),
            trap_frame: TrapFrame {
                rax: 0,
                rbx: 0,
                rcx: 0,
                rdx: 0,
                rsi: 0,
                rdi: 0,
                rbp: 0,
                r8: 0,
                r9: 0,
                r10: 0,
                r11: 0,
                r12: 0,
                r13: 0,
                r14: 0,
                r15: 0,
                trapno: 0,
                err: 0,
                rip: 0,
                cs: 0,
                rflags: 0,
                rsp: 0,
                ss: 0,
            },
            pgfault_upcall: 0,
            ipc_recving: false,
            ipc_dstva: 0,
            ipc_from_filter: 0,
            ipc_from: 0,
            ipc_value: 0,
            ipc_perm: PteFlags::empty(),
            cwd: [0; CWD_MAX_LEN],
            cwd_len: 0,
            run_count: 0,
        }
    }

    pub fn cwd_str(&self) -> &str {
        core::str::from_utf8(&self.cwd[..self.cwd_len]).unwrap_or("")
    }

    fn set_cwd(&mut self, path: &str) {
        let n = path.len().min(CWD_MAX_LEN);
        self.cwd[..n].copy_from_slice(&path.as_bytes()[..n]);
        self.cwd_len = n;
    }
}

// SAFETY: the whole table lives behind `ENV_TABLE`'s `IrqMutex`; no
// `Environment` reference escapes a lock guard.
unsafe impl Send for Environment {}

struct EnvTable {
    envs: [Environment; NENV],
    /// Round-robin scan cursor, shared with `sched::yield_to_next`.
    next_slot: usize,
}

static ENV_TABLE: IrqMutex<EnvTable> = IrqMutex::new(EnvTable::new());

impl EnvTable {
    const fn new() -> Self {
        // `Environment::free` needs a per-slot generation seed so envid 0
        // (always invalid) is never handed out; seed every slot's high bits
        // with its own index so the first allocation's generation starts at
        // a distinct, nonzero value per slot.
        const ONE: Environment = Environment::free(0);
        let mut envs = [ONE; NENV];
        let mut i = 0;
        while i < NENV {
            envs[i].env_id = ((1u32) << chronos_abi::env::ENVX_BITS) | (i as u32);
            i += 1;
        }
        Self {
            envs,
            next_slot: 0,
        }
    }
}

/// The environment the scheduler most recently switched to. `None` only
/// before the first `sched::run` call.
static CURRENT_ENVID: IrqMutex<Option<EnvId>> = IrqMutex::new(None);

pub fn current_envid() -> Option<EnvId> {
    *CURRENT_ENVID.lock()
}

pub(crate) fn set_current_envid(id: Option<EnvId>) {
    *CURRENT_ENVID.lock() = id;
}

/// Resolve `envid` to a slot, honoring the spec's `envid2env` permission
/// rule: callers may always resolve envid 0 (meaning "self"), but resolving
/// another id with `checkperm` set requires the caller to be that
/// environment's parent.
pub fn envid2env(envid: EnvId, checkperm: bool) -> ChronosResult<EnvId> {
    let target = if envid == 0 {
        current_envid().ok_or(ChronosError::BadEnv)?
    } else {
        let table = ENV_TABLE.lock();
        let slot = &table.envs[envx(envid)];
        if slot.env_id != envid || slot.status == EnvStatus::Free {
            return Err(ChronosError::BadEnv);
        }
        envid
    };

    if checkperm {
        let caller = current_envid().ok_or(ChronosError::BadEnv)?;
        if target != caller {
            let table = ENV_TABLE.lock();
            let slot = &table.envs[envx(target)];
            if slot.parent_id != caller {
                return Err(ChronosError::BadEnv);
            }
        }
    }
    Ok(target)
}

/// Run `f` with exclusive access to environment `id`'s slot. `id` must
/// already have been validated by `envid2env`.
pub fn with_env<R>(id: EnvId, f: impl FnOnce(&mut Environment) -> R) -> R {
    let mut table = ENV_TABLE.lock();
    let slot = &mut table.envs[envx(id)];
    f(slot)
}

/// Allocate a fresh environment (the shared core of both `exofork` and the
/// kernel's own "spawn the first environment" bootstrap): a new page
/// directory seeded with the kernel's mappings, status `NotRunnable`, and
/// `parent_id` set to `parent` (0 for the very first environment).
///
/// On success returns the new environment's id; the caller still owns
/// setting up the trap frame, CWD, and (for `exofork`) copying the parent's
/// state.
pub fn env_alloc(parent: EnvId, env_type: EnvType) -> ChronosResult<EnvId> {
    let mut table = ENV_TABLE.lock();

    let start = table.next_slot;
    let mut chosen = None;
    for step in 0..NENV {
        let i = (start + step) % NENV;
        if table.envs[i].status == EnvStatus::Free {
            chosen = Some(i);
            break;
        }
    }
    let i = chosen.ok_or(ChronosError::NoFreeEnv)?;
    table.next_slot = (i + 1) % NENV;

    // Generation lives in the id's high bits; bump it past the slot's
    // last-issued id so a destroyed-and-reused slot never repeats an id a
    // stale caller might still be holding.
    let prev_id = table.envs[i].env_id;
    let next_id = prev_id.wrapping_add(1u32 << chronos_abi::env::ENVX_BITS) | (i as u32);

    drop(table);
    let pgdir = vm::env_pgdir_create()?;
    if let Some(frames) = MIRROR_FRAMES.lock().as_ref() {
        vm::map_readonly_shared(
            pgdir,
            chronos_abi::addr::VirtAddr::new(chronos_abi::UENVS),
            frames,
        )?;
    }

    let mut table = ENV_TABLE.lock();
    let slot = &mut table.envs[i];
    *slot = Environment::free(0);
    slot.env_id = next_id;
    slot.parent_id = parent;
    slot.status = EnvStatus::NotRunnable;
    slot.env_type = env_type;
    slot.pgdir = pgdir;
    drop(table);
    sync_mirror(next_id);
    Ok(next_id)
}

/// Tear down environment `id`: free its address space, clear any IPC
/// rendezvous it was party to, and return its slot to the free list.
///
/// If `id` names the currently running environment, the caller (the
/// `env_destroy` syscall handler) is responsible for invoking the
/// scheduler afterwards — this function only updates the table.
pub fn env_destroy(id: EnvId) {
    let pgdir = {
        let mut table = ENV_TABLE.lock();
        let slot = &mut table.envs[envx(id)];
        if slot.env_id != id || slot.status == EnvStatus::Free {
            return;
        }
        slot.status = EnvStatus::Dying;
        let pgdir = slot.pgdir;
        slot.pgdir = ptr::null_mut();
        slot.status = EnvStatus::Free;
        pgdir
    };
    if !pgdir.is_null() {
        // SAFETY: `pgdir` belonged only to the now-freed slot and the
        // caller ensures it is not the active directory (switched away
        // from before destroying self, per the scheduler's reap path).
        unsafe {
            vm::env_pgdir_destroy(pgdir);
        }
    }
    sync_mirror(id);
    chronos_lib::klog_info!("env: destroyed {:#x}", id);
}

/// Set `id`'s schedulability. Restricted to `Runnable`/`NotRunnable` at the
/// syscall boundary (`spec.md` §4.3); callers that need `Dying`/`Free` use
/// `env_destroy`.
pub fn env_set_status(id: EnvId, status: EnvStatus) -> ChronosResult<()> {
    if status != EnvStatus::Runnable && status != EnvStatus::NotRunnable {
        return Err(ChronosError::Inval);
    }
    with_env(id, |e| e.status = status);
    sync_mirror(id);
    Ok(())
}

pub fn env_set_trapframe(id: EnvId, tf: TrapFrame) {
    with_env(id, |e| {
        let mut tf = tf;
        // Force user CS/RFLAGS regardless of what the caller supplied, per
        // `spec.md` §4.3: "forces user code-segment protection level and
        // interrupts-enabled".
        tf.cs = chronos_abi::env::PteFlags::USER.bits() as u64 | 3;
        tf.rflags |= 0x200;
        e.trap_frame = tf;
    });
}

pub fn env_set_pgfault_upcall(id: EnvId, va: u64) {
    with_env(id, |e| e.pgfault_upcall = va);
}

pub fn chdir(id: EnvId, path: &str) {
    with_env(id, |e| e.set_cwd(path));
}

/// `exofork`: allocate a `NotRunnable` child of `parent`, copying `parent`'s
/// trap frame and CWD. The child's own observed return value (0) is set by
/// the syscall handler directly into the copied trap frame before return.
pub fn exofork(parent: EnvId) -> ChronosResult<EnvId> {
    let (tf, cwd, cwd_len, env_type) =
        with_env(parent, |e| (e.trap_frame, e.cwd, e.cwd_len, e.env_type));
    let child = env_alloc(parent, env_type)?;
    with_env(child, |e| {
        e.trap_frame = tf;
        e.cwd = cwd;
        e.cwd_len = cwd_len;
    });
    Ok(child)
}

/// `env_convert`: `id` (which must not yet have run) becomes the caller.
/// Per the Open Question resolution in `spec.md` §9(c): the page-directory
/// swap happens before the trap-frame copy and before `env_destroy(id)`, so
/// it is the destroyed environment's (not the caller's, post-swap) page
/// tables that get freed.
pub fn env_convert(caller: EnvId, id: EnvId) -> ChronosResult<()> {
    if with_env(id, |e| e.run_count) != 0 {
        return Err(ChronosError::Inval);
    }
    let (new_pgdir, new_tf) = with_env(id, |e| (e.pgdir, e.trap_frame));

    let old_pgdir = with_env(caller, |e| e.pgdir);
    with_env(caller, |e| e.pgdir = new_pgdir);
    with_env(id, |e| e.pgdir = old_pgdir);

    vm::switch_to(new_pgdir)?;
    with_env(caller, |e| e.trap_frame = new_tf);
    env_destroy(id);
    Ok(())
}

pub fn status_of(id: EnvId) -> EnvStatus {
    with_env(id, |e| e.status)
}

pub fn mark_run(id: EnvId) {
    with_env(id, |e| e.run_count += 1);
}

/// Iterate every live (non-`Free`) environment id, starting just after
/// `after` and wrapping once around the table. Used by the scheduler's
/// round-robin scan.
pub fn next_runnable_after(after: Option<EnvId>) -> Option<EnvId> {
    let table = ENV_TABLE.lock();
    let start = after.map(envx).map(|i| (i + 1) % NENV).unwrap_or(0);
    for step in 0..NENV {
        let i = (start + step) % NENV;
        if table.envs[i].status == EnvStatus::Runnable {
            return Some(table.envs[i].env_id);
        }
    }
    None
}
