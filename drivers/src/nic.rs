//! 82540EM-style descriptor-ring driver (`spec.md` §4.6, §6).
//!
//! Two fixed-size descriptor rings (`NUM_TX` TX, `NUM_RX` RX) live in
//! ordinary kernel memory; only their physical base and length are
//! programmed into the device's memory-mapped registers
//! (`chronos_mm::mmio::MmioRegion`, matching the teacher's register-access
//! convention). PCI enumeration that would normally hand us the device's
//! BAR0 physical address is an explicit Non-goal (`spec.md` §1) — the
//! driver is constructed directly from a physical base address the boot
//! path already knows.

use core::ffi::c_void;
use core::sync::atomic::{AtomicU32, Ordering};

use chronos_abi::addr::{PhysAddr, VirtAddr};
use chronos_abi::error::{ChronosError, ChronosResult};
use chronos_abi::nic::*;
use chronos_lib::IrqMutex;
use chronos_mm::kernel_heap::{kfree, kzalloc};
use chronos_mm::mmio::MmioRegion;
use chronos_mm::paging::virt_to_phys;

/// One TX ring and one RX ring plus the registers that drive them.
///
/// The rings and packet buffers are heap-allocated (`kzalloc`) rather than
/// held as inline arrays: their physical addresses must be programmed into
/// the device's registers/descriptors, and only memory reached through the
/// kernel's own mapped address space (as `kzalloc` returns) has a physical
/// address `virt_to_phys` can recover. A `NicDevice` embedded in a `static`
/// would instead sit at the kernel image's link address, which is not
/// necessarily walkable the same way.
pub struct NicDevice {
    regs: MmioRegion,
    tx: *mut TxDesc,
    tx_tail: usize,
    rx: *mut RxDesc,
    rx_tail: usize,
    rx_bufs: *mut [u8; MAX_PACKET_BUF],
    tx_bufs: *mut [u8; MAX_PACKET_BUF],
}

// SAFETY: the device is only ever touched through the `NIC` mutex below;
// the heap blocks it owns are never aliased outside this module.
unsafe impl Send for NicDevice {}

impl NicDevice {
    fn new(regs: MmioRegion) -> ChronosResult<Self> {
        let tx = kzalloc(NUM_TX * core::mem::size_of::<TxDesc>()) as *mut TxDesc;
        let rx = kzalloc(NUM_RX * core::mem::size_of::<RxDesc>()) as *mut RxDesc;
        let tx_bufs = kzalloc(NUM_TX * MAX_PACKET_BUF) as *mut [u8; MAX_PACKET_BUF];
        let rx_bufs = kzalloc(NUM_RX * MAX_PACKET_BUF) as *mut [u8; MAX_PACKET_BUF];
        if tx.is_null() || rx.is_null() || tx_bufs.is_null() || rx_bufs.is_null() {
            unsafe {
                kfree(tx as *mut c_void);
                kfree(rx as *mut c_void);
                kfree(tx_bufs as *mut c_void);
                kfree(rx_bufs as *mut c_void);
            }
            return Err(ChronosError::NoMem);
        }
        Ok(Self {
            regs,
            tx,
            tx_tail: 0,
            rx,
            rx_tail: 0,
            rx_bufs,
            tx_bufs,
        })
    }

    fn tx_desc(&mut self, i: usize) -> &mut TxDesc {
        // SAFETY: `i < NUM_TX`, `tx` is a live `kzalloc`'d array for the
        // lifetime of the device.
        unsafe { &mut *self.tx.add(i) }
    }

    fn rx_desc(&mut self, i: usize) -> &mut RxDesc {
        // SAFETY: `i < NUM_RX`, `rx` is a live `kzalloc`'d array for the
        // lifetime of the device.
        unsafe { &mut *self.rx.add(i) }
    }

    fn tx_buf(&mut self, i: usize) -> &mut [u8; MAX_PACKET_BUF] {
        // SAFETY: `i < NUM_TX`, `tx_bufs` is a live `kzalloc`'d array.
        unsafe { &mut *self.tx_bufs.add(i) }
    }

    fn rx_buf(&mut self, i: usize) -> &mut [u8; MAX_PACKET_BUF] {
        // SAFETY: `i < NUM_RX`, `rx_bufs` is a live `kzalloc`'d array.
        unsafe { &mut *self.rx_bufs.add(i) }
    }

    fn phys_of<T>(p: *const T) -> u64 {
        virt_to_phys(VirtAddr::new(p as u64)).as_u64()
    }

    fn init_rings(&mut self) {
        for i in 0..NUM_RX {
            let buf_addr = Self::phys_of(self.rx_buf(i).as_ptr());
            *self.rx_desc(i) = RxDesc {
                addr: buf_addr,
                ..RxDesc::default()
            };
        }
        let rx_phys = Self::phys_of(self.rx);
        self.regs.write_u32(REG_RDBAL as usize, rx_phys as u32);
        self.regs
            .write_u32(REG_RDLEN as usize, (NUM_RX * core::mem::size_of::<RxDesc>()) as u32);
        self.regs.write_u32(REG_RDH as usize, 0);
        self.regs.write_u32(REG_RDT as usize, (NUM_RX - 1) as u32);
        self.regs
            .write_u32(REG_RCTL as usize, RCTL_EN | RCTL_BAM | RCTL_SECRC);
        self.rx_tail = NUM_RX - 1;

        let tx_phys = Self::phys_of(self.tx);
        self.regs.write_u32(REG_TDBAL as usize, tx_phys as u32);
        self.regs
            .write_u32(REG_TDLEN as usize, (NUM_TX * core::mem::size_of::<TxDesc>()) as u32);
        self.regs.write_u32(REG_TDH as usize, 0);
        self.regs.write_u32(REG_TDT as usize, 0);
        self.regs
            .write_u32(REG_TCTL as usize, TCTL_EN | TCTL_PSP | (0x0F << TCTL_COLD_SHIFT));
        self.tx_tail = 0;
        for i in 0..NUM_TX {
            self.tx_desc(i).status = TDESC_DD;
        }
    }

    /// Enqueue `data` for transmission. Fails `NoMem` if the descriptor at
    /// the current tail has not yet been marked done by hardware (ring
    /// full), per `spec.md` §4.6.
    fn transmit(&mut self, data: &[u8]) -> ChronosResult<()> {
        if data.len() > MAX_PACKET_LEN {
            return Err(ChronosError::Inval);
        }
        let i = self.tx_tail;
        if self.tx_desc(i).status & TDESC_DD == 0 {
            return Err(ChronosError::NoMem);
        }
        self.tx_buf(i)[..data.len()].copy_from_slice(data);
        let buf_addr = Self::phys_of(self.tx_buf(i).as_ptr());
        *self.tx_desc(i) = TxDesc {
            addr: buf_addr,
            length: data.len() as u16,
            cmd: TDESC_CMD_EOP | TDESC_CMD_RS,
            status: 0,
            ..TxDesc::default()
        };
        self.tx_tail = (i + 1) % NUM_TX;
        self.regs.write_u32(REG_TDT as usize, self.tx_tail as u32);
        Ok(())
    }

    /// Dequeue one received packet into `out`, returning its length.
    /// Fails `NoMem` if the next descriptor has not been marked done by
    /// hardware (nothing received yet), per `spec.md` §4.6.
    fn receive(&mut self, out: &mut [u8]) -> ChronosResult<usize> {
        let i = (self.rx_tail + 1) % NUM_RX;
        if self.rx_desc(i).status & RDESC_DD == 0 {
            return Err(ChronosError::NoMem);
        }
        let len = self.rx_desc(i).length as usize;
        let n = len.min(out.len());
        out[..n].copy_from_slice(&self.rx_buf(i)[..n]);

        self.rx_desc(i).status = 0;
        self.rx_tail = i;
        self.regs.write_u32(REG_RDT as usize, self.rx_tail as u32);
        Ok(n)
    }

    fn read_eeprom(&self, addr: u8) -> u16 {
        self.regs
            .write_u32(REG_EERD as usize, EERD_START | ((addr as u32) << EERD_ADDR_SHIFT));
        loop {
            let val = self.regs.read_u32(REG_EERD as usize);
            if val & EERD_DONE != 0 {
                return (val >> EERD_DATA_SHIFT) as u16;
            }
            core::hint::spin_loop();
        }
    }

    fn mac_address(&self) -> [u8; 6] {
        let w0 = self.read_eeprom(0);
        let w1 = self.read_eeprom(1);
        let w2 = self.read_eeprom(2);
        [
            (w0 & 0xFF) as u8,
            (w0 >> 8) as u8,
            (w1 & 0xFF) as u8,
            (w1 >> 8) as u8,
            (w2 & 0xFF) as u8,
            (w2 >> 8) as u8,
        ]
    }
}

impl Drop for NicDevice {
    fn drop(&mut self) {
        unsafe {
            kfree(self.tx as *mut c_void);
            kfree(self.rx as *mut c_void);
            kfree(self.tx_bufs as *mut c_void);
            kfree(self.rx_bufs as *mut c_void);
        }
    }
}

static NIC: IrqMutex<Option<NicDevice>> = IrqMutex::new(None);
static NIC_PRESENT: AtomicU32 = AtomicU32::new(0);

/// Map the device's MMIO BAR at `regs_phys` and bring both rings up.
/// Called once from kernel init with the physical address the boot path
/// already knows (PCI BAR discovery is an external seam — `spec.md` §1).
pub fn init(regs_phys: PhysAddr) -> ChronosResult<()> {
    let region = MmioRegion::map(regs_phys, 0x20000).ok_or(ChronosError::NoMem)?;
    let mut dev = NicDevice::new(region)?;
    dev.init_rings();
    *NIC.lock() = Some(dev);
    NIC_PRESENT.store(1, Ordering::Release);
    Ok(())
}

pub fn is_present() -> bool {
    NIC_PRESENT.load(Ordering::Acquire) != 0
}

pub fn net_transmit(data: &[u8]) -> ChronosResult<()> {
    let mut guard = NIC.lock();
    guard.as_mut().ok_or(ChronosError::NoDisk)?.transmit(data)
}

pub fn net_receive(out: &mut [u8]) -> ChronosResult<usize> {
    let mut guard = NIC.lock();
    guard.as_mut().ok_or(ChronosError::NoDisk)?.receive(out)
}

pub fn mac_address() -> ChronosResult<[u8; 6]> {
    let guard = NIC.lock();
    Ok(guard.as_ref().ok_or(ChronosError::NoDisk)?.mac_address())
}
