// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Fake host environment for unit tests: register banks which model the handshakes of each unit,
//! timers, a work queue, a scheduler and a page allocator which record what the driver did.

use super::{DeferredWork, IrqProbe, PageAllocator, Platform, TablePage, TimeoutTimer};
use crate::{
    Error, Result,
    config::Config,
    context::DriverContext,
    gp_job::GpJob,
    group::{BottomHalf, Group, GroupId, GroupState, LockedGroup},
    hw_core::{RegisterIo, Resource},
    logger::{self, LogSink},
    pp_job::PpJob,
    scheduler::{JobIdAllocator, Scheduler},
};
use mali_regs::{gp, mmu, pmu, pp};
use spin::mutex::SpinMutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    io::{Write, stdout},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

/// Physical base address of the fake GPU.
pub const GPU_BASE: u64 = 0x1300_0000;

/// Offsets of the PP cores, in core ID order.
pub const PP_OFFSETS: [u64; 8] = [
    0x08000, 0x0A000, 0x0C000, 0x0E000, 0x28000, 0x2A000, 0x2C000, 0x2E000,
];
/// Offsets of the PP cores' MMUs, in core ID order.
pub const PP_MMU_OFFSETS: [u64; 8] = [
    0x04000, 0x05000, 0x06000, 0x07000, 0x1C000, 0x1D000, 0x1E000, 0x1F000,
];

/// Version register value of a Mali-400 r1p1 core.
pub const MALI400_VERSION: u32 = 0xCD07_0101;
/// Version register value of a Mali-450 r0p0 core.
pub const MALI450_VERSION: u32 = 0xCF07_0000;

/// How a fake device reacts to register writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Model {
    /// Registers just hold what was written.
    Plain,
    /// MMU: paging, stall, page fault and hard reset handshakes.
    Mmu,
    /// L2 cache: busy bit while stuck.
    L2,
    /// GP core: soft reset, bus stop and job start.
    Gp,
    /// PP core: soft reset, bus stop and rendering.
    Pp,
    /// PMU: commands complete immediately.
    Pmu,
}

#[derive(Default)]
struct DeviceState {
    regs: BTreeMap<u32, u32>,
    writes: Vec<(u32, u32)>,
    stuck: bool,
}

impl DeviceState {
    fn get(&self, offset: u32) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn set_bits(&mut self, offset: u32, bits: u32) {
        let value = self.get(offset) | bits;
        self.regs.insert(offset, value);
    }

    fn clear_bits(&mut self, offset: u32, bits: u32) {
        let value = self.get(offset) & !bits;
        self.regs.insert(offset, value);
    }
}

/// A bank of fake registers.
pub struct FakeDevice {
    model: Model,
    state: SpinMutex<DeviceState>,
}

impl FakeDevice {
    fn new(model: Model) -> Self {
        Self {
            model,
            state: SpinMutex::new(DeviceState::default()),
        }
    }

    /// Reads a register as the driver would see it.
    pub fn read(&self, offset: u32) -> u32 {
        let state = self.state.lock();
        match (self.model, offset) {
            (Model::Mmu, mmu::INT_STATUS) => {
                state.get(mmu::INT_RAWSTAT) & state.get(mmu::INT_MASK)
            }
            (Model::Gp, gp::INT_STAT) => state.get(gp::INT_RAWSTAT) & state.get(gp::INT_MASK),
            (Model::Pp, pp::INT_STATUS) => {
                state.get(pp::INT_RAWSTAT) & state.get(pp::INT_MASK)
            }
            (Model::L2, mali_regs::l2::STATUS) if state.stuck => {
                mali_regs::l2::Status::COMMAND_BUSY.bits()
            }
            _ => state.get(offset),
        }
    }

    /// Writes a register as the driver would, applying the device model.
    pub fn write(&self, offset: u32, value: u32) {
        let mut state = self.state.lock();
        state.writes.push((offset, value));
        let stuck = state.stuck;
        match (self.model, offset) {
            (Model::Mmu, mmu::DTE_ADDR) => {
                state.regs.insert(offset, value & !0xFFF);
            }
            (Model::Mmu, mmu::COMMAND) => {
                let status = mmu::STATUS;
                match value {
                    v if v == mmu::Command::EnablePaging as u32 && !stuck => {
                        state.set_bits(status, mmu::Status::PAGING_ENABLED.bits())
                    }
                    v if v == mmu::Command::DisablePaging as u32 => {
                        state.clear_bits(status, mmu::Status::PAGING_ENABLED.bits())
                    }
                    v if v == mmu::Command::EnableStall as u32 && !stuck => {
                        state.set_bits(status, mmu::Status::STALL_ACTIVE.bits())
                    }
                    v if v == mmu::Command::DisableStall as u32 => {
                        state.clear_bits(status, mmu::Status::STALL_ACTIVE.bits())
                    }
                    v if v == mmu::Command::PageFaultDone as u32 => {
                        state.clear_bits(status, mmu::Status::PAGE_FAULT_ACTIVE.bits())
                    }
                    v if v == mmu::Command::HardReset as u32 && !stuck => {
                        state.regs.insert(mmu::DTE_ADDR, 0);
                        state.regs.insert(status, 0);
                    }
                    _ => {}
                }
            }
            (Model::Mmu, mmu::INT_CLEAR) => state.clear_bits(mmu::INT_RAWSTAT, value),
            (Model::Mmu, mmu::INT_RAWSTAT) => state.set_bits(mmu::INT_RAWSTAT, value),
            (Model::Gp, gp::CMD) => {
                let command = gp::Command::from_bits_retain(value);
                if command.contains(gp::Command::SOFT_RESET) && !stuck {
                    state.set_bits(gp::INT_RAWSTAT, gp::Interrupt::RESET_COMPLETED.bits());
                    state.regs.insert(gp::STATUS, 0);
                }
                if command.contains(gp::Command::RESET) {
                    state.regs.insert(gp::STATUS, 0);
                }
                if command.contains(gp::Command::STOP_BUS) && !stuck {
                    state.set_bits(gp::STATUS, gp::Status::BUS_STOPPED.bits());
                }
                if command.contains(gp::Command::START_VS) {
                    state.set_bits(gp::STATUS, gp::Status::VS_ACTIVE.bits());
                }
                if command.contains(gp::Command::START_PLBU) {
                    state.set_bits(gp::STATUS, gp::Status::PLBU_ACTIVE.bits());
                }
            }
            (Model::Gp, gp::INT_CLEAR) => state.clear_bits(gp::INT_RAWSTAT, value),
            (Model::Gp, gp::INT_RAWSTAT) => state.set_bits(gp::INT_RAWSTAT, value),
            (Model::Gp, gp::WRITE_BOUND_LOW) | (Model::Pp, pp::WRITE_BOUNDARY_LOW) if stuck => {
                state.regs.insert(offset, 0);
            }
            (Model::Pp, pp::CTRL_MGMT) => {
                let control = pp::Control::from_bits_retain(value);
                if control.contains(pp::Control::SOFT_RESET) && !stuck {
                    state.set_bits(pp::INT_RAWSTAT, pp::Interrupt::RESET_COMPLETED.bits());
                    state.regs.insert(pp::STATUS, 0);
                }
                if control.contains(pp::Control::FORCE_RESET) {
                    state.regs.insert(pp::STATUS, 0);
                }
                if control.contains(pp::Control::STOP_BUS) && !stuck {
                    state.set_bits(pp::STATUS, pp::Status::BUS_STOPPED.bits());
                }
                if control.contains(pp::Control::START_RENDERING) {
                    state.set_bits(pp::STATUS, pp::Status::RENDERING_ACTIVE.bits());
                }
            }
            (Model::Pp, pp::INT_CLEAR) => state.clear_bits(pp::INT_RAWSTAT, value),
            (Model::Pp, pp::INT_RAWSTAT) => state.set_bits(pp::INT_RAWSTAT, value),
            (Model::Pmu, pmu::POWER_UP) => {
                state.clear_bits(pmu::STATUS, value);
                if !stuck {
                    state.set_bits(pmu::INT_RAWSTAT, pmu::IRQ_COMMAND_COMPLETE);
                }
            }
            (Model::Pmu, pmu::POWER_DOWN) => {
                state.set_bits(pmu::STATUS, value);
                if !stuck {
                    state.set_bits(pmu::INT_RAWSTAT, pmu::IRQ_COMMAND_COMPLETE);
                }
            }
            (Model::Pmu, pmu::INT_CLEAR) => state.clear_bits(pmu::INT_RAWSTAT, value),
            _ => {
                state.regs.insert(offset, value);
            }
        }
    }

    /// Sets a register behind the driver's back, e.g. to raise an interrupt.
    pub fn set(&self, offset: u32, value: u32) {
        self.state.lock().regs.insert(offset, value);
    }

    /// Sets bits in a register behind the driver's back.
    pub fn set_bits(&self, offset: u32, bits: u32) {
        self.state.lock().set_bits(offset, bits);
    }

    /// Clears bits in a register behind the driver's back.
    pub fn clear_bits(&self, offset: u32, bits: u32) {
        self.state.lock().clear_bits(offset, bits);
    }

    /// Makes the device ignore reset, stall, bus stop and command completion handshakes.
    pub fn set_stuck(&self, stuck: bool) {
        self.state.lock().stuck = stuck;
    }

    /// Returns all writes since the last call to [`FakeDevice::clear_writes`].
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.state.lock().writes.clone()
    }

    /// Returns the values written to the given register.
    pub fn writes_to(&self, offset: u32) -> Vec<u32> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Forgets the recorded writes.
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }
}

struct SharedRegisters(Arc<FakeDevice>);

impl RegisterIo for SharedRegisters {
    fn read(&self, offset: u32) -> u32 {
        self.0.read(offset)
    }

    fn write(&self, offset: u32, value: u32) {
        self.0.write(offset, value);
    }
}

/// A watchdog timer which only fires when a test says so.
#[derive(Default)]
pub struct FakeTimer {
    pending: AtomicBool,
    armed_ms: AtomicU32,
    arm_count: AtomicU32,
    cancel_count: AtomicU32,
}

impl FakeTimer {
    /// Marks the timer as expired. The test must then call `Group::timeout`.
    pub fn fire(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }

    /// How often the timer was armed.
    pub fn arm_count(&self) -> u32 {
        self.arm_count.load(Ordering::SeqCst)
    }

    /// How often the timer was cancelled.
    pub fn cancel_count(&self) -> u32 {
        self.cancel_count.load(Ordering::SeqCst)
    }

    /// The timeout passed to the last `arm`.
    pub fn armed_ms(&self) -> u32 {
        self.armed_ms.load(Ordering::SeqCst)
    }

    /// Whether the timer is armed.
    pub fn pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

struct SharedTimer(Arc<FakeTimer>);

impl TimeoutTimer for SharedTimer {
    fn arm(&self, ms: u32) {
        self.0.armed_ms.store(ms, Ordering::SeqCst);
        self.0.arm_count.fetch_add(1, Ordering::SeqCst);
        self.0.pending.store(true, Ordering::SeqCst);
    }

    fn cancel_async(&self) {
        self.0.cancel_count.fetch_add(1, Ordering::SeqCst);
        self.0.pending.store(false, Ordering::SeqCst);
    }

    fn is_pending(&self) -> bool {
        self.0.pending.load(Ordering::SeqCst)
    }
}

/// A fake platform for unit tests.
pub struct TestPlatform {
    gpu_base: Option<u64>,
    resources: SpinMutex<BTreeMap<u64, Resource>>,
    devices: SpinMutex<BTreeMap<u64, Arc<FakeDevice>>>,
    failing: SpinMutex<BTreeSet<u64>>,
    timers: SpinMutex<BTreeMap<GroupId, Arc<FakeTimer>>>,
    shared_interrupts: bool,
}

impl TestPlatform {
    /// Creates a platform with no GPU resources. Devices are created on demand as plain register
    /// banks.
    pub fn new() -> Self {
        init_logger();
        Self {
            gpu_base: None,
            resources: SpinMutex::new(BTreeMap::new()),
            devices: SpinMutex::new(BTreeMap::new()),
            failing: SpinMutex::new(BTreeSet::new()),
            timers: SpinMutex::new(BTreeMap::new()),
            shared_interrupts: false,
        }
    }

    /// Creates a platform with a Mali-400 MP with the given number of PP cores.
    pub fn mali400(pp_count: usize) -> Self {
        let mut platform = Self::new();
        platform.gpu_base = Some(GPU_BASE);
        platform.add_unit(0x0, "Mali_GP", Model::Gp);
        platform.add_unit(0x3000, "Mali_GP_MMU", Model::Mmu);
        platform.add_unit(0x1000, "Mali_L2", Model::L2);
        platform.add_unit(0x2000, "Mali_PMU", Model::Pmu);
        for i in 0..pp_count {
            platform.add_unit(PP_OFFSETS[i], PP_NAMES[i], Model::Pp);
            platform.add_unit(PP_MMU_OFFSETS[i], PP_MMU_NAMES[i], Model::Mmu);
            platform.gpu_device(PP_OFFSETS[i]).set(pp::VERSION, MALI400_VERSION);
        }
        platform
    }

    /// Creates a platform with a Mali-450 MP with the given number of PP cores.
    pub fn mali450(pp_count: usize) -> Self {
        let mut platform = Self::new();
        platform.gpu_base = Some(GPU_BASE);
        platform.add_unit(0x0, "Mali_GP", Model::Gp);
        platform.add_unit(0x3000, "Mali_GP_MMU", Model::Mmu);
        platform.add_unit(0x10000, "Mali_L2_GP", Model::L2);
        platform.add_unit(0x1000, "Mali_L2_PP0", Model::L2);
        if pp_count > 4 {
            platform.add_unit(0x11000, "Mali_L2_PP1", Model::L2);
        }
        platform.add_unit(0x2000, "Mali_PMU", Model::Pmu);
        platform.add_unit(0x13000, "Mali_Broadcast", Model::Plain);
        platform.add_unit(0x14000, "Mali_DLBU", Model::Plain);
        platform.add_unit(0x15000, "Mali_PP_Broadcast_MMU", Model::Mmu);
        platform.add_unit(0x16000, "Mali_PP_Broadcast", Model::Pp);
        // Up to four PP cores sit behind the first L2 cache; larger configurations are split
        // evenly between the two PP core groups.
        let first_group = if pp_count <= 4 {
            pp_count
        } else {
            pp_count.div_ceil(2)
        };
        let cores = (0..first_group).chain(4..4 + (pp_count - first_group));
        for i in cores {
            platform.add_unit(PP_OFFSETS[i], PP_NAMES[i], Model::Pp);
            platform.add_unit(PP_MMU_OFFSETS[i], PP_MMU_NAMES[i], Model::Mmu);
            platform.gpu_device(PP_OFFSETS[i]).set(pp::VERSION, MALI450_VERSION);
        }
        platform
    }

    /// Reports interrupt lines as shared.
    pub fn with_shared_interrupts(mut self) -> Self {
        self.shared_interrupts = true;
        self
    }

    /// Adds a unit at the given absolute address.
    pub fn add_resource(&self, base: u64, description: &'static str, model: Model) {
        self.resources.lock().insert(
            base,
            Resource {
                base,
                description,
                irq: None,
            },
        );
        self.devices
            .lock()
            .insert(base, Arc::new(FakeDevice::new(model)));
    }

    /// Gives the unit at the given absolute address a fixed interrupt line.
    pub fn set_irq(&self, base: u64, irq: u32) {
        if let Some(resource) = self.resources.lock().get_mut(&base) {
            resource.irq = Some(irq);
        }
    }

    fn add_unit(&self, offset: u64, description: &'static str, model: Model) {
        self.add_resource(GPU_BASE + offset, description, model);
    }

    /// Returns the device at the given absolute address, creating a plain one if needed.
    pub fn device(&self, base: u64) -> Arc<FakeDevice> {
        self.devices
            .lock()
            .entry(base)
            .or_insert_with(|| Arc::new(FakeDevice::new(Model::Plain)))
            .clone()
    }

    /// Returns the device at the given offset from [`GPU_BASE`].
    pub fn gpu_device(&self, offset: u64) -> Arc<FakeDevice> {
        self.device(GPU_BASE + offset)
    }

    /// Makes mapping the given address fail.
    pub fn fail_mapping(&self, base: u64) {
        self.failing.lock().insert(base);
    }

    /// Returns the timer created for the given group.
    pub fn timer(&self, group: GroupId) -> Arc<FakeTimer> {
        self.timers.lock()[&group].clone()
    }
}

const PP_NAMES: [&str; 8] = [
    "Mali_PP0", "Mali_PP1", "Mali_PP2", "Mali_PP3", "Mali_PP4", "Mali_PP5", "Mali_PP6", "Mali_PP7",
];
const PP_MMU_NAMES: [&str; 8] = [
    "Mali_PP0_MMU",
    "Mali_PP1_MMU",
    "Mali_PP2_MMU",
    "Mali_PP3_MMU",
    "Mali_PP4_MMU",
    "Mali_PP5_MMU",
    "Mali_PP6_MMU",
    "Mali_PP7_MMU",
];

impl Platform for TestPlatform {
    fn gpu_base_address(&self) -> Option<u64> {
        self.gpu_base
    }

    fn find_resource(&self, base: u64) -> Option<Resource> {
        self.resources.lock().get(&base).copied()
    }

    fn map_registers(&self, resource: &Resource, _size: usize) -> Result<Box<dyn RegisterIo>> {
        if self.failing.lock().contains(&resource.base) {
            return Err(Error::NoMemory);
        }
        Ok(Box::new(SharedRegisters(self.device(resource.base))))
    }

    fn create_timer(&self, group: GroupId) -> Result<Box<dyn TimeoutTimer>> {
        let timer = Arc::new(FakeTimer::default());
        self.timers.lock().insert(group, timer.clone());
        Ok(Box::new(SharedTimer(timer)))
    }

    fn shared_interrupts(&self) -> bool {
        self.shared_interrupts
    }

    fn irq_init(&self, resource: &Resource, probe: &dyn IrqProbe) -> Result<()> {
        if resource.irq.is_some() {
            return Ok(());
        }
        probe.probe_trigger();
        probe.probe_ack().map_err(|_| Error::NotFound)
    }
}

/// Returns a resource with an interrupt line, for tests which create cores directly.
pub fn resource(base: u64, description: &'static str) -> Resource {
    Resource {
        base,
        description,
        irq: Some(42),
    }
}

/// Records scheduled bottom halves instead of running them.
#[derive(Default)]
pub struct RecordingWork {
    items: SpinMutex<Vec<(GroupId, BottomHalf)>>,
}

impl RecordingWork {
    /// Returns and forgets everything scheduled so far.
    pub fn take(&self) -> Vec<(GroupId, BottomHalf)> {
        std::mem::take(&mut *self.items.lock())
    }
}

impl DeferredWork for RecordingWork {
    fn schedule(&self, group: GroupId, bottom_half: BottomHalf) {
        self.items.lock().push((group, bottom_half));
    }
}

/// Something the driver told the scheduler.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SchedulerEvent {
    /// `gp_job_done`, with the group state seen by the callback.
    GpDone {
        job: u32,
        success: bool,
        state: GroupState,
    },
    /// `pp_job_done`, with the group state seen by the callback.
    PpDone {
        job: u32,
        sub_job: u32,
        success: bool,
        state: GroupState,
    },
    /// `gp_oom`, noting whether the group lock could be taken inside the callback.
    GpOom { job: u32, group_unlocked: bool },
    /// `enable_group`.
    Enable(GroupId),
    /// `disable_group`.
    Disable(GroupId),
    /// `suspend`.
    Suspend,
    /// `resume`.
    Resume,
}

/// A scheduler which only records callbacks.
#[derive(Default)]
pub struct RecordingScheduler {
    events: SpinMutex<Vec<SchedulerEvent>>,
}

impl RecordingScheduler {
    /// Returns and forgets the recorded events.
    pub fn take(&self) -> Vec<SchedulerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn push(&self, event: SchedulerEvent) {
        self.events.lock().push(event);
    }
}

impl Scheduler for RecordingScheduler {
    fn gp_job_done(&self, group: &mut LockedGroup, job: Arc<GpJob>, success: bool) {
        self.push(SchedulerEvent::GpDone {
            job: job.id(),
            success,
            state: group.state(),
        });
    }

    fn pp_job_done(&self, group: &mut LockedGroup, job: Arc<PpJob>, sub_job: u32, success: bool) {
        self.push(SchedulerEvent::PpDone {
            job: job.id(),
            sub_job,
            success,
            state: group.state(),
        });
    }

    fn gp_oom(&self, group: &Group, job: Arc<GpJob>) {
        let group_unlocked = group.try_lock().is_some();
        self.push(SchedulerEvent::GpOom {
            job: job.id(),
            group_unlocked,
        });
    }

    fn enable_group(&self, group: &Group) {
        self.push(SchedulerEvent::Enable(group.id()));
    }

    fn disable_group(&self, group: &Group) {
        self.push(SchedulerEvent::Disable(group.id()));
    }

    fn suspend(&self) {
        self.push(SchedulerEvent::Suspend);
    }

    fn resume(&self) {
        self.push(SchedulerEvent::Resume);
    }
}

/// Page allocator backed by the heap, handing out fake physical addresses.
pub struct TestPageAllocator {
    next: AtomicU32,
    live: Arc<AtomicU32>,
    fail: AtomicBool,
}

impl Default for TestPageAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU32::new(0x8000_0000),
            live: Arc::new(AtomicU32::new(0)),
            fail: AtomicBool::new(false),
        }
    }
}

impl TestPageAllocator {
    /// Number of pages allocated and not yet dropped.
    pub fn live_pages(&self) -> u32 {
        self.live.load(Ordering::SeqCst)
    }

    /// Makes further allocations fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

struct FakePage {
    phys: u32,
    words: SpinMutex<Vec<u32>>,
    live: Arc<AtomicU32>,
}

impl TablePage for FakePage {
    fn phys_addr(&self) -> u32 {
        self.phys
    }

    fn read(&self, index: usize) -> u32 {
        self.words.lock()[index]
    }

    fn write(&self, index: usize, value: u32) {
        self.words.lock()[index] = value;
    }
}

impl Drop for FakePage {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PageAllocator for TestPageAllocator {
    fn alloc_page(&self) -> Result<Box<dyn TablePage>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::NoMemory);
        }
        let phys = self.next.fetch_add(0x1000, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        // Fill with garbage, as real pages would be.
        Ok(Box::new(FakePage {
            phys,
            words: SpinMutex::new(vec![0xDEAD_BEEF; 1024]),
            live: self.live.clone(),
        }))
    }
}

/// Everything a test needs to create units and groups.
pub struct TestEnv {
    /// The fake platform.
    pub platform: TestPlatform,
    /// Driver context using the recording scheduler and work queue.
    pub ctx: Arc<DriverContext>,
    /// Recorded scheduler callbacks.
    pub scheduler: Arc<RecordingScheduler>,
    /// Recorded bottom halves.
    pub work: Arc<RecordingWork>,
    /// Page allocator.
    pub pages: Arc<TestPageAllocator>,
}

impl TestEnv {
    /// Creates an environment around the given platform, with the GPU powered on.
    pub fn new(platform: TestPlatform) -> Self {
        Self::with_job_ids(platform, JobIdAllocator::new())
    }

    /// Creates an environment with a specific job ID counter.
    pub fn with_job_ids(platform: TestPlatform, job_ids: JobIdAllocator) -> Self {
        let scheduler = Arc::new(RecordingScheduler::default());
        let work = Arc::new(RecordingWork::default());
        let ctx = Arc::new(DriverContext::with_job_ids(
            Config {
                poll_count_fast: 10,
                poll_count_slow: 10,
                l2_busy_poll_count: 10,
                ..Config::DEFAULT
            },
            scheduler.clone(),
            work.clone(),
            job_ids,
        ));
        ctx.set_power_on(true);
        Self {
            platform,
            ctx,
            scheduler,
            work,
            pages: Arc::new(TestPageAllocator::default()),
        }
    }
}

/// Log sink which writes to stdout, so logs show up for failing tests.
pub struct StdOutSink;

impl LogSink for StdOutSink {
    fn write_fmt(&self, args: fmt::Arguments) {
        let _ = stdout().write_fmt(args);
    }
}

static STDOUT_SINK: StdOutSink = StdOutSink;

/// Installs the logger, if no other test has already done so.
pub fn init_logger() {
    let _ = logger::init(&STDOUT_SINK);
}
