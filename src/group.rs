// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Groups: an MMU together with the GP core, a PP core or the broadcast PP core behind it, and
//! the state machine which runs jobs on them.
//!
//! All job state lives behind the group lock, and the cores are only programmed with it held.
//! The exception is the interrupt upper halves, which only read and mask interrupts before
//! handing over to a bottom half; see [`Group::upper_half_gp`] and friends.

mod interrupts;
mod membership;

use crate::{
    Error, Result,
    broadcast::BroadcastUnit,
    context::DriverContext,
    dlbu::Dlbu,
    gp::GpCore,
    gp_job::GpJob,
    l2_cache::L2Cache,
    mmu::MmuCore,
    platform::{Platform, TimeoutTimer},
    pm_domain::{PmDomain, PowerStateGuard},
    pp::{MAX_PP_CORES, PpCore},
    pp_job::PpJob,
    registry::MAX_GROUPS,
    session::Session,
};
use alloc::{boxed::Box, sync::Arc};
use arrayvec::ArrayVec;
use core::{
    fmt::{self, Display, Formatter, Write},
    ptr,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
};
use log::{debug, error, warn};
use spin::{
    Once,
    mutex::{SpinMutex, SpinMutexGuard},
};

/// Identifies a group, by its index in the registry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GroupId(pub u8);

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "group {}", self.0)
    }
}

/// Job slot state of a group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupState {
    /// No job is running.
    Idle,
    /// A job is running.
    Working,
    /// The running GP job ran out of heap and waits for
    /// [`LockedGroup::resume_gp_with_new_heap`].
    Oom,
    /// The group is a member of a virtual group, which runs jobs on its behalf.
    InVirtual,
    /// The scheduler has picked the group to join a virtual group.
    JoiningVirtual,
    /// The group has been taken out of a virtual group, and the scheduler must make it idle.
    LeavingVirtual,
    /// The group is not given jobs, and may be powered off.
    Disabled,
}

impl GroupState {
    /// Whether a group in this state is part of a virtual group, counting the transitions in and
    /// out.
    pub fn is_in_virtual(self) -> bool {
        matches!(
            self,
            Self::InVirtual | Self::JoiningVirtual | Self::LeavingVirtual
        )
    }
}

/// The deferred interrupt handlers of a group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BottomHalf {
    /// [`Group::bottom_half_mmu`].
    Mmu,
    /// [`Group::bottom_half_gp`].
    Gp,
    /// [`Group::bottom_half_pp`].
    Pp,
}

/// What a group runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupKind {
    /// GP jobs.
    Gp,
    /// PP sub jobs on one core.
    Pp,
    /// Virtual PP jobs, broadcast to every member.
    VirtualPp,
}

/// The cores behind a group's MMU.
pub enum GroupCores {
    /// A GP core.
    Gp(GpCore),
    /// A physical PP core.
    Pp(PpCore),
    /// The broadcast PP core of a Mali-450, with the units which fan jobs out to the members.
    VirtualPp {
        /// Broadcast PP core.
        pp: PpCore,
        /// Broadcast unit.
        bcast: BroadcastUnit,
        /// Dynamic load balancing unit.
        dlbu: Dlbu,
    },
}

/// Outcome of [`LockedGroup::activate_page_directory`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PageDirectoryActivation {
    /// Another session's page directory is in use, so the job can't run.
    Failed,
    /// The session's page directory was already active. The TLB still has to be zapped.
    Kept,
    /// The MMU was switched to the session's page directory.
    Switched,
}

/// An L2 cache in front of a group, with the number of virtual group members behind it.
struct L2Slot {
    cache: Arc<L2Cache>,
    ref_count: u32,
}

struct GroupInner {
    state: GroupState,
    session: Option<Arc<Session>>,
    page_dir_ref_count: u32,
    power_is_on: bool,
    gp_running_job: Option<Arc<GpJob>>,
    pp_running_job: Option<Arc<PpJob>>,
    pp_running_sub_job: u32,
    l2_caches: [Option<L2Slot>; 2],
    children: ArrayVec<Arc<Group>, MAX_PP_CORES>,
    parent: Option<GroupId>,
}

const NO_PARENT: u8 = u8::MAX;

/// A group.
pub struct Group {
    id: GroupId,
    ctx: Arc<DriverContext>,
    mmu: MmuCore,
    cores: GroupCores,
    l2: Option<Arc<L2Cache>>,
    timer: Box<dyn TimeoutTimer>,
    pm_domain: Once<Arc<PmDomain>>,
    core_timed_out: AtomicBool,
    /// Copies of the virtual membership, for upper halves which can't take the lock.
    in_virtual: AtomicBool,
    parent: AtomicU8,
    inner: SpinMutex<GroupInner>,
}

impl Group {
    /// Creates an idle, powered group from its MMU and cores. `l2` is the cache in front of a
    /// physical group; a virtual group tracks the caches of its members instead.
    pub fn create(
        platform: &dyn Platform,
        ctx: Arc<DriverContext>,
        id: GroupId,
        mmu: MmuCore,
        cores: GroupCores,
        l2: Option<Arc<L2Cache>>,
    ) -> Result<Self> {
        if usize::from(id.0) >= MAX_GROUPS {
            error!("Mali group: Too many group objects created");
            return Err(Error::NoMemory);
        }
        let timer = platform.create_timer(id)?;
        let is_virtual = matches!(cores, GroupCores::VirtualPp { .. });
        debug_assert!(!is_virtual || l2.is_none());
        debug!("Mali group: Creating {} on MMU {}", id, mmu.description());
        Ok(Self {
            id,
            ctx,
            mmu,
            cores,
            timer,
            pm_domain: Once::new(),
            core_timed_out: AtomicBool::new(false),
            in_virtual: AtomicBool::new(false),
            parent: AtomicU8::new(NO_PARENT),
            inner: SpinMutex::new(GroupInner {
                state: GroupState::Idle,
                session: None,
                page_dir_ref_count: 0,
                power_is_on: true,
                gp_running_job: None,
                pp_running_job: None,
                pp_running_sub_job: 0,
                l2_caches: [
                    l2.clone().map(|cache| L2Slot {
                        cache,
                        ref_count: 0,
                    }),
                    None,
                ],
                children: ArrayVec::new(),
                parent: None,
            }),
            l2,
        })
    }

    /// The group's ID.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// What the group runs.
    pub fn kind(&self) -> GroupKind {
        match self.cores {
            GroupCores::Gp(_) => GroupKind::Gp,
            GroupCores::Pp(_) => GroupKind::Pp,
            GroupCores::VirtualPp { .. } => GroupKind::VirtualPp,
        }
    }

    /// Whether this is a virtual group.
    pub fn is_virtual(&self) -> bool {
        self.kind() == GroupKind::VirtualPp
    }

    /// The group's MMU.
    pub fn mmu(&self) -> &MmuCore {
        &self.mmu
    }

    /// The GP core, for a GP group.
    pub fn gp_core(&self) -> Option<&GpCore> {
        match &self.cores {
            GroupCores::Gp(gp) => Some(gp),
            _ => None,
        }
    }

    /// The PP core, which is the broadcast PP core for a virtual group.
    pub fn pp_core(&self) -> Option<&PpCore> {
        match &self.cores {
            GroupCores::Pp(pp) | GroupCores::VirtualPp { pp, .. } => Some(pp),
            GroupCores::Gp(_) => None,
        }
    }

    fn virtual_units(&self) -> Option<(&BroadcastUnit, &Dlbu)> {
        match &self.cores {
            GroupCores::VirtualPp { bcast, dlbu, .. } => Some((bcast, dlbu)),
            _ => None,
        }
    }

    /// The L2 cache in front of a physical group.
    pub fn l2_cache(&self) -> Option<&Arc<L2Cache>> {
        self.l2.as_ref()
    }

    /// Places the group in a power domain.
    pub fn set_pm_domain(&self, domain: Arc<PmDomain>) {
        self.pm_domain.call_once(|| domain);
    }

    /// The group's power domain, if any.
    pub fn pm_domain(&self) -> Option<&Arc<PmDomain>> {
        self.pm_domain.get()
    }

    fn lock_power_state(&self) -> PowerStateGuard<'_> {
        PowerStateGuard::lock(self.pm_domain.get().map(|domain| &**domain))
    }

    /// Takes the group lock.
    pub fn lock(&self) -> LockedGroup<'_> {
        LockedGroup {
            group: self,
            inner: self.inner.lock(),
        }
    }

    /// Takes the group lock if it is free.
    pub fn try_lock(&self) -> Option<LockedGroup<'_>> {
        self.inner.try_lock().map(|inner| LockedGroup { group: self, inner })
    }

    /// Whether the group is part of a virtual group. Read without the lock, so it may be stale.
    pub fn is_in_virtual(&self) -> bool {
        self.in_virtual.load(Ordering::Acquire)
    }

    fn parent_hint(&self) -> Option<GroupId> {
        match self.parent.load(Ordering::Acquire) {
            NO_PARENT => None,
            id => Some(GroupId(id)),
        }
    }

    /// Whether the group may be given jobs.
    pub fn is_enabled(&self) -> bool {
        self.lock().state() != GroupState::Disabled
    }

    /// Hands the group back to its scheduler.
    pub fn enable(&self) {
        debug!("Mali group: Enabling {}", self.id);
        self.ctx.scheduler.enable_group(self);
    }

    /// Asks the scheduler to stop using the group.
    pub fn disable(&self) {
        debug!("Mali group: Disabling {}", self.id);
        self.ctx.scheduler.disable_group(self);
    }

    /// Records that the group's cores have been powered up.
    pub fn power_on_group(&self) {
        let mut group = self.lock();
        debug_assert!(!matches!(
            group.state(),
            GroupState::Working | GroupState::Oom
        ));
        debug!("Mali group: {} powered on", self.id);
        group.inner.power_is_on = true;
    }

    /// Records that the group's cores are being powered down. The session is forgotten, as the
    /// MMU loses its page directory.
    pub fn power_off_group(&self) {
        let mut group = self.lock();
        debug_assert!(!matches!(
            group.state(),
            GroupState::Working | GroupState::Oom
        ));
        debug!("Mali group: {} powered off", self.id);
        group.inner.session = None;
        group.inner.power_is_on = false;
    }

    /// Makes sure the MMU no longer uses stale translations of `session`, e.g. after memory was
    /// unmapped. A page fault while zapping fails the running job.
    pub fn zap_session(&self, session: &Session) {
        let mut group = self.lock();
        if !group.has_session(session) {
            return;
        }
        group.remove_session_if_unused(session);
        if group.has_session(session) && !self.mmu.zap_tlb() {
            group.mmu_page_fault();
        }
    }

    /// Aborts any job of `session` running on the group, as the session is going away, and
    /// stops using its page directory.
    pub fn abort_session(&self, session: &Session) {
        let mut group = self.lock();
        if group.state().is_in_virtual() {
            // The virtual group handles its members.
            return;
        }
        let gp_job = group
            .gp_running_job()
            .filter(|job| ptr::eq(&**job.session(), session))
            .map(|job| job.id());
        if let Some(id) = gp_job {
            debug!("Mali group: Aborting GP job {} of session {}", id, session.id());
            group.abort_gp_job(id);
        }
        let pp_job = group
            .pp_running_job()
            .filter(|(job, _)| ptr::eq(&**job.session(), session))
            .map(|(job, _)| job.id());
        if let Some(id) = pp_job {
            debug!("Mali group: Aborting PP job {} of session {}", id, session.id());
            group.abort_pp_job(id);
        }
        group.remove_session_if_unused(session);
    }

    /// Writes a description of the group's state.
    pub fn dump_state(&self, out: &mut dyn Write) -> fmt::Result {
        self.lock().dump_state(out)
    }
}

/// Marks every enabled group as powered, after the GPU has been powered up.
pub fn power_on(groups: &[Arc<Group>]) {
    for group in groups {
        if group.is_enabled() {
            group.power_on_group();
        }
    }
    debug!("Mali group: power on");
}

/// Marks every enabled group as powered off, before the GPU is powered down.
pub fn power_off(groups: &[Arc<Group>]) {
    for group in groups {
        if group.is_enabled() {
            group.power_off_group();
        }
    }
    debug!("Mali group: power off");
}

/// A locked group. Job state can only be read or changed through this.
pub struct LockedGroup<'a> {
    group: &'a Group,
    inner: SpinMutexGuard<'a, GroupInner>,
}

impl<'a> LockedGroup<'a> {
    /// The group.
    pub fn group(&self) -> &'a Group {
        self.group
    }

    /// The group's state.
    pub fn state(&self) -> GroupState {
        self.inner.state
    }

    /// Moves the group to a new state. The scheduler uses this for the transitions it owns:
    /// flagging a group as [`GroupState::JoiningVirtual`] before
    /// [`LockedGroup::add_group`], making a [`GroupState::LeavingVirtual`] group idle again, and
    /// enabling or disabling.
    pub fn set_state(&mut self, state: GroupState) {
        debug!(
            "Mali group: {} {:?} -> {:?}",
            self.group.id, self.inner.state, state
        );
        self.inner.state = state;
        self.group
            .in_virtual
            .store(state.is_in_virtual(), Ordering::Release);
    }

    /// The session whose page directory the MMU is using, if any.
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.inner.session.as_ref()
    }

    fn has_session(&self, session: &Session) -> bool {
        self.inner
            .session
            .as_ref()
            .is_some_and(|current| ptr::eq(&**current, session))
    }

    /// Number of running jobs using the session's page directory.
    pub fn page_dir_ref_count(&self) -> u32 {
        self.inner.page_dir_ref_count
    }

    /// Whether the group's cores are powered.
    pub fn power_is_on(&self) -> bool {
        self.inner.power_is_on
    }

    /// The running GP job.
    pub fn gp_running_job(&self) -> Option<&Arc<GpJob>> {
        self.inner.gp_running_job.as_ref()
    }

    /// The running PP job and sub job.
    pub fn pp_running_job(&self) -> Option<(&Arc<PpJob>, u32)> {
        self.inner
            .pp_running_job
            .as_ref()
            .map(|job| (job, self.inner.pp_running_sub_job))
    }

    /// The L2 caches in front of the group, with the number of virtual group members using each.
    pub fn l2_caches(&self) -> impl Iterator<Item = (&Arc<L2Cache>, u32)> {
        self.inner
            .l2_caches
            .iter()
            .flatten()
            .map(|slot| (&slot.cache, slot.ref_count))
    }

    /// Makes `session`'s page directory active for a job, and takes a reference on it.
    pub fn activate_page_directory(&mut self, session: &Arc<Session>) -> PageDirectoryActivation {
        debug!(
            "Mali group: Activating page directory {:#x} from session {} on {}",
            session.page_directory_address(),
            session.id(),
            self.group.id
        );
        let activation = if self.inner.page_dir_ref_count != 0 {
            if self.has_session(session) {
                PageDirectoryActivation::Kept
            } else {
                debug!(
                    "Mali group: Page directory of session {} is in use on {}",
                    self.inner.session.as_ref().map_or(0, |current| current.id()),
                    self.group.id
                );
                return PageDirectoryActivation::Failed;
            }
        } else if self.has_session(session) {
            PageDirectoryActivation::Kept
        } else {
            if !self
                .group
                .mmu
                .activate_page_directory(session.page_directory_address())
            {
                return PageDirectoryActivation::Failed;
            }
            self.inner.session = Some(session.clone());
            PageDirectoryActivation::Switched
        };
        self.inner.page_dir_ref_count += 1;
        activation
    }

    /// Drops the reference taken by [`LockedGroup::activate_page_directory`]. The page
    /// directory stays active until another session needs the MMU.
    pub fn deactivate_page_directory(&mut self, session: &Session) {
        debug_assert!(self.has_session(session));
        debug_assert!(self.inner.page_dir_ref_count > 0);
        self.inner.page_dir_ref_count = self.inner.page_dir_ref_count.saturating_sub(1);
    }

    fn remove_session_if_unused(&mut self, session: &Session) {
        if self.inner.page_dir_ref_count == 0 && self.has_session(session) {
            debug_assert!(self.inner.power_is_on);
            self.group.mmu.activate_empty_page_directory();
            self.inner.session = None;
        }
    }

    /// Starts a GP job on the idle group, and arms the watchdog.
    pub fn start_gp_job(&mut self, job: &Arc<GpJob>) -> Result<()> {
        debug_assert_eq!(self.inner.state, GroupState::Idle);
        debug_assert!(self.inner.power_is_on);
        let group = self.group;
        let Some(gp) = group.gp_core() else {
            error!("Mali group: GP job {} given to {}", job.id(), group.id);
            return Err(Error::InvalidArgs);
        };

        if let Some(slot) = &self.inner.l2_caches[0] {
            slot.cache.invalidate_conditional(job.id());
        }
        match self.activate_page_directory(job.session()) {
            PageDirectoryActivation::Failed => return Err(Error::Busy),
            PageDirectoryActivation::Kept => group.mmu.zap_tlb_without_stall(),
            PageDirectoryActivation::Switched => {}
        }

        gp.job_start(job);
        self.inner.gp_running_job = Some(job.clone());
        self.set_state(GroupState::Working);
        group.timer.arm(group.ctx.config.max_job_runtime_ms);
        Ok(())
    }

    /// Starts a PP sub job on the idle group, and arms the watchdog. A virtual group starts the
    /// job on all its members.
    pub fn start_pp_job(&mut self, job: &Arc<PpJob>, sub_job: u32) -> Result<()> {
        debug_assert_eq!(self.inner.state, GroupState::Idle);
        debug_assert!(self.inner.power_is_on);
        let group = self.group;
        let Some(pp) = group.pp_core() else {
            error!("Mali group: PP job {} given to {}", job.id(), group.id);
            return Err(Error::InvalidArgs);
        };
        debug_assert_eq!(job.is_virtual(), group.is_virtual());

        for slot in self.inner.l2_caches.iter().flatten() {
            slot.cache.invalidate_conditional(job.id());
        }
        match self.activate_page_directory(job.session()) {
            PageDirectoryActivation::Failed => return Err(Error::Busy),
            PageDirectoryActivation::Kept => group.mmu.zap_tlb_without_stall(),
            PageDirectoryActivation::Switched => {}
        }

        if let Some((_, dlbu)) = group.virtual_units() {
            dlbu.config_job(job);
            // The stack address is per core, so it can't be broadcast.
            for child_pp in self.inner.children.iter().filter_map(|child| child.pp_core()) {
                child_pp.write_addr_stack(job);
            }
        }
        pp.job_start(job, sub_job, false);

        self.inner.pp_running_job = Some(job.clone());
        self.inner.pp_running_sub_job = sub_job;
        self.set_state(GroupState::Working);
        group.timer.arm(group.ctx.config.max_job_runtime_ms);
        Ok(())
    }

    /// Lets the GP job which ran out of heap continue with a new heap. Returns the job, or
    /// `None` if `job_id` is no longer waiting, e.g. because it was aborted meanwhile.
    pub fn resume_gp_with_new_heap(
        &mut self,
        job_id: u32,
        start_addr: u32,
        end_addr: u32,
    ) -> Option<Arc<GpJob>> {
        if self.inner.state != GroupState::Oom {
            return None;
        }
        let job = self
            .inner
            .gp_running_job
            .clone()
            .filter(|job| job.id() == job_id)?;
        let gp = self.group.gp_core()?;

        if let Some(slot) = &self.inner.l2_caches[0]
            && let Err(e) = slot.cache.invalidate()
        {
            warn!("Mali group: Failed to invalidate L2 cache on heap resume: {}", e);
        }
        self.group.mmu.zap_tlb_without_stall();
        gp.resume_with_new_heap(start_addr, end_addr);
        self.set_state(GroupState::Working);
        Some(job)
    }

    /// Fails the GP job `job_id`, if it is still running.
    pub fn abort_gp_job(&mut self, job_id: u32) {
        if self.inner.state == GroupState::Idle
            || self.gp_running_job().is_none_or(|job| job.id() != job_id)
        {
            return;
        }
        self.complete(false);
    }

    /// Fails the PP job `job_id`, if it is still running.
    pub fn abort_pp_job(&mut self, job_id: u32) {
        if self.inner.state == GroupState::Idle
            || self.pp_running_job().is_none_or(|(job, _)| job.id() != job_id)
        {
            return;
        }
        self.complete(false);
    }

    fn mmu_page_fault(&mut self) {
        self.complete(false);
    }

    fn complete(&mut self, success: bool) {
        let group = self.group;
        match &group.cores {
            GroupCores::Gp(gp) => self.complete_gp(gp, success),
            GroupCores::Pp(pp) | GroupCores::VirtualPp { pp, .. } => self.complete_pp(pp, success),
        }
    }

    /// Finishes the running GP job and reports it to the scheduler. Successful jobs are followed
    /// by a soft reset; failed ones, or a failing soft reset, by a recovery reset.
    fn complete_gp(&mut self, gp: &GpCore, success: bool) {
        self.group.timer.cancel_async();
        let job = self.inner.gp_running_job.take();
        if let Some(job) = &job {
            gp.update_performance_counters(job);
            job.set_heap_current_addr(gp.read_plbu_alloc_start_addr());
        }
        if success {
            gp.reset_async();
        }

        // A stray interrupt with nothing running still resets the core, but leaves the state.
        if let Some(job) = &job {
            self.set_state(GroupState::Idle);
            self.deactivate_page_directory(job.session());
        }

        if !success || gp.reset_wait().is_err() {
            debug!("Mali group: Resetting all of {}", self.group.id);
            self.recovery_reset();
        }

        if let Some(job) = job {
            let group = self.group;
            group.ctx.scheduler.gp_job_done(self, job, success);
        }
    }

    /// Finishes the running PP sub job and reports it to the scheduler, like
    /// [`LockedGroup::complete_gp`].
    fn complete_pp(&mut self, pp: &PpCore, success: bool) {
        self.group.timer.cancel_async();
        let job = self.inner.pp_running_job.take();
        let sub_job = self.inner.pp_running_sub_job;
        if let Some(job) = &job {
            self.update_pp_counters(pp, job, sub_job);
        }
        if success {
            pp.reset_async();
        }

        if let Some(job) = &job {
            self.set_state(GroupState::Idle);
            self.deactivate_page_directory(job.session());
        }

        if !success || pp.reset_wait().is_err() {
            debug!("Mali group: Resetting all of {}", self.group.id);
            self.recovery_reset();
        }

        if let Some(job) = job {
            let group = self.group;
            group
                .ctx
                .scheduler
                .pp_job_done(self, job, sub_job, success);
        }
    }

    fn update_pp_counters(&self, pp: &PpCore, job: &PpJob, sub_job: u32) {
        if self.group.is_virtual() {
            // Each member's counters go to the slot of its core.
            for child_pp in self.inner.children.iter().filter_map(|child| child.pp_core()) {
                pp.update_performance_counters(child_pp, job, child_pp.core_id());
            }
        } else {
            pp.update_performance_counters(pp, job, sub_job);
        }
    }

    /// Stops and hard resets everything in the group, clearing any page fault. This is the only
    /// way out of a page fault or a hung core.
    fn recovery_reset(&mut self) {
        let group = self.group;
        match &group.cores {
            GroupCores::Gp(gp) => gp.stop_bus(),
            GroupCores::Pp(pp) | GroupCores::VirtualPp { pp, .. } => pp.stop_bus(),
        }

        // The fault flush tables map everything, so outstanding accesses can drain.
        group.mmu.activate_fault_flush_page_directory();
        group.mmu.page_fault_done();

        match &group.cores {
            GroupCores::VirtualPp { bcast, .. } => {
                // Members are reset one by one.
                bcast.disable();
                for child_pp in self.inner.children.iter().filter_map(|child| child.pp_core()) {
                    if child_pp.stop_bus_wait().is_err() {
                        warn!(
                            "Mali group: {} did not stop its bus, resetting anyway",
                            child_pp.description()
                        );
                    }
                    child_pp.hard_reset();
                }
                bcast.reset();
            }
            GroupCores::Gp(gp) => {
                if gp.stop_bus_wait().is_err() {
                    warn!("Mali group: GP did not stop its bus, resetting anyway");
                }
                gp.hard_reset();
            }
            GroupCores::Pp(pp) => {
                if pp.stop_bus_wait().is_err() {
                    warn!(
                        "Mali group: {} did not stop its bus, resetting anyway",
                        pp.description()
                    );
                }
                pp.hard_reset();
            }
        }

        if let Err(e) = self.reset_mmu() {
            error!("Mali group: Failed to reset MMU of {}: {}", group.id, e);
        }
        self.inner.session = None;
    }

    /// Resets the MMU of a physical group. For a virtual group the broadcast MMU is tried
    /// first, then each member's MMU.
    fn reset_mmu(&self) -> Result<()> {
        let result = self.group.mmu.reset();
        if !self.group.is_virtual() || result.is_ok() {
            return result;
        }
        self.inner
            .children
            .iter()
            .try_for_each(|child| child.mmu.reset())
    }

    fn reset_pp(&self, pp: &PpCore) -> Result<()> {
        pp.reset_async();
        if !self.group.is_virtual() || self.inner.pp_running_job.is_none() {
            return pp.reset_wait();
        }
        self.inner
            .children
            .iter()
            .filter_map(|child| child.pp_core())
            .try_for_each(PpCore::reset_wait)
    }

    /// Resets every unit in the idle group and forgets the session, e.g. after the GPU has been
    /// powered up.
    pub fn reset(&mut self) -> Result<()> {
        debug_assert!(self.inner.gp_running_job.is_none());
        debug_assert!(self.inner.pp_running_job.is_none());
        debug!("Mali group: Resetting {}", self.group.id);
        self.inner.session = None;
        self.inner.page_dir_ref_count = 0;

        let group = self.group;
        if let Some((bcast, dlbu)) = group.virtual_units() {
            dlbu.reset();
            bcast.reset();
        }
        self.reset_mmu()?;
        match &group.cores {
            GroupCores::Gp(gp) => gp.reset(),
            GroupCores::Pp(pp) | GroupCores::VirtualPp { pp, .. } => self.reset_pp(pp),
        }
    }

    /// Writes a description of the group's state.
    pub fn dump_state(&self, out: &mut dyn Write) -> fmt::Result {
        writeln!(out, "Group: {} ({:?})", self.group.id, self.group.kind())?;
        writeln!(out, "\tstate: {:?}", self.inner.state)?;
        if let Some(gp) = self.group.gp_core() {
            writeln!(out, "\tGP core: {}", gp.description())?;
            writeln!(
                out,
                "\tGP job: {:?}",
                self.inner.gp_running_job.as_ref().map(|job| job.id())
            )?;
        }
        if let Some(pp) = self.group.pp_core() {
            writeln!(out, "\tPP core: {}", pp.description())?;
            writeln!(
                out,
                "\tPP job: {:?}, subjob {}",
                self.inner.pp_running_job.as_ref().map(|job| job.id()),
                self.inner.pp_running_sub_job
            )?;
        }
        if let Some(parent) = self.inner.parent {
            writeln!(out, "\tmember of {}", parent)?;
        }
        for child in &self.inner.children {
            writeln!(out, "\tmember: {}", child.id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gp_job::GpJobArgs,
        page_directory::MmuTables,
        platform::test::{
            GPU_BASE, PP_MMU_OFFSETS, PP_OFFSETS, SchedulerEvent, TestEnv, TestPlatform,
        },
        pp_job::PpJobArgs,
    };
    use alloc::{string::String, vec::Vec};
    use mali_regs::{gp, mmu, pp};

    pub(super) const GP_MMU_OFFSET: u64 = 0x3000;
    pub(super) const L2_OFFSET: u64 = 0x1000;

    /// A test environment with the MMU tables every group needs.
    pub(super) struct Fixture {
        pub env: TestEnv,
        pub tables: MmuTables,
    }

    impl Fixture {
        pub fn new(platform: TestPlatform) -> Self {
            let env = TestEnv::new(platform);
            let tables = MmuTables::new(env.pages.as_ref()).unwrap();
            Self { env, tables }
        }

        pub fn mmu(&self, offset: u64, is_virtual: bool) -> MmuCore {
            let resource = self
                .env
                .platform
                .find_resource(GPU_BASE + offset)
                .unwrap();
            MmuCore::create(
                &self.env.platform,
                &resource,
                &self.tables,
                &self.env.ctx.config,
                is_virtual,
            )
            .unwrap()
        }

        pub fn l2(&self, offset: u64, core_id: usize) -> Arc<L2Cache> {
            let resource = self
                .env
                .platform
                .find_resource(GPU_BASE + offset)
                .unwrap();
            Arc::new(
                L2Cache::create(&self.env.platform, &resource, self.env.ctx.clone(), core_id)
                    .unwrap(),
            )
        }

        pub fn gp_group(&self, id: u8) -> Group {
            let resource = self.env.platform.find_resource(GPU_BASE).unwrap();
            let gp = GpCore::create(&self.env.platform, &resource, &self.env.ctx.config).unwrap();
            Group::create(
                &self.env.platform,
                self.env.ctx.clone(),
                GroupId(id),
                self.mmu(GP_MMU_OFFSET, false),
                GroupCores::Gp(gp),
                Some(self.l2(L2_OFFSET, 0)),
            )
            .unwrap()
        }

        pub fn pp_group(&self, id: u8, index: usize, l2: &Arc<L2Cache>) -> Arc<Group> {
            let resource = self
                .env
                .platform
                .find_resource(GPU_BASE + PP_OFFSETS[index])
                .unwrap();
            let pp = PpCore::create(
                &self.env.platform,
                &resource,
                &self.env.ctx.config,
                index as u32,
                false,
                1 << index,
            )
            .unwrap();
            Arc::new(
                Group::create(
                    &self.env.platform,
                    self.env.ctx.clone(),
                    GroupId(id),
                    self.mmu(PP_MMU_OFFSETS[index], false),
                    GroupCores::Pp(pp),
                    Some(l2.clone()),
                )
                .unwrap(),
            )
        }

        pub fn session(&self) -> Arc<Session> {
            Arc::new(Session::new(self.env.pages.clone()).unwrap())
        }

        pub fn gp_job(&self, session: &Arc<Session>) -> Arc<GpJob> {
            let args = GpJobArgs {
                frame_registers: [0x10, 0x20, 0x30, 0x40, 0x50, 0x60],
                ..Default::default()
            };
            Arc::new(GpJob::new(&self.env.ctx, session.clone(), args))
        }

        pub fn pp_job(
            &self,
            session: &Arc<Session>,
            num_cores: u32,
            is_virtual: bool,
        ) -> Arc<PpJob> {
            let mut args = PpJobArgs {
                num_cores,
                ..Default::default()
            };
            args.frame_registers[0] = 0x1000;
            for i in 0..args.frame_registers_addr_frame.len() {
                args.frame_registers_addr_frame[i] = 0x1100 + 0x100 * i as u32;
                args.frame_registers_addr_stack[i] = 0x2100 + 0x100 * i as u32;
            }
            Arc::new(PpJob::new(&self.env.ctx, session.clone(), args, is_virtual).unwrap())
        }
    }

    /// Makes the GP device report a cleanly finished job.
    pub(super) fn finish_gp(fixture: &Fixture) {
        let device = fixture.env.platform.gpu_device(0);
        device.set(gp::STATUS, 0);
        device.set_bits(gp::INT_RAWSTAT, gp::Interrupt::END_BITS.bits());
    }

    #[test]
    fn gp_job_runs_to_completion() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let session = fixture.session();
        let job = fixture.gp_job(&session);
        let timer = fixture.env.platform.timer(GroupId(0));
        let mmu_device = fixture.env.platform.gpu_device(GP_MMU_OFFSET);

        let mut locked = group.lock();
        assert_eq!(
            locked.activate_page_directory(&session),
            PageDirectoryActivation::Switched
        );
        locked.deactivate_page_directory(&session);
        assert_eq!(locked.page_dir_ref_count(), 0);
        // The page directory stays active after its last user is gone.
        assert!(locked.session().is_some());
        assert_eq!(
            mmu_device.read(mmu::DTE_ADDR),
            session.page_directory_address()
        );
        drop(locked);

        let mut locked = group.lock();
        locked.start_gp_job(&job).unwrap();
        assert_eq!(locked.state(), GroupState::Working);
        assert_eq!(locked.page_dir_ref_count(), 1);
        assert_eq!(timer.armed_ms(), 4000);
        assert!(timer.pending());
        drop(locked);

        finish_gp(&fixture);
        let gp_device = fixture.env.platform.gpu_device(0);
        gp_device.clear_writes();
        assert!(group.upper_half_gp());
        assert_eq!(fixture.env.work.take(), vec![(GroupId(0), BottomHalf::Gp)]);
        group.bottom_half_gp();

        assert_eq!(
            fixture.env.scheduler.take(),
            vec![SchedulerEvent::GpDone {
                job: job.id(),
                success: true,
                state: GroupState::Idle,
            }]
        );
        let locked = group.lock();
        assert!(locked.gp_running_job().is_none());
        assert_eq!(locked.page_dir_ref_count(), 0);
        assert!(!timer.pending());
        assert_eq!(timer.cancel_count(), 1);
        // Soft reset only.
        assert!(
            gp_device
                .writes_to(gp::CMD)
                .contains(&gp::Command::SOFT_RESET.bits())
        );
        assert!(gp_device.writes_to(gp::WRITE_BOUND_LOW).is_empty());
        // Heap position is saved for the client.
        assert_eq!(job.heap_current_addr(), 0x50);
    }

    #[test]
    fn first_job_switches_page_directory() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let session = fixture.session();
        let mmu_device = fixture.env.platform.gpu_device(GP_MMU_OFFSET);
        mmu_device.clear_writes();

        let job = fixture.gp_job(&session);
        group.lock().start_gp_job(&job).unwrap();
        assert_eq!(
            mmu_device.read(mmu::DTE_ADDR),
            session.page_directory_address()
        );
        assert!(
            mmu_device
                .writes_to(mmu::COMMAND)
                .contains(&(mmu::Command::EnableStall as u32))
        );
        assert_eq!(group.lock().session().map(|s| s.id()), Some(session.id()));
    }

    #[test]
    fn second_job_keeps_page_directory_and_zaps() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let session = fixture.session();
        let first = fixture.gp_job(&session);
        group.lock().start_gp_job(&first).unwrap();
        finish_gp(&fixture);
        group.bottom_half_gp();

        let mmu_device = fixture.env.platform.gpu_device(GP_MMU_OFFSET);
        mmu_device.clear_writes();
        let second = fixture.gp_job(&session);
        let mut locked = group.lock();
        locked.start_gp_job(&second).unwrap();
        assert_eq!(locked.state(), GroupState::Working);
        // Only a zap, without stall and without a page directory write.
        assert_eq!(
            mmu_device.writes(),
            vec![(mmu::COMMAND, mmu::Command::ZapCache as u32)]
        );
    }

    #[test]
    fn page_directory_references_are_counted() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let first = fixture.session();
        let second = fixture.session();

        let mut locked = group.lock();
        assert_eq!(
            locked.activate_page_directory(&first),
            PageDirectoryActivation::Switched
        );
        assert_eq!(
            locked.activate_page_directory(&first),
            PageDirectoryActivation::Kept
        );
        assert_eq!(locked.page_dir_ref_count(), 2);
        assert_eq!(
            locked.activate_page_directory(&second),
            PageDirectoryActivation::Failed
        );
        assert_eq!(locked.page_dir_ref_count(), 2);

        locked.deactivate_page_directory(&first);
        locked.deactivate_page_directory(&first);
        assert_eq!(locked.page_dir_ref_count(), 0);
        assert_eq!(
            locked.activate_page_directory(&second),
            PageDirectoryActivation::Switched
        );
        assert_eq!(locked.session().map(|s| s.id()), Some(second.id()));
        assert_eq!(locked.page_dir_ref_count(), 1);
    }

    #[test]
    fn unrecognised_interrupt_takes_recovery_path() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let session = fixture.session();
        let job = fixture.gp_job(&session);
        group.lock().start_gp_job(&job).unwrap();

        let gp_device = fixture.env.platform.gpu_device(0);
        gp_device.clear_writes();
        gp_device.set_bits(gp::INT_RAWSTAT, gp::Interrupt::AXI_BUS_ERROR.bits());
        group.bottom_half_gp();

        assert_eq!(
            fixture.env.scheduler.take(),
            vec![SchedulerEvent::GpDone {
                job: job.id(),
                success: false,
                state: GroupState::Idle,
            }]
        );
        let commands = gp_device.writes_to(gp::CMD);
        assert!(!commands.contains(&gp::Command::SOFT_RESET.bits()));
        assert!(commands.contains(&gp::Command::STOP_BUS.bits()));
        assert!(commands.contains(&gp::Command::RESET.bits()));
        let locked = group.lock();
        assert_eq!(locked.state(), GroupState::Idle);
        assert!(locked.session().is_none());
        assert_eq!(locked.page_dir_ref_count(), 0);
    }

    #[test]
    fn completion_is_reported_once() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let session = fixture.session();
        let job = fixture.gp_job(&session);
        group.lock().start_gp_job(&job).unwrap();
        finish_gp(&fixture);
        group.bottom_half_gp();
        assert_eq!(fixture.env.scheduler.take().len(), 1);

        // A late abort and a repeated bottom half find nothing to complete.
        group.lock().abort_gp_job(job.id());
        group.bottom_half_gp();
        assert!(fixture.env.scheduler.take().is_empty());
        assert_eq!(group.lock().state(), GroupState::Idle);
    }

    #[test]
    fn abort_session_fails_only_its_jobs() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let owner = fixture.session();
        let other = fixture.session();
        let job = fixture.gp_job(&owner);
        group.lock().start_gp_job(&job).unwrap();

        group.abort_session(&other);
        assert!(fixture.env.scheduler.take().is_empty());
        assert_eq!(group.lock().state(), GroupState::Working);

        group.abort_session(&owner);
        assert_eq!(
            fixture.env.scheduler.take(),
            vec![SchedulerEvent::GpDone {
                job: job.id(),
                success: false,
                state: GroupState::Idle,
            }]
        );
        assert!(group.lock().session().is_none());
    }

    #[test]
    fn zap_session_drops_unused_page_directory() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let session = fixture.session();
        let mut locked = group.lock();
        locked.activate_page_directory(&session);
        locked.deactivate_page_directory(&session);
        drop(locked);

        group.zap_session(&session);
        assert!(group.lock().session().is_none());
        let mmu_device = fixture.env.platform.gpu_device(GP_MMU_OFFSET);
        assert_eq!(
            mmu_device.read(mmu::DTE_ADDR),
            fixture.tables.empty_page_directory()
        );
    }

    #[test]
    fn zap_session_zaps_active_page_directory() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let session = fixture.session();
        let job = fixture.gp_job(&session);
        group.lock().start_gp_job(&job).unwrap();

        let mmu_device = fixture.env.platform.gpu_device(GP_MMU_OFFSET);
        mmu_device.clear_writes();
        group.zap_session(&session);
        assert!(
            mmu_device
                .writes_to(mmu::COMMAND)
                .contains(&(mmu::Command::ZapCache as u32))
        );
        assert_eq!(group.lock().state(), GroupState::Working);
        assert!(fixture.env.scheduler.take().is_empty());
    }

    #[test]
    fn pp_job_invalidates_l2_once() {
        let fixture = Fixture::new(TestPlatform::mali400(2));
        let l2 = fixture.l2(L2_OFFSET, 0);
        let pp0 = fixture.pp_group(1, 0, &l2);
        let pp1 = fixture.pp_group(2, 1, &l2);
        let session = fixture.session();
        let job = fixture.pp_job(&session, 2, false);

        pp0.lock().start_pp_job(&job, 0).unwrap();
        let invalidated = l2.last_invalidated_id();
        assert!(invalidated > job.id());
        pp1.lock().start_pp_job(&job, 1).unwrap();
        assert_eq!(l2.last_invalidated_id(), invalidated);

        let device = fixture.env.platform.gpu_device(PP_OFFSETS[1]);
        assert_eq!(device.read(pp::FRAME), 0x1100);
        assert_eq!(device.read(pp::STACK), 0x2100);
        assert_eq!(pp1.lock().pp_running_job().map(|(_, sub)| sub), Some(1));
    }

    #[test]
    fn one_job_slot_per_group() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let l2 = fixture.l2(L2_OFFSET, 0);
        let pp = fixture.pp_group(1, 0, &l2);
        let session = fixture.session();

        let pp_job = fixture.pp_job(&session, 1, false);
        assert_eq!(
            group.lock().start_pp_job(&pp_job, 0),
            Err(Error::InvalidArgs)
        );
        let gp_job = fixture.gp_job(&session);
        assert_eq!(pp.lock().start_gp_job(&gp_job), Err(Error::InvalidArgs));

        fn check(locked: &LockedGroup) {
            let running = usize::from(locked.gp_running_job().is_some())
                + usize::from(locked.pp_running_job().is_some());
            assert!(running <= 1);
            assert_eq!(locked.state() == GroupState::Working, running == 1);
        }
        check(&group.lock());
        group.lock().start_gp_job(&gp_job).unwrap();
        pp.lock().start_pp_job(&pp_job, 0).unwrap();
        check(&group.lock());
        check(&pp.lock());
    }

    #[test]
    fn power_off_forgets_session() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = Arc::new(fixture.gp_group(0));
        let session = fixture.session();
        let mut locked = group.lock();
        locked.activate_page_directory(&session);
        locked.deactivate_page_directory(&session);
        drop(locked);

        power_off(&[group.clone()]);
        assert!(!group.lock().power_is_on());
        assert!(group.lock().session().is_none());
        power_on(&[group.clone()]);
        assert!(group.lock().power_is_on());

        // Disabled groups are left alone.
        group.lock().set_state(GroupState::Disabled);
        power_off(&[group.clone()]);
        assert!(group.lock().power_is_on());
    }

    #[test]
    fn enable_and_disable_go_through_scheduler() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(3);
        assert!(group.is_enabled());
        group.disable();
        group.enable();
        assert_eq!(
            fixture.env.scheduler.take(),
            vec![
                SchedulerEvent::Disable(GroupId(3)),
                SchedulerEvent::Enable(GroupId(3))
            ]
        );
        group.lock().set_state(GroupState::Disabled);
        assert!(!group.is_enabled());
    }

    #[test]
    fn too_many_groups() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let resource = fixture.env.platform.find_resource(GPU_BASE).unwrap();
        let gp = GpCore::create(&fixture.env.platform, &resource, &fixture.env.ctx.config).unwrap();
        let result = Group::create(
            &fixture.env.platform,
            fixture.env.ctx.clone(),
            GroupId(MAX_GROUPS as u8),
            fixture.mmu(GP_MMU_OFFSET, false),
            GroupCores::Gp(gp),
            None,
        );
        assert!(matches!(result, Err(Error::NoMemory)));
    }

    #[test]
    fn reset_clears_session() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let session = fixture.session();
        let mut locked = group.lock();
        locked.activate_page_directory(&session);
        locked.deactivate_page_directory(&session);
        locked.reset().unwrap();
        assert!(locked.session().is_none());
        let mmu_device = fixture.env.platform.gpu_device(GP_MMU_OFFSET);
        assert_eq!(
            mmu_device.read(mmu::DTE_ADDR),
            fixture.tables.empty_page_directory()
        );
    }

    #[test]
    fn dump_state_names_job() {
        let fixture = Fixture::new(TestPlatform::mali400(1));
        let group = fixture.gp_group(0);
        let session = fixture.session();
        let job = fixture.gp_job(&session);
        group.lock().start_gp_job(&job).unwrap();

        let mut out = String::new();
        group.dump_state(&mut out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Group: group 0 (Gp)");
        assert_eq!(lines[1], "\tstate: Working");
        assert_eq!(lines[3], alloc::format!("\tGP job: Some({})", job.id()));
    }
}
