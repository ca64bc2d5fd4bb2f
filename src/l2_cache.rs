// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! L2 cache: invalidation, which is skipped when a later job has already invalidated the cache,
//! and performance counters.

use crate::{
    Error, Result,
    context::DriverContext,
    hw_core::{HwCore, Resource},
    platform::Platform,
    pm_domain::{PmDomain, PowerStateGuard},
};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};
use log::{debug, error};
use mali_regs::{
    NO_COUNTER,
    l2::{self, Enable, Status},
};
use spin::{Once, mutex::SpinMutex};

/// Maximum number of L2 caches in one GPU.
pub const MAX_L2_CACHES: usize = 3;

/// Selected performance counter sources.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct CounterSources {
    src0: u32,
    src1: u32,
}

/// Performance counter readout of an L2 cache. Values are only read for counters with a source
/// selected, and are 0 otherwise.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CounterValues {
    /// Source of counter 0, or [`NO_COUNTER`].
    pub src0: u32,
    /// Value of counter 0.
    pub value0: u32,
    /// Source of counter 1, or [`NO_COUNTER`].
    pub src1: u32,
    /// Value of counter 1.
    pub value1: u32,
}

/// An L2 cache unit, shared by all groups behind it.
pub struct L2Cache {
    hw: HwCore,
    core_id: usize,
    ctx: Arc<DriverContext>,
    /// Serialises commands, which the hardware drops while busy.
    command_lock: SpinMutex<()>,
    counters: SpinMutex<CounterSources>,
    last_invalidated_id: AtomicU32,
    pm_domain: Once<Arc<PmDomain>>,
}

impl L2Cache {
    /// Maps and resets the cache described by `resource`. `core_id` is its index among all
    /// caches.
    pub fn create(
        platform: &dyn Platform,
        resource: &Resource,
        ctx: Arc<DriverContext>,
        core_id: usize,
    ) -> Result<Self> {
        debug!(
            "Mali L2 cache: Creating Mali L2 cache: {}",
            resource.description
        );
        if core_id >= MAX_L2_CACHES {
            error!("Mali L2 cache: Too many L2 cache core objects created");
            return Err(Error::NoMemory);
        }
        let cache = Self {
            hw: HwCore::create(platform, resource, l2::REGISTERS_SIZE)?,
            core_id,
            ctx,
            command_lock: SpinMutex::new(()),
            counters: SpinMutex::new(CounterSources {
                src0: NO_COUNTER,
                src1: NO_COUNTER,
            }),
            last_invalidated_id: AtomicU32::new(0),
            pm_domain: Once::new(),
        };
        cache.reset();
        Ok(cache)
    }

    /// Index of this cache among all caches.
    pub fn core_id(&self) -> usize {
        self.core_id
    }

    /// Name of the unit.
    pub fn description(&self) -> &'static str {
        self.hw.description()
    }

    /// Places the cache in a power domain.
    pub fn set_pm_domain(&self, domain: Arc<PmDomain>) {
        self.pm_domain.call_once(|| domain);
    }

    /// The power domain the cache is in, if any.
    pub fn pm_domain(&self) -> Option<&Arc<PmDomain>> {
        self.pm_domain.get()
    }

    /// Locks the cache's power state. A cache without a power domain is always powered.
    pub fn lock_power_state(&self) -> PowerStateGuard<'_> {
        PowerStateGuard::lock(self.pm_domain.get().map(|domain| &**domain))
    }

    /// The ID of the job which last invalidated the cache.
    pub fn last_invalidated_id(&self) -> u32 {
        self.last_invalidated_id.load(Ordering::Acquire)
    }

    fn send_command(&self, offset: u32, value: u32) -> Result<()> {
        let _guard = self.command_lock.lock();
        let idle = self
            .hw
            .poll(l2::STATUS, self.ctx.config.l2_busy_poll_count, |status| {
                !Status::from_bits_retain(status).contains(Status::COMMAND_BUSY)
            });
        if idle.is_none() {
            debug!(
                "Mali L2 cache: {} busy, command {:#x} to {:#x} dropped",
                self.hw.description(),
                value,
                offset
            );
            return Err(Error::Fault);
        }
        self.hw.write(offset, value);
        Ok(())
    }

    /// Clears the cache and restores its configuration and counter sources, which are lost when
    /// it is powered down.
    pub fn reset(&self) {
        if self.send_command(l2::COMMAND, l2::COMMAND_CLEAR_ALL).is_err() {
            error!(
                "Mali L2 cache: Failed to clear {} during reset",
                self.hw.description()
            );
        }
        self.hw.write(
            l2::ENABLE,
            (Enable::ACCESS | Enable::READ_ALLOCATE).bits(),
        );
        self.hw.write(l2::MAX_READS, self.ctx.config.l2_max_reads);

        let counters = self.counters.lock();
        if counters.src0 != NO_COUNTER {
            self.hw.write(l2::PERFCNT_SRC0, counters.src0);
        }
        if counters.src1 != NO_COUNTER {
            self.hw.write(l2::PERFCNT_SRC1, counters.src1);
        }
    }

    /// Invalidates the whole cache and records a fresh ID as the last invalidation.
    pub fn invalidate(&self) -> Result<()> {
        self.last_invalidated_id
            .store(self.ctx.job_ids.new_id(), Ordering::Release);
        self.send_command(l2::COMMAND, l2::COMMAND_CLEAR_ALL)
    }

    /// Invalidates the cache for the job with the given ID, unless it was already invalidated
    /// after that job was created. Returns whether an invalidation was issued.
    ///
    /// IDs are compared as signed values, so the comparison goes wrong once the job ID counter
    /// passes `i32::MAX`.
    pub fn invalidate_conditional(&self, id: u32) -> bool {
        if (id as i32) <= (self.last_invalidated_id() as i32) {
            return false;
        }
        if let Err(e) = self.invalidate() {
            error!(
                "Mali L2 cache: Failed to invalidate {}: {}",
                self.hw.description(),
                e
            );
        }
        true
    }

    /// Invalidates the given pages.
    pub fn invalidate_pages(&self, pages: &[u32]) -> Result<()> {
        for page in pages {
            self.send_command(l2::CLEAR_PAGE, *page)?;
        }
        Ok(())
    }

    /// Selects the source of performance counter 0, or disables it with [`NO_COUNTER`].
    pub fn set_counter_src0(&self, source: u32) {
        let power = self.lock_power_state();
        let mut counters = self.counters.lock();
        counters.src0 = source;
        if power.is_on() {
            self.hw.write(l2::PERFCNT_SRC0, counter_register(source));
        }
    }

    /// Selects the source of performance counter 1, or disables it with [`NO_COUNTER`].
    pub fn set_counter_src1(&self, source: u32) {
        let power = self.lock_power_state();
        let mut counters = self.counters.lock();
        counters.src1 = source;
        if power.is_on() {
            self.hw.write(l2::PERFCNT_SRC1, counter_register(source));
        }
    }

    /// Source of performance counter 0.
    pub fn counter_src0(&self) -> u32 {
        self.counters.lock().src0
    }

    /// Source of performance counter 1.
    pub fn counter_src1(&self) -> u32 {
        self.counters.lock().src1
    }

    /// Reads both performance counters.
    pub fn counter_values(&self) -> CounterValues {
        let counters = self.counters.lock();
        let read = |source: u32, offset: u32| {
            if source == NO_COUNTER {
                0
            } else {
                self.hw.read(offset)
            }
        };
        CounterValues {
            src0: counters.src0,
            value0: read(counters.src0, l2::PERFCNT_VAL0),
            src1: counters.src1,
            value1: read(counters.src1, l2::PERFCNT_VAL1),
        }
    }
}

impl Drop for L2Cache {
    fn drop(&mut self) {
        self.hw.write(l2::MAX_READS, self.ctx.config.l2_max_reads);
        self.hw.write(l2::ENABLE, Enable::empty().bits());
    }
}

fn counter_register(source: u32) -> u32 {
    if source == NO_COUNTER { 0 } else { source }
}

/// Resets every cache, e.g. after the GPU has been powered up.
pub fn reset_all(caches: &[Arc<L2Cache>]) {
    for cache in caches {
        cache.reset();
    }
}

/// Invalidates every powered cache.
pub fn invalidate_all(caches: &[Arc<L2Cache>]) {
    for cache in caches {
        let power = cache.lock_power_state();
        if power.is_on() && cache.invalidate().is_err() {
            error!("Mali L2 cache: Failed to invalidate all caches");
        }
    }
}

/// Invalidates the given pages in every powered cache.
pub fn invalidate_all_pages(caches: &[Arc<L2Cache>], pages: &[u32]) {
    for cache in caches {
        let power = cache.lock_power_state();
        if power.is_on() && cache.invalidate_pages(pages).is_err() {
            error!("Mali L2 cache: Failed to invalidate page in cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        platform::test::{Model, TestEnv, TestPlatform},
        pm_domain::DomainId,
        scheduler::JobIdAllocator,
    };
    use mali_regs::pmu::DOMAIN_1;

    const BASE: u64 = 0x4000_1000;

    fn create(env: &TestEnv) -> L2Cache {
        env.platform.add_resource(BASE, "Mali_L2", Model::L2);
        L2Cache::create(&env.platform, &env.platform.find_resource(BASE).unwrap(), env.ctx.clone(), 0)
            .unwrap()
    }

    #[test]
    fn create_resets_cache() {
        let env = TestEnv::new(TestPlatform::new());
        let cache = create(&env);
        let device = env.platform.device(BASE);
        assert_eq!(device.writes_to(l2::COMMAND), vec![l2::COMMAND_CLEAR_ALL]);
        assert_eq!(device.read(l2::ENABLE), 0x3);
        assert_eq!(device.read(l2::MAX_READS), 0x1C);
        assert_eq!(cache.last_invalidated_id(), 0);
    }

    #[test]
    fn later_invalidation_covers_earlier_job() {
        let env = TestEnv::new(TestPlatform::new());
        let cache = create(&env);
        let device = env.platform.device(BASE);
        for _ in 0..5 {
            env.ctx.job_ids.new_id();
        }
        device.clear_writes();

        assert!(cache.invalidate_conditional(5));
        let last = cache.last_invalidated_id();
        assert_eq!(last, 6);
        assert_eq!(device.writes_to(l2::COMMAND).len(), 1);

        assert!(!cache.invalidate_conditional(3));
        assert_eq!(cache.last_invalidated_id(), last);
        assert_eq!(device.writes_to(l2::COMMAND).len(), 1);

        assert!(!cache.invalidate_conditional(6));
        assert!(cache.invalidate_conditional(7));
        assert_eq!(device.writes_to(l2::COMMAND).len(), 2);
    }

    #[test]
    fn invalidation_ids_compare_signed() {
        let env = TestEnv::with_job_ids(
            TestPlatform::new(),
            JobIdAllocator::starting_after(i32::MAX as u32 - 1),
        );
        let cache = create(&env);

        assert!(cache.invalidate_conditional(1));
        assert_eq!(cache.last_invalidated_id(), i32::MAX as u32);
        assert!(!cache.invalidate_conditional(i32::MAX as u32));

        // The next invalidation takes the first ID past i32::MAX, which reads as negative.
        cache.invalidate().unwrap();
        assert_eq!(cache.last_invalidated_id(), 0x8000_0000);

        // Older, positive IDs now compare greater and invalidate again.
        assert!(cache.invalidate_conditional(i32::MAX as u32));
        assert_eq!(cache.last_invalidated_id(), 0x8000_0001);
        assert!(!cache.invalidate_conditional(0x8000_0001));
        assert!(!cache.invalidate_conditional(0x8000_0000));
    }

    #[test]
    fn busy_cache_drops_commands() {
        let env = TestEnv::new(TestPlatform::new());
        let cache = create(&env);
        let device = env.platform.device(BASE);
        device.set_stuck(true);
        device.clear_writes();

        assert_eq!(cache.invalidate(), Err(Error::Fault));
        assert!(device.writes_to(l2::COMMAND).is_empty());
        assert_eq!(cache.invalidate_pages(&[0x1000]), Err(Error::Fault));
    }

    #[test]
    fn counters_follow_power_state() {
        let env = TestEnv::new(TestPlatform::new());
        let cache = create(&env);
        let device = env.platform.device(BASE);
        let domain = Arc::new(PmDomain::new(DomainId::Domain1, DOMAIN_1));
        cache.set_pm_domain(domain.clone());

        cache.set_counter_src0(5);
        assert_eq!(device.read(l2::PERFCNT_SRC0), 5);
        device.set(l2::PERFCNT_VAL0, 1234);
        device.set(l2::PERFCNT_VAL1, 99);
        assert_eq!(
            cache.counter_values(),
            CounterValues {
                src0: 5,
                value0: 1234,
                src1: NO_COUNTER,
                value1: 0,
            }
        );

        domain.ref_get(None, &[]);
        domain.ref_put(None, &[]);
        device.clear_writes();
        cache.set_counter_src1(7);
        assert!(device.writes().is_empty());
        assert_eq!(cache.counter_src1(), 7);

        // Sources are restored by the reset after power up.
        cache.reset();
        assert_eq!(device.writes_to(l2::PERFCNT_SRC0), vec![5]);
        assert_eq!(device.writes_to(l2::PERFCNT_SRC1), vec![7]);
    }

    #[test]
    fn sweeps_skip_powered_down_caches() {
        let env = TestEnv::new(TestPlatform::new());
        let cache = Arc::new(create(&env));
        let device = env.platform.device(BASE);
        let domain = Arc::new(PmDomain::new(DomainId::Domain1, DOMAIN_1));
        cache.set_pm_domain(domain.clone());
        let caches = [cache.clone()];
        device.clear_writes();

        invalidate_all_pages(&caches, &[0x1000, 0x2000]);
        assert_eq!(device.writes_to(l2::CLEAR_PAGE), vec![0x1000, 0x2000]);

        domain.ref_get(None, &[]);
        domain.ref_put(None, &[]);
        device.clear_writes();
        invalidate_all(&caches);
        invalidate_all_pages(&caches, &[0x3000]);
        assert!(device.writes().is_empty());
    }
}
