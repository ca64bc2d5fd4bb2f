// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Power domains: sets of groups and an L2 cache which the PMU powers together.

use crate::{
    Error,
    group::{Group, GroupId},
    pmu::Pmu,
    registry::MAX_GROUPS,
};
use alloc::sync::Arc;
use arrayvec::ArrayVec;
use log::{debug, error};
use spin::{
    Once,
    mutex::{SpinMutex, SpinMutexGuard},
};

/// Identifies a power domain.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum DomainId {
    /// The GP core.
    Gp,
    /// The L2 cache of a Mali-400, or PP0 and its L2 cache on Mali-450.
    Domain1,
    /// PP0 on Mali-400, or PP1-3 on Mali-450.
    Domain2,
    /// PP1 on Mali-400, or PP4-7 and their L2 cache on Mali-450.
    Domain3,
    /// PP2 on Mali-400.
    Domain4,
    /// PP3 on Mali-400.
    Domain5,
}

impl DomainId {
    /// Every domain, in PMU bit order.
    pub const ALL: [Self; 6] = [
        Self::Gp,
        Self::Domain1,
        Self::Domain2,
        Self::Domain3,
        Self::Domain4,
        Self::Domain5,
    ];

    /// The domain whose PMU mask is bit `bit`.
    pub fn from_bit(bit: usize) -> Option<Self> {
        Self::ALL.get(bit).copied()
    }
}

#[derive(Debug)]
struct DomainState {
    on: bool,
    use_count: u32,
}

/// A power domain.
pub struct PmDomain {
    id: DomainId,
    pmu_mask: u32,
    state: SpinMutex<DomainState>,
    groups: SpinMutex<ArrayVec<GroupId, MAX_GROUPS>>,
    l2: Once<usize>,
}

impl PmDomain {
    /// Creates a domain controlled by the given PMU mask. Domains start out powered, as the PMU
    /// reset at bring-up powers everything up.
    pub fn new(id: DomainId, pmu_mask: u32) -> Self {
        Self {
            id,
            pmu_mask,
            state: SpinMutex::new(DomainState {
                on: true,
                use_count: 0,
            }),
            groups: SpinMutex::new(ArrayVec::new()),
            l2: Once::new(),
        }
    }

    /// Which domain this is.
    pub fn id(&self) -> DomainId {
        self.id
    }

    /// The PMU bits for this domain.
    pub fn pmu_mask(&self) -> u32 {
        self.pmu_mask
    }

    /// Adds a group to the domain.
    pub fn add_group(&self, group: GroupId) {
        let mut groups = self.groups.lock();
        debug_assert!(!groups.contains(&group));
        if groups.try_push(group).is_err() {
            error!("PM domain: too many groups in domain {:?}", self.id);
        }
    }

    /// Groups in the domain.
    pub fn groups(&self) -> ArrayVec<GroupId, MAX_GROUPS> {
        self.groups.lock().clone()
    }

    /// Records which L2 cache the domain contains.
    pub fn set_l2(&self, l2_index: usize) {
        self.l2.call_once(|| l2_index);
    }

    /// Index of the domain's L2 cache, if it has one.
    pub fn l2(&self) -> Option<usize> {
        self.l2.get().copied()
    }

    /// Number of active users.
    pub fn use_count(&self) -> u32 {
        self.state.lock().use_count
    }

    /// Whether the domain is currently powered.
    pub fn is_on(&self) -> bool {
        self.state.lock().on
    }

    /// Locks the domain's power state, so it can't change while the caller touches hardware in
    /// it.
    pub fn lock_state(&self) -> PowerStateGuard<'_> {
        PowerStateGuard {
            state: Some(self.state.lock()),
        }
    }

    /// Takes a reference on the domain, powering it and its groups up if it was off.
    pub fn ref_get(&self, pmu: Option<&Pmu>, groups: &[Arc<Group>]) {
        let mut state = self.state.lock();
        state.use_count += 1;
        if !state.on {
            debug!("PM domain: Powering on {:#010x}", self.pmu_mask);
            if let Some(pmu) = pmu {
                match pmu.power_up(self.pmu_mask) {
                    Ok(()) | Err(Error::Busy) => {}
                    Err(e) => error!(
                        "PM domain: Failed to power up PM domain {:#010x}: {}",
                        self.pmu_mask, e
                    ),
                }
            }
            state.on = true;
            for group in self.members(groups) {
                group.power_on_group();
            }
        }
    }

    /// Releases a reference on the domain, powering it and its groups down on the last one.
    pub fn ref_put(&self, pmu: Option<&Pmu>, groups: &[Arc<Group>]) {
        let mut state = self.state.lock();
        debug_assert!(state.use_count > 0);
        state.use_count = state.use_count.saturating_sub(1);
        if state.use_count == 0 && state.on {
            debug!("PM domain: Powering off {:#010x}", self.pmu_mask);
            for group in self.members(groups) {
                group.power_off_group();
            }
            state.on = false;
            if let Some(pmu) = pmu {
                match pmu.power_down(self.pmu_mask) {
                    Ok(()) | Err(Error::Busy) => {}
                    Err(e) => error!(
                        "PM domain: Failed to power down PM domain {:#010x}: {}",
                        self.pmu_mask, e
                    ),
                }
            }
        }
    }

    fn members<'a>(&self, groups: &'a [Arc<Group>]) -> impl Iterator<Item = &'a Arc<Group>> {
        let members = self.groups();
        groups
            .iter()
            .filter(move |group| members.contains(&group.id()))
    }
}

/// Holds a domain's power state steady. Units without a domain count as always powered.
pub struct PowerStateGuard<'a> {
    state: Option<SpinMutexGuard<'a, DomainState>>,
}

impl PowerStateGuard<'_> {
    /// A guard for a unit which isn't in any domain.
    pub fn always_on() -> Self {
        Self { state: None }
    }

    /// Locks the power state of the given domain, if any.
    pub fn lock(domain: Option<&PmDomain>) -> PowerStateGuard<'_> {
        match domain {
            Some(domain) => domain.lock_state(),
            None => PowerStateGuard::always_on(),
        }
    }

    /// Whether the domain is powered.
    pub fn is_on(&self) -> bool {
        self.state.as_ref().is_none_or(|state| state.on)
    }
}
