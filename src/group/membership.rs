// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Membership of physical PP groups in the virtual group.
//!
//! The virtual group's lock is always taken before a member's.

use super::{Group, GroupId, GroupState, L2Slot, LockedGroup, NO_PARENT};
use crate::l2_cache::L2Cache;
use alloc::sync::Arc;
use core::sync::atomic::Ordering;
use log::{debug, error};

impl LockedGroup<'_> {
    /// The virtual group this group is a member of.
    pub fn parent(&self) -> Option<GroupId> {
        self.inner.parent
    }

    /// Members of this virtual group.
    pub fn children(&self) -> &[Arc<Group>] {
        &self.inner.children
    }

    /// Adds a physical PP group which the scheduler has flagged as
    /// [`GroupState::JoiningVirtual`]. With `update_hw` the broadcast and load balancing masks
    /// are applied right away, the member's MMU is switched to this group's page directory, and
    /// a running job is restarted on the member, so that it helps out straight away.
    pub fn add_group(&mut self, child: &Arc<Group>, update_hw: bool) {
        let parent = self.group;
        let (Some((bcast, dlbu)), Some(child_pp)) = (parent.virtual_units(), child.pp_core())
        else {
            error!(
                "Mali group: Can't add {} to {}, which is not virtual",
                child.id, parent.id
            );
            return;
        };
        debug!("Mali group: Adding {} to virtual {}", child.id, parent.id);

        let mut member = child.lock();
        debug_assert_eq!(member.state(), GroupState::JoiningVirtual);
        debug_assert!(member.parent().is_none());
        member.set_state(GroupState::InVirtual);
        member.inner.parent = Some(parent.id);
        child.parent.store(parent.id.0, Ordering::Release);

        if let Some(cache) = &child.l2 {
            self.track_l2_cache(cache);
        }
        if self.inner.children.try_push(child.clone()).is_err() {
            error!("Mali group: Too many members in virtual {}", parent.id);
        }
        bcast.add_core(child_pp);
        dlbu.add_core(child_pp);

        // The member uses the virtual group's page directory from now on.
        let child_session = member.inner.session.take();
        if !update_hw {
            return;
        }

        // Neither having a session counts as the same one.
        if self.inner.session.as_ref().map(Arc::as_ptr) == child_session.as_ref().map(Arc::as_ptr)
        {
            child.mmu.zap_tlb();
        } else if let Some(session) = &self.inner.session {
            child
                .mmu
                .activate_page_directory(session.page_directory_address());
        } else {
            child.mmu.activate_empty_page_directory();
        }

        bcast.reset();
        dlbu.update_mask();

        if let Some(job) = &self.inner.pp_running_job {
            debug!(
                "Mali group: Starting job {} on new member {}",
                job.id(),
                child.id
            );
            child_pp.job_start(job, child_pp.core_id(), true);
        }
    }

    fn track_l2_cache(&mut self, cache: &Arc<L2Cache>) {
        if let Some(slot) = self
            .inner
            .l2_caches
            .iter_mut()
            .flatten()
            .find(|slot| Arc::ptr_eq(&slot.cache, cache))
        {
            slot.ref_count += 1;
        } else if let Some(empty) = self.inner.l2_caches.iter_mut().find(|slot| slot.is_none()) {
            *empty = Some(L2Slot {
                cache: cache.clone(),
                ref_count: 1,
            });
        } else {
            error!("Mali group: Virtual {} is behind too many L2 caches", self.group.id);
        }
    }

    fn untrack_l2_cache(&mut self, cache: &Arc<L2Cache>) {
        for slot in &mut self.inner.l2_caches {
            if let Some(tracked) = slot
                && Arc::ptr_eq(&tracked.cache, cache)
            {
                tracked.ref_count -= 1;
                if tracked.ref_count == 0 {
                    *slot = None;
                }
                return;
            }
        }
    }

    /// Takes a member out of this idle virtual group. The member is left in
    /// [`GroupState::LeavingVirtual`] for the scheduler to pick up, and keeps using this group's
    /// page directory until it runs a job of its own.
    pub fn remove_group(&mut self, child: &Arc<Group>) {
        let parent = self.group;
        debug_assert_eq!(self.inner.state, GroupState::Idle);
        let (Some((bcast, dlbu)), Some(child_pp)) = (parent.virtual_units(), child.pp_core())
        else {
            return;
        };
        let Some(index) = self
            .inner
            .children
            .iter()
            .position(|member| Arc::ptr_eq(member, child))
        else {
            error!("Mali group: {} is not a member of {}", child.id, parent.id);
            return;
        };
        debug!("Mali group: Removing {} from virtual {}", child.id, parent.id);

        let mut member = child.lock();
        bcast.remove_core(child_pp);
        dlbu.remove_core(child_pp);
        if self.inner.power_is_on {
            bcast.reset();
            dlbu.update_mask();
        }

        member.inner.session = self.inner.session.clone();
        member.inner.parent = None;
        child.parent.store(NO_PARENT, Ordering::Release);
        member.set_state(GroupState::LeavingVirtual);
        drop(member);

        if let Some(cache) = &child.l2 {
            self.untrack_l2_cache(cache);
        }
        self.inner.children.remove(index);
    }

    /// Takes the longest serving member out of this idle virtual group.
    pub fn acquire_group(&mut self) -> Option<Arc<Group>> {
        let child = self.inner.children.first()?.clone();
        self.remove_group(&child);
        Some(child)
    }

    /// Disables this virtual group if it has no members left.
    pub fn virtual_disable_if_empty(&mut self) {
        debug_assert!(self.group.is_virtual());
        if self.inner.children.is_empty() {
            debug_assert!(matches!(
                self.inner.state,
                GroupState::Idle | GroupState::Disabled
            ));
            self.set_state(GroupState::Disabled);
            self.inner.session = None;
        }
    }

    /// Enables this virtual group if it has no members yet.
    pub fn virtual_enable_if_empty(&mut self) {
        debug_assert!(self.group.is_virtual());
        if self.inner.children.is_empty() {
            debug_assert_eq!(self.inner.state, GroupState::Disabled);
            self.set_state(GroupState::Idle);
        }
    }
}
