// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Bring-up of the whole GPU.
//!
//! The [`Registry`] finds the units which the platform describes relative to the GPU base
//! address, creates them in dependency order and owns them until [`Registry::terminate`]. Groups
//! are numbered in creation order: the GP group first, then the physical PP groups, then on
//! Mali-450 the virtual group.

use crate::{
    Error, Result,
    broadcast::BroadcastUnit,
    context::DriverContext,
    dlbu::{Dlbu, MasterTileList},
    gp::GpCore,
    group::{self, BottomHalf, Group, GroupCores, GroupId, GroupKind},
    hw_core::{HwCore, Resource},
    l2_cache::{L2Cache, MAX_L2_CACHES},
    mmu::MmuCore,
    page_directory::MmuTables,
    platform::{PageAllocator, Platform},
    pm_domain::{DomainId, PmDomain},
    pmu::Pmu,
    pp::PpCore,
    session::{Session, SessionList},
};
use alloc::sync::Arc;
use arrayvec::ArrayVec;
use core::fmt::{self, Write};
use log::{debug, error, info, warn};
use mali_regs::{ProductId, pmu, pp, version_major, version_minor};

/// Maximum number of groups: the GP group, eight PP groups and the virtual group.
pub const MAX_GROUPS: usize = 10;

const GP_OFFSET: u64 = 0x0;
const GP_MMU_OFFSET: u64 = 0x3000;
const PMU_OFFSET: u64 = 0x2000;
const BCAST_OFFSET: u64 = 0x13000;
const DLBU_OFFSET: u64 = 0x14000;
const VIRTUAL_MMU_OFFSET: u64 = 0x15000;
const VIRTUAL_PP_OFFSET: u64 = 0x16000;

const MAX_DOMAINS: usize = DomainId::ALL.len();

/// Mali-200 has its PP core where the others have the GP core.
const MALI200_PP_OFFSET: u64 = 0x0;

/// A PP core and its MMU. The index into [`PP_UNITS`] is also the core's bit in the broadcast
/// masks.
#[derive(Clone, Copy)]
struct PpUnit {
    core: u64,
    mmu: u64,
}

/// The first four PP cores form core group 1, the rest core group 2 (Mali-450 only).
const PP_UNITS: [PpUnit; 8] = [
    PpUnit { core: 0x08000, mmu: 0x04000 },
    PpUnit { core: 0x0A000, mmu: 0x05000 },
    PpUnit { core: 0x0C000, mmu: 0x06000 },
    PpUnit { core: 0x0E000, mmu: 0x07000 },
    PpUnit { core: 0x28000, mmu: 0x1C000 },
    PpUnit { core: 0x2A000, mmu: 0x1D000 },
    PpUnit { core: 0x2C000, mmu: 0x1E000 },
    PpUnit { core: 0x2E000, mmu: 0x1F000 },
];
const PP_GROUP_1: core::ops::Range<usize> = 0..4;
const PP_GROUP_2: core::ops::Range<usize> = 4..8;

/// An L2 cache, and the power domain it sits in.
struct L2Unit {
    offset: u64,
    domain: Option<DomainId>,
    required: bool,
}

const MALI400_L2: [L2Unit; 1] = [L2Unit {
    offset: 0x1000,
    domain: None,
    required: true,
}];

/// GP cache first, then one per PP core group.
const MALI450_L2: [L2Unit; 3] = [
    L2Unit {
        offset: 0x10000,
        domain: None,
        required: true,
    },
    L2Unit {
        offset: 0x1000,
        domain: Some(DomainId::Domain1),
        required: true,
    },
    L2Unit {
        offset: 0x11000,
        domain: Some(DomainId::Domain3),
        required: false,
    },
];

/// Resources of the Mali-450 virtual group.
struct VirtualResources {
    bcast: Resource,
    dlbu: Resource,
    mmu: Resource,
    pp: Resource,
}

/// Every unit of the GPU.
pub struct Registry {
    // Groups go first, so they are dropped before the caches and tables they refer to.
    groups: ArrayVec<Arc<Group>, MAX_GROUPS>,
    l2_caches: ArrayVec<Arc<L2Cache>, MAX_L2_CACHES>,
    domains: ArrayVec<Arc<PmDomain>, MAX_DOMAINS>,
    pmu: Option<Pmu>,
    tiles: Option<MasterTileList>,
    tables: MmuTables,
    ctx: Arc<DriverContext>,
    pages: Arc<dyn PageAllocator>,
    base: u64,
    product: ProductId,
    version: u32,
    pp_cores_group_1: u32,
    pp_cores_group_2: u32,
}

impl Registry {
    /// Detects the GPU and creates every unit the platform describes, leaving them reset and
    /// powered.
    ///
    /// Fails with [`Error::NotFound`] if a mandatory unit is missing, and with
    /// [`Error::Unsupported`] for Mali-200, unknown GPUs, or shared interrupt lines without the
    /// `shared_interrupts` feature.
    pub fn initialize(
        platform: &dyn Platform,
        ctx: Arc<DriverContext>,
        pages: Arc<dyn PageAllocator>,
    ) -> Result<Self> {
        let Some(base) = platform.gpu_base_address() else {
            error!("Mali: No GPU base address specified");
            return Err(Error::NotFound);
        };
        check_shared_interrupts(platform)?;

        let (pp_count, l2_count) = resource_count(platform, base);
        let pmu = match platform.find_resource(base + PMU_OFFSET) {
            Some(resource) => Some(Pmu::create(
                platform,
                &resource,
                ctx.clone(),
                pp_count,
                l2_count,
            )?),
            None => {
                debug!("Mali: No PMU present");
                None
            }
        };
        ctx.set_power_on(true);
        if let Some(pmu) = &pmu {
            pmu.reset()?;
        }

        let (product, version) = detect_product(platform, base)?;
        let domains = if pmu.is_some() {
            create_pm_domains(product, pp_count)
        } else {
            ArrayVec::new()
        };
        let tables = MmuTables::new(pages.as_ref())?;
        let tiles = match product {
            ProductId::Mali450 => Some(MasterTileList::new(pages.as_ref())?),
            _ => None,
        };

        let mut registry = Self {
            groups: ArrayVec::new(),
            l2_caches: ArrayVec::new(),
            domains,
            pmu,
            tiles,
            tables,
            ctx,
            pages,
            base,
            product,
            version,
            pp_cores_group_1: 0,
            pp_cores_group_2: 0,
        };
        registry.create_l2_caches(platform)?;
        registry.create_groups(platform)?;
        info!(
            "Mali: {:?} r{}p{} with {}+{} PP cores",
            product,
            version_major(version),
            version_minor(version),
            registry.pp_cores_group_1,
            registry.pp_cores_group_2
        );
        Ok(registry)
    }

    /// Powers everything down and releases all units.
    pub fn terminate(self) {
        debug!("Mali: Terminating");
        group::power_off(&self.groups);
        if let Some(pmu) = &self.pmu
            && let Err(e) = pmu.power_down_all()
        {
            error!("Mali: Failed to power down the GPU: {}", e);
        }
    }

    fn find(&self, platform: &dyn Platform, offset: u64) -> Option<Resource> {
        platform.find_resource(self.base + offset)
    }

    fn create_l2_caches(&mut self, platform: &dyn Platform) -> Result<()> {
        let layout: &[L2Unit] = match self.product {
            ProductId::Mali450 => &MALI450_L2,
            _ => &MALI400_L2,
        };
        for unit in layout {
            let Some(resource) = self.find(platform, unit.offset) else {
                if unit.required {
                    error!("Mali: Missing L2 cache at {:#x}", unit.offset);
                    return Err(Error::NotFound);
                }
                continue;
            };
            let cache = Arc::new(L2Cache::create(
                platform,
                &resource,
                self.ctx.clone(),
                self.l2_caches.len(),
            )?);
            if let Some(domain) = unit.domain.and_then(|id| self.pm_domain(id)) {
                domain.set_l2(cache.core_id());
                cache.set_pm_domain(domain.clone());
            }
            self.l2_caches
                .try_push(cache)
                .map_err(|_| Error::NoMemory)?;
        }
        Ok(())
    }

    fn create_groups(&mut self, platform: &dyn Platform) -> Result<()> {
        let virtual_resources = match self.product {
            ProductId::Mali450 => {
                let resources = (
                    self.find(platform, BCAST_OFFSET),
                    self.find(platform, DLBU_OFFSET),
                    self.find(platform, VIRTUAL_MMU_OFFSET),
                    self.find(platform, VIRTUAL_PP_OFFSET),
                );
                let (Some(bcast), Some(dlbu), Some(mmu), Some(pp)) = resources else {
                    error!(
                        "Mali: Mali-450 needs the DLBU, broadcast unit, virtual PP core and virtual MMU"
                    );
                    return Err(Error::NotFound);
                };
                Some(VirtualResources {
                    bcast,
                    dlbu,
                    mmu,
                    pp,
                })
            }
            _ => None,
        };

        let (Some(gp), Some(gp_mmu)) = (
            self.find(platform, GP_OFFSET),
            self.find(platform, GP_MMU_OFFSET),
        ) else {
            error!("Mali: Need at least one GP and one PP core, both with their own MMU");
            return Err(Error::NotFound);
        };
        if !self.pp_unit_present(platform, 0) {
            error!("Mali: Need at least one GP and one PP core, both with their own MMU");
            return Err(Error::NotFound);
        }

        let mmu = self.create_mmu(platform, &gp_mmu, false)?;
        let gp = GpCore::create(platform, &gp, &self.ctx.config)?;
        self.add_group(platform, mmu, GroupCores::Gp(gp), Some(0), None)?;

        let is_mali450 = self.product == ProductId::Mali450;
        let group_1_l2 = if is_mali450 { 1 } else { 0 };
        for index in PP_GROUP_1 {
            if index > 0
                && (self.pp_cores_group_1 >= self.ctx.config.max_pp_cores_group_1
                    || !self.pp_unit_present(platform, index))
            {
                continue;
            }
            let domain = match (is_mali450, index) {
                (true, 0) => Some(DomainId::Domain1),
                (true, _) => Some(DomainId::Domain2),
                // One domain per core, starting after the L2 cache's.
                (false, _) => DomainId::from_bit(index + 2),
            };
            self.create_pp_group(platform, index, group_1_l2, domain)?;
            self.pp_cores_group_1 += 1;
        }
        for index in PP_GROUP_2 {
            if self.pp_cores_group_2 >= self.ctx.config.max_pp_cores_group_2
                || !self.pp_unit_present(platform, index)
            {
                continue;
            }
            self.create_pp_group(platform, index, 2, Some(DomainId::Domain3))?;
            self.pp_cores_group_2 += 1;
        }

        if let Some(resources) = virtual_resources {
            self.create_virtual_group(platform, &resources)?;
        }
        debug!(
            "Mali: {}+{} PP cores initialized",
            self.pp_cores_group_1, self.pp_cores_group_2
        );
        Ok(())
    }

    fn pp_unit_present(&self, platform: &dyn Platform, index: usize) -> bool {
        let unit = PP_UNITS[index];
        self.find(platform, unit.core).is_some() && self.find(platform, unit.mmu).is_some()
    }

    fn create_mmu(
        &self,
        platform: &dyn Platform,
        resource: &Resource,
        is_virtual: bool,
    ) -> Result<MmuCore> {
        MmuCore::create(
            platform,
            resource,
            &self.tables,
            &self.ctx.config,
            is_virtual,
        )
    }

    fn create_pp_group(
        &mut self,
        platform: &dyn Platform,
        index: usize,
        l2_index: usize,
        domain: Option<DomainId>,
    ) -> Result<()> {
        let unit = PP_UNITS[index];
        let (Some(core), Some(mmu)) = (self.find(platform, unit.core), self.find(platform, unit.mmu))
        else {
            return Err(Error::NotFound);
        };
        let mmu = self.create_mmu(platform, &mmu, false)?;
        let pp = PpCore::create(
            platform,
            &core,
            &self.ctx.config,
            self.num_pp_cores(),
            false,
            1 << index,
        )?;
        self.add_group(platform, mmu, GroupCores::Pp(pp), Some(l2_index), domain)
    }

    fn create_virtual_group(
        &mut self,
        platform: &dyn Platform,
        resources: &VirtualResources,
    ) -> Result<()> {
        debug!(
            "Mali: Creating virtual group for {}",
            resources.mmu.description
        );
        let Some(tiles) = &self.tiles else {
            return Err(Error::NotFound);
        };
        let dlbu = Dlbu::create(platform, &resources.dlbu, tiles)?;
        let bcast = BroadcastUnit::create(platform, &resources.bcast)?;
        let mmu = self.create_mmu(platform, &resources.mmu, true)?;
        let pp = PpCore::create(
            platform,
            &resources.pp,
            &self.ctx.config,
            self.num_pp_cores(),
            true,
            0,
        )?;
        self.add_group(
            platform,
            mmu,
            GroupCores::VirtualPp { pp, bcast, dlbu },
            None,
            None,
        )
    }

    /// Creates a group with the next free ID, puts it in its power domain and resets it.
    fn add_group(
        &mut self,
        platform: &dyn Platform,
        mmu: MmuCore,
        cores: GroupCores,
        l2_index: Option<usize>,
        domain: Option<DomainId>,
    ) -> Result<()> {
        let id = GroupId(u8::try_from(self.groups.len()).map_err(|_| Error::NoMemory)?);
        let l2 = match l2_index {
            Some(index) => Some(self.l2_caches.get(index).cloned().ok_or_else(|| {
                error!("Mali: No L2 cache {} for {}", index, id);
                Error::NotFound
            })?),
            None => None,
        };
        let group = Arc::new(Group::create(platform, self.ctx.clone(), id, mmu, cores, l2)?);
        if let Some(domain) = domain.and_then(|domain| self.pm_domain(domain)) {
            domain.add_group(id);
            group.set_pm_domain(domain.clone());
        }
        // The virtual group is reset through its members once it has some.
        if !group.is_virtual() {
            group.lock().reset()?;
        }
        self.groups.try_push(group).map_err(|_| Error::NoMemory)
    }

    /// The driver context shared by every unit.
    pub fn context(&self) -> &Arc<DriverContext> {
        &self.ctx
    }

    /// Which GPU this is.
    pub fn product_id(&self) -> ProductId {
        self.product
    }

    /// The raw version register of the first PP core.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Major hardware revision.
    pub fn version_major(&self) -> u8 {
        version_major(self.version)
    }

    /// Minor hardware revision.
    pub fn version_minor(&self) -> u8 {
        version_minor(self.version)
    }

    /// Number of physical PP cores in use.
    pub fn num_pp_cores(&self) -> u32 {
        self.pp_cores_group_1 + self.pp_cores_group_2
    }

    /// Number of PP cores in use in each PP core group.
    pub fn pp_core_groups(&self) -> (u32, u32) {
        (self.pp_cores_group_1, self.pp_cores_group_2)
    }

    /// Every group, indexed by [`GroupId`].
    pub fn groups(&self) -> &[Arc<Group>] {
        &self.groups
    }

    /// The group with the given ID.
    pub fn group(&self, id: GroupId) -> Option<&Arc<Group>> {
        self.groups.get(usize::from(id.0))
    }

    /// The GP group.
    pub fn gp_group(&self) -> Option<&Arc<Group>> {
        self.groups.first()
    }

    /// The physical PP groups.
    pub fn pp_groups(&self) -> impl Iterator<Item = &Arc<Group>> {
        self.groups
            .iter()
            .filter(|group| group.kind() == GroupKind::Pp)
    }

    /// The Mali-450 virtual group.
    pub fn virtual_group(&self) -> Option<&Arc<Group>> {
        self.groups.iter().find(|group| group.is_virtual())
    }

    /// Every L2 cache.
    pub fn l2_caches(&self) -> &[Arc<L2Cache>] {
        &self.l2_caches
    }

    /// The PMU, if the GPU has one.
    pub fn pmu(&self) -> Option<&Pmu> {
        self.pmu.as_ref()
    }

    /// The given power domain, if the GPU has it.
    pub fn pm_domain(&self, id: DomainId) -> Option<&Arc<PmDomain>> {
        self.domains.iter().find(|domain| domain.id() == id)
    }

    /// Takes a reference on a power domain, powering it up if needed.
    pub fn domain_ref_get(&self, id: DomainId) {
        if let Some(domain) = self.pm_domain(id) {
            domain.ref_get(self.pmu.as_ref(), &self.groups);
        }
    }

    /// Releases a reference on a power domain, powering it down with the last one.
    pub fn domain_ref_put(&self, id: DomainId) {
        if let Some(domain) = self.pm_domain(id) {
            domain.ref_put(self.pmu.as_ref(), &self.groups);
        }
    }

    /// Runs a bottom half which an upper half scheduled for the given group.
    pub fn run_bottom_half(&self, id: GroupId, bottom_half: BottomHalf) {
        match self.group(id) {
            Some(group) => group.run_bottom_half(bottom_half),
            None => warn!("Mali: {:?} bottom half for unknown {}", bottom_half, id),
        }
    }

    /// Creates a session and registers it in `sessions`. On Mali-450 the master tile list is
    /// mapped into its address space.
    pub fn open_session(&self, sessions: &SessionList) -> Result<Arc<Session>> {
        let session = Arc::new(Session::new(self.pages.clone())?);
        if let Some(tiles) = &self.tiles {
            tiles
                .map_into(&mut session.page_directory())
                .inspect_err(|_| error!("Mali: Failed to map DLBU page into session"))?;
        }
        sessions.add(session.clone());
        Ok(session)
    }

    /// Aborts the session's running jobs and unregisters it.
    pub fn close_session(&self, sessions: &SessionList, session: &Session) {
        // The virtual group first, so its members are back on their own by the time they're
        // visited.
        for group in self.groups.iter().rev() {
            group.abort_session(session);
        }
        sessions.remove(session);
    }

    /// Resets every L2 cache and group, e.g. after the GPU lost power.
    pub fn reset_gpu(&self) {
        crate::l2_cache::reset_all(&self.l2_caches);
        for group in &self.groups {
            if let Err(e) = group.lock().reset() {
                error!("Mali: Failed to reset {}: {}", group.id(), e);
            }
        }
    }

    /// Writes the state of every group.
    pub fn dump_state(&self, out: &mut dyn Write) -> fmt::Result {
        for group in &self.groups {
            group.dump_state(out)?;
        }
        Ok(())
    }
}

fn check_shared_interrupts(platform: &dyn Platform) -> Result<()> {
    if !cfg!(feature = "shared_interrupts") && platform.shared_interrupts() {
        error!("Mali: Shared interrupts detected, but driver support is not enabled");
        return Err(Error::Unsupported);
    }
    Ok(())
}

/// Counts the PP cores and L2 caches the platform describes.
fn resource_count(platform: &dyn Platform, base: u64) -> (u32, u32) {
    let present = |offset: u64| platform.find_resource(base + offset).is_some();
    let pp_count = PP_UNITS.iter().filter(|unit| present(unit.core)).count();
    let l2_count = [0x1000, 0x10000, 0x11000]
        .into_iter()
        .filter(|&offset| present(offset))
        .count();
    (pp_count as u32, l2_count as u32)
}

/// Reads the version register of the first PP core.
fn detect_product(platform: &dyn Platform, base: u64) -> Result<(ProductId, u32)> {
    let first_pp = match platform.find_resource(base + PP_UNITS[0].core) {
        Some(resource) => resource,
        None => platform
            .find_resource(base + MALI200_PP_OFFSET)
            .ok_or_else(|| {
                error!("Mali: First PP core not specified");
                Error::NotFound
            })?,
    };
    let version = HwCore::create(platform, &first_pp, pp::REGISTERS_SIZE)?.read(pp::VERSION);
    let (major, minor) = (version_major(version), version_minor(version));
    match ProductId::from_version(version) {
        Some(ProductId::Mali200) => {
            error!("Mali: Mali-200 r{}p{} is not supported", major, minor);
            Err(Error::Unsupported)
        }
        Some(product) => {
            debug!("Mali: Found {:?} r{}p{}", product, major, minor);
            Ok((product, version))
        }
        None => {
            error!(
                "Mali: Found unknown GPU {:#06x} r{}p{}",
                version >> 16,
                major,
                minor
            );
            Err(Error::Unsupported)
        }
    }
}

/// Mali-450 groups its PP cores into up to three domains. Mali-300/400 have one domain per PP
/// core.
fn create_pm_domains(
    product: ProductId,
    pp_count: u32,
) -> ArrayVec<Arc<PmDomain>, MAX_DOMAINS> {
    let mut domains = ArrayVec::new();
    if product == ProductId::Mali450 {
        debug!("Mali: Creating PM domains for Mali-450 MP{}", pp_count);
        match pp_count {
            6 | 8 => {
                domains.push(Arc::new(PmDomain::new(DomainId::Domain3, pmu::DOMAIN_3)));
                domains.push(Arc::new(PmDomain::new(DomainId::Domain2, pmu::DOMAIN_2)));
                domains.push(Arc::new(PmDomain::new(DomainId::Domain1, pmu::DOMAIN_1)));
            }
            2..=4 => {
                domains.push(Arc::new(PmDomain::new(DomainId::Domain2, pmu::DOMAIN_2)));
                domains.push(Arc::new(PmDomain::new(DomainId::Domain1, pmu::DOMAIN_1)));
            }
            _ => error!("Mali: Unsupported Mali-450 core configuration"),
        }
    } else {
        debug!("Mali: Creating PM domains for {:?} MP{}", product, pp_count);
        for bit in (0..pp_count as usize).map(|index| index + 2) {
            let Some(id) = DomainId::from_bit(bit) else {
                error!("Mali: No power domain for PP core {}", bit - 2);
                break;
            };
            domains.push(Arc::new(PmDomain::new(id, 1 << bit)));
        }
    }
    domains
}
