// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Core of a driver for the Arm Mali-300/400/450 GPU family.
//!
//! The central abstraction is the [`group::Group`]: one MMU together with either a GP core, a PP
//! core or (on Mali-450) a virtual PP aggregating several physical PP groups through the broadcast
//! unit and DLBU. Groups own the job slot state machine, page directory activation, the
//! upper-half/bottom-half interrupt protocol and the recovery reset path. Job scheduling policy
//! lives outside this crate, behind the [`scheduler::Scheduler`] trait.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod broadcast;
pub mod config;
pub mod context;
pub mod dlbu;
pub mod error;
pub mod gp;
pub mod gp_job;
pub mod group;
pub mod hw_core;
pub mod l2_cache;
pub mod logger;
pub mod mmu;
pub mod page_directory;
pub mod platform;
pub mod pm;
pub mod pm_domain;
pub mod pmu;
pub mod pp;
pub mod pp_job;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod user_settings;

pub use error::{Error, Result};

/// Whether this is a debug build.
pub const DEBUG: bool = cfg!(debug_assertions);
