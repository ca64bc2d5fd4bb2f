// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Client sessions: one GPU address space and a queue of notifications for the client.

use crate::{
    Result,
    page_directory::PageDirectory,
    platform::PageAllocator,
    user_settings::UserSetting,
};
use alloc::{collections::VecDeque, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicU32, Ordering};
use log::debug;
use spin::mutex::{SpinMutex, SpinMutexGuard};

/// Something the driver tells a client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Notification {
    /// A GP job has finished.
    GpFinished {
        /// The job.
        job_id: u32,
        /// Whether it completed successfully.
        success: bool,
        /// Heap address the PLBU had reached.
        heap_current_addr: u32,
    },
    /// A GP job ran out of heap memory and waits for more.
    GpStalled {
        /// The job.
        job_id: u32,
    },
    /// A PP job, with all its sub jobs, has finished.
    PpFinished {
        /// The job.
        job_id: u32,
        /// Whether every sub job completed successfully.
        success: bool,
    },
    /// A user setting changed.
    SettingsChanged {
        /// Which setting.
        setting: UserSetting,
        /// Its new value.
        value: u32,
    },
}

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// A client context.
pub struct Session {
    id: u32,
    page_directory: SpinMutex<PageDirectory>,
    page_directory_address: u32,
    notifications: SpinMutex<VecDeque<Notification>>,
}

impl Session {
    /// Creates a session with an empty address space.
    pub fn new(allocator: Arc<dyn PageAllocator>) -> Result<Self> {
        let page_directory = PageDirectory::new(allocator)?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Mali session {}: created", id);
        Ok(Self {
            id,
            page_directory_address: page_directory.phys_addr(),
            page_directory: SpinMutex::new(page_directory),
            notifications: SpinMutex::new(VecDeque::new()),
        })
    }

    /// Unique ID of the session, for logging.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Physical address of the session's page directory.
    pub fn page_directory_address(&self) -> u32 {
        self.page_directory_address
    }

    /// Locks the session's page directory for changes.
    pub fn page_directory(&self) -> SpinMutexGuard<'_, PageDirectory> {
        self.page_directory.lock()
    }

    /// Queues a notification for the client.
    pub fn send(&self, notification: Notification) {
        self.notifications.lock().push_back(notification);
    }

    /// Takes the oldest queued notification, if any.
    pub fn try_receive(&self) -> Option<Notification> {
        self.notifications.lock().pop_front()
    }

    /// Number of queued notifications.
    pub fn pending_notifications(&self) -> usize {
        self.notifications.lock().len()
    }
}

/// All open sessions.
#[derive(Default)]
pub struct SessionList {
    sessions: SpinMutex<Vec<Arc<Session>>>,
}

impl SessionList {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self {
            sessions: SpinMutex::new(Vec::new()),
        }
    }

    /// Registers a session.
    pub fn add(&self, session: Arc<Session>) {
        self.sessions.lock().push(session);
    }

    /// Unregisters a session.
    pub fn remove(&self, session: &Session) {
        self.sessions
            .lock()
            .retain(|s| !core::ptr::eq(&**s, session));
    }

    /// Sends a notification to every session.
    pub fn broadcast(&self, notification: Notification) {
        for session in self.sessions.lock().iter() {
            session.send(notification);
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
