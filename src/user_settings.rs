// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Settings shared between the driver and its clients, e.g. for frame capture.

use crate::session::{Notification, SessionList};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};
use log::error;
use num_enum::TryFromPrimitive;

/// A user setting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum UserSetting {
    /// Software events.
    SwEventsEnable = 0,
    /// Colour buffer capture.
    ColorbufferCaptureEnabled,
    /// Depth buffer capture.
    DepthbufferCaptureEnabled,
    /// Stencil buffer capture.
    StencilbufferCaptureEnabled,
    /// Per tile counter capture.
    PerTileCountersCaptureEnabled,
    /// Capture compositor buffers.
    BufferCaptureCompositor,
    /// Capture window buffers.
    BufferCaptureWindow,
    /// Capture other buffers.
    BufferCaptureOther,
    /// Number of frames to capture.
    BufferCaptureNFrames,
    /// Resize factor for captured buffers.
    BufferCaptureResizeFactor,
    /// Software counters.
    SwCounterEnabled,
}

/// Number of user settings.
pub const NUM_SETTINGS: usize = 11;

/// The table of user settings.
pub struct UserSettings {
    values: [AtomicU32; NUM_SETTINGS],
    sessions: Arc<SessionList>,
}

impl UserSettings {
    /// Creates a table with every setting 0. Changes are announced to `sessions`.
    pub fn new(sessions: Arc<SessionList>) -> Self {
        Self {
            values: [const { AtomicU32::new(0) }; NUM_SETTINGS],
            sessions,
        }
    }

    /// Sets a setting by number, telling every session if the value changed. Unknown settings
    /// are ignored.
    pub fn set(&self, setting: u32, value: u32) {
        let Ok(setting) = UserSetting::try_from(setting) else {
            error!("Invalid user setting {}", setting);
            return;
        };
        let old = self.values[setting as usize].swap(value, Ordering::AcqRel);
        if old != value {
            self.sessions
                .broadcast(Notification::SettingsChanged { setting, value });
        }
    }

    /// Returns a setting by number, or 0 for an unknown setting.
    pub fn get(&self, setting: u32) -> u32 {
        self.values
            .get(setting as usize)
            .map_or(0, |value| value.load(Ordering::Acquire))
    }

    /// Returns every setting, in numeric order.
    pub fn get_all(&self) -> [u32; NUM_SETTINGS] {
        core::array::from_fn(|i| self.values[i].load(Ordering::Acquire))
    }
}
