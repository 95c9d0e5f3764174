//! Online/offline detection

use std::sync::atomic::{AtomicBool, Ordering};

/// What a connectivity probe knows about the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
    /// The probe could not tell; treated as online
    Unknown,
}

impl NetworkStatus {
    /// Only a definite `Offline` skips the network
    pub fn is_offline(self) -> bool {
        self == NetworkStatus::Offline
    }
}

/// Reports whether the environment is currently online
pub trait Connectivity: Send + Sync + std::fmt::Debug {
    fn status(&self) -> NetworkStatus;
}

/// Probe for environments without a notion of being offline
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeOnline;

impl Connectivity for AssumeOnline {
    fn status(&self) -> NetworkStatus {
        NetworkStatus::Unknown
    }
}

/// Connectivity flag flipped by the host application
///
/// Starts online.
#[derive(Debug, Default)]
pub struct OfflineSwitch {
    offline: AtomicBool,
}

impl OfflineSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }
}

impl Connectivity for OfflineSwitch {
    fn status(&self) -> NetworkStatus {
        if self.offline.load(Ordering::Relaxed) {
            NetworkStatus::Offline
        } else {
            NetworkStatus::Online
        }
    }
}
