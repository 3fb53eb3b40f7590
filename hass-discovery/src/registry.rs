use std::collections::HashSet;

/// Keeps track of which devices have had discovery descriptors published since Home Assistant last
/// (re)started.
#[derive(Clone, Debug, Default)]
pub struct DiscoveryRegistry {
    /// Normalised MAC addresses of discovered devices.
    discovered: HashSet<String>,
}

impl DiscoveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_discovered(&self, mac: &str) -> bool {
        self.discovered.contains(mac)
    }

    /// Marks the given device as discovered. Returns `true` if it was not already.
    pub fn mark_discovered(&mut self, mac: &str) -> bool {
        self.discovered.insert(mac.to_owned())
    }

    /// Forgets a single device, so that it will be announced again on its next reading. Returns
    /// `true` if it had been discovered.
    pub fn forget(&mut self, mac: &str) -> bool {
        self.discovered.remove(mac)
    }

    /// Forgets all devices, so that each will be announced again on its next reading.
    pub fn reset(&mut self) {
        self.discovered.clear();
    }

    pub fn len(&self) -> usize {
        self.discovered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty()
    }
}
