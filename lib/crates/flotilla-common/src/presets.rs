//! Named guest sizes accepted by the platform.

use crate::types::MachineGuest;

/// Preset used for disposable command runners.
pub const DEFAULT_EPHEMERAL_PRESET: &str = "shared-cpu-1x";

const PRESETS: &[(&str, &str, u32, u32)] = &[
    ("shared-cpu-1x", "shared", 1, 256),
    ("shared-cpu-2x", "shared", 2, 512),
    ("shared-cpu-4x", "shared", 4, 1024),
    ("performance-1x", "performance", 1, 2048),
    ("performance-2x", "performance", 2, 4096),
];

/// Look up a guest preset by name.
#[must_use]
pub fn guest_preset(name: &str) -> Option<MachineGuest> {
    PRESETS
        .iter()
        .find(|(preset, ..)| *preset == name)
        .map(|&(_, kind, cpus, memory_mb)| MachineGuest {
            cpu_kind: kind.to_string(),
            cpus,
            memory_mb,
        })
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_ephemeral_preset_is_smallest_shared_guest() {
        let guest = guest_preset(DEFAULT_EPHEMERAL_PRESET).expect("preset exists");
        assert_eq!(guest.cpu_kind, "shared");
        assert_eq!(guest.cpus, 1);
        assert_eq!(guest.memory_mb, 256);
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(guest_preset("gpu-a100").is_none());
    }
}
