pub mod presets;
pub mod types;

pub use presets::{DEFAULT_EPHEMERAL_PRESET, guest_preset};
pub use types::*;
