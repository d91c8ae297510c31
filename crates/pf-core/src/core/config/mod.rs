//! Configuration root, versioned on-disk layout, and per-session settings.

pub mod layout;
pub mod settings;

pub use layout::*;
pub use settings::*;
