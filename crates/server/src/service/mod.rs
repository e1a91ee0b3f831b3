//! Volume lifecycle orchestration.

pub mod tariffs;
pub mod volumes;

pub use volumes::VolumeService;
