//! Repository traits for ledger operations.

pub mod storages;
pub mod volumes;

pub use storages::{NewStorage, StorageRepo, StorageUpdate};
pub use volumes::{NewVolume, ProvisionState, VolumeRepo};
