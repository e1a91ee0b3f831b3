//! Tariff model returned by the billing collaborator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A billing plan for a single volume.
///
/// `storage_limit` is the capacity (in storage units) a volume on this
/// tariff is entitled to; it becomes the volume's capacity at creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VolumeTariff {
    pub id: Uuid,
    #[serde(rename = "is_active")]
    pub active: bool,
    #[serde(rename = "is_public")]
    pub public: bool,
    pub storage_limit: i64,
    #[serde(default)]
    pub price: f64,
}

/// The tariff attached to a whole namespace.
///
/// `volume_size` is the capacity granted to untariffed volumes created in
/// the namespace; zero means the namespace has no volume allowance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamespaceTariff {
    pub id: Uuid,
    #[serde(rename = "is_active")]
    pub active: bool,
    #[serde(rename = "is_public")]
    pub public: bool,
    #[serde(default)]
    pub volume_size: i64,
}
