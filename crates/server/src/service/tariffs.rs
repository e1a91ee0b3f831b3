//! Tariff eligibility checks.

use crate::error::ApiError;
use cistern_core::tariff::VolumeTariff;

/// Check whether a caller may subscribe to a tariff. Inactive tariffs are
/// unavailable to everyone; non-public tariffs are available to admins only.
pub fn check_tariff(tariff: &VolumeTariff, admin: bool) -> Result<(), ApiError> {
    if !tariff.active {
        return Err(ApiError::TariffUnavailable(format!(
            "tariff {} is inactive",
            tariff.id
        )));
    }
    if !tariff.public && !admin {
        return Err(ApiError::TariffUnavailable(format!(
            "tariff {} is not public",
            tariff.id
        )));
    }
    Ok(())
}
