//! Price source implementations (Commodities-API, synthetic)

mod commodities;
mod synthetic;

pub use commodities::{parse_rates, CommoditiesApiClient, COMMODITIES_API_BASE_URL};
pub use synthetic::{SyntheticParams, SyntheticSource};
