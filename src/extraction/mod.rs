//! Document field extraction — uploaded image in, typed fields out.

pub mod mindee;

pub use mindee::{MindeeConfig, MindeeExtractor};

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fields read from an identity card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCardFields {
    pub full_name: String,
    pub date_of_birth: String,
    pub document_number: String,
}

/// Fields read from the front of a vehicle registration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleFrontFields {
    pub plate_number: String,
}

/// Fields read from the back of a vehicle registration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleBackFields {
    pub brand: String,
    pub model: String,
    pub vin: String,
}

/// Reads typed fields from document images.
///
/// `None` means "no data": the image could not be read for any reason. It is
/// never an engine failure; the user is asked to upload again.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn id_card(&self, image: &Path) -> Option<IdCardFields>;

    async fn vehicle_front(&self, image: &Path) -> Option<VehicleFrontFields>;

    async fn vehicle_back(&self, image: &Path) -> Option<VehicleBackFields>;
}
