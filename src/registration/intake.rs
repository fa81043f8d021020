//! Photo intake dispatcher.
//!
//! Routes an uploaded image to the extraction call for the user's current
//! upload step, merges the fields and advances. The image file is deleted
//! after every attempt, successful or not.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{IntakeError, RegistrationError};
use crate::extraction::DocumentExtractor;
use crate::storage::BlobStore;

use super::UserId;
use super::step::Step;
use super::store::ProgressStore;

/// A successfully processed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeOutcome {
    /// The step the user moved to.
    pub step: Step,
    /// The upload sequence is over; the user must confirm with Yes/No.
    pub needs_confirmation: bool,
}

pub struct PhotoIntakeDispatcher {
    store: Arc<ProgressStore>,
    extractor: Arc<dyn DocumentExtractor>,
    blobs: Arc<dyn BlobStore>,
}

impl PhotoIntakeDispatcher {
    pub fn new(
        store: Arc<ProgressStore>,
        extractor: Arc<dyn DocumentExtractor>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            store,
            extractor,
            blobs,
        }
    }

    /// Process the saved image at `image` for the user's current step.
    pub async fn process(
        &self,
        user_id: UserId,
        image: &Path,
    ) -> Result<IntakeOutcome, IntakeError> {
        let result = self.extract_and_merge(user_id, image).await;

        if let Err(e) = self.blobs.delete(image).await {
            warn!(user_id, file = %image.display(), "Failed to delete uploaded photo: {}", e);
        }

        result
    }

    async fn extract_and_merge(
        &self,
        user_id: UserId,
        image: &Path,
    ) -> Result<IntakeOutcome, IntakeError> {
        let step = self
            .store
            .current_step(user_id)
            .await
            .ok_or(RegistrationError::NotFound { user_id })?;

        let advanced = match step {
            Step::IdCardUpload => {
                let fields = self
                    .extractor
                    .id_card(image)
                    .await
                    .ok_or(IntakeError::NoData { step })?;
                self.store
                    .merge_and_advance(user_id, step, |data| data.apply_id_card(&fields))
                    .await?
            }
            Step::VehicleFrontUpload => {
                let fields = self
                    .extractor
                    .vehicle_front(image)
                    .await
                    .ok_or(IntakeError::NoData { step })?;
                self.store
                    .merge_and_advance(user_id, step, |data| data.apply_vehicle_front(&fields))
                    .await?
            }
            Step::VehicleBackUpload => {
                let fields = self
                    .extractor
                    .vehicle_back(image)
                    .await
                    .ok_or(IntakeError::NoData { step })?;
                self.store
                    .merge_and_advance(user_id, step, |data| data.apply_vehicle_back(&fields))
                    .await?
            }
            Step::Start
            | Step::ConfirmData
            | Step::CostCalculation
            | Step::IssuancePending
            | Step::Finished => return Err(IntakeError::NotUploadStep { step }),
        };

        let next = advanced.ok_or(IntakeError::StepChanged { expected: step })?;
        debug!(user_id, from = %step, to = %next, "Document accepted");

        Ok(IntakeOutcome {
            step: next,
            needs_confirmation: step == Step::VehicleBackUpload,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;

    use super::*;
    use crate::extraction::{IdCardFields, VehicleBackFields, VehicleFrontFields};
    use crate::storage::LocalBlobStore;

    /// Returns fixed fields, or nothing when `fail` is set.
    struct StubExtractor {
        fail: bool,
    }

    #[async_trait]
    impl DocumentExtractor for StubExtractor {
        async fn id_card(&self, _image: &Path) -> Option<IdCardFields> {
            (!self.fail).then(|| IdCardFields {
                full_name: "Ivan Petrenko".into(),
                date_of_birth: "1990-04-12".into(),
                document_number: "AB123456".into(),
            })
        }

        async fn vehicle_front(&self, _image: &Path) -> Option<VehicleFrontFields> {
            (!self.fail).then(|| VehicleFrontFields {
                plate_number: "AA1234BB".into(),
            })
        }

        async fn vehicle_back(&self, _image: &Path) -> Option<VehicleBackFields> {
            (!self.fail).then(|| VehicleBackFields {
                brand: "Skoda".into(),
                model: "Octavia".into(),
                vin: "TMBJJ7NE5J0123456".into(),
            })
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<ProgressStore>,
        blobs: Arc<LocalBlobStore>,
        dispatcher: PhotoIntakeDispatcher,
    }

    fn fixture(fail: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ProgressStore::new());
        let blobs = Arc::new(LocalBlobStore::new(dir.path()));
        let dispatcher = PhotoIntakeDispatcher::new(
            Arc::clone(&store),
            Arc::new(StubExtractor { fail }),
            blobs.clone(),
        );
        Fixture {
            _dir: dir,
            store,
            blobs,
            dispatcher,
        }
    }

    async fn saved(fx: &Fixture) -> PathBuf {
        fx.blobs.save(b"jpeg").await.unwrap()
    }

    #[tokio::test]
    async fn id_card_merges_and_advances() {
        let fx = fixture(false);
        fx.store.begin(1).await;
        fx.store.advance_to(1, Step::IdCardUpload).await;

        let path = saved(&fx).await;
        let outcome = fx.dispatcher.process(1, &path).await.unwrap();

        assert_eq!(outcome.step, Step::VehicleFrontUpload);
        assert!(!outcome.needs_confirmation);
        let data = fx.store.document_data(1).await.unwrap();
        assert_eq!(data.full_name.as_deref(), Some("Ivan Petrenko"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn back_side_asks_for_confirmation() {
        let fx = fixture(false);
        fx.store.begin(1).await;
        fx.store.advance_to(1, Step::VehicleBackUpload).await;

        let path = saved(&fx).await;
        let outcome = fx.dispatcher.process(1, &path).await.unwrap();

        assert_eq!(outcome.step, Step::ConfirmData);
        assert!(outcome.needs_confirmation);
        assert_eq!(
            fx.store.document_data(1).await.unwrap().vin.as_deref(),
            Some("TMBJJ7NE5J0123456")
        );
    }

    #[tokio::test]
    async fn no_data_keeps_step_and_deletes_file() {
        let fx = fixture(true);
        fx.store.begin(1).await;
        fx.store.advance_to(1, Step::IdCardUpload).await;

        let path = saved(&fx).await;
        let err = fx.dispatcher.process(1, &path).await.unwrap_err();

        assert!(matches!(err, IntakeError::NoData { step: Step::IdCardUpload }));
        assert_eq!(fx.store.current_step(1).await, Some(Step::IdCardUpload));
        assert_eq!(fx.store.document_data(1).await.unwrap().full_name, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn non_upload_step_is_rejected() {
        let fx = fixture(false);
        fx.store.begin(1).await;
        fx.store.advance_to(1, Step::ConfirmData).await;

        let path = saved(&fx).await;
        let err = fx.dispatcher.process(1, &path).await.unwrap_err();

        assert!(matches!(err, IntakeError::NotUploadStep { step: Step::ConfirmData }));
        assert_eq!(fx.store.current_step(1).await, Some(Step::ConfirmData));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_registration_is_reported() {
        let fx = fixture(false);
        let path = saved(&fx).await;
        let err = fx.dispatcher.process(1, &path).await.unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Registration(RegistrationError::NotFound { user_id: 1 })
        ));
        assert!(!path.exists());
    }
}
