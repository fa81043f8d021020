//! End-to-end registration scenarios against stub collaborators.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rust_decimal_macros::dec;

use insurance_intake::bot::IntakeBot;
use insurance_intake::channels::{
    Channel, IncomingMessage, Keyboard, MessageStream, OutgoingMessage, PhotoRef,
};
use insurance_intake::error::{ChannelError, LlmError};
use insurance_intake::extraction::{
    DocumentExtractor, IdCardFields, VehicleBackFields, VehicleFrontFields,
};
use insurance_intake::llm::{CompletionRequest, CompletionResponse, LlmProvider, TextGenerator};
use insurance_intake::registration::{
    Button, PhotoUpload, ProgressStore, RegistrationEngine, Step, buttons,
};
use insurance_intake::storage::LocalBlobStore;

const USER: i64 = 1001;

/// Extractor with canned fields. The ID card read can be switched off.
struct StubExtractor {
    id_card_fails: AtomicBool,
}

impl StubExtractor {
    fn new() -> Self {
        Self {
            id_card_fails: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DocumentExtractor for StubExtractor {
    async fn id_card(&self, _image: &Path) -> Option<IdCardFields> {
        if self.id_card_fails.load(Ordering::SeqCst) {
            return None;
        }
        Some(IdCardFields {
            full_name: "Ivan Petrenko".into(),
            date_of_birth: "1990-04-12".into(),
            document_number: "AB123456".into(),
        })
    }

    async fn vehicle_front(&self, _image: &Path) -> Option<VehicleFrontFields> {
        Some(VehicleFrontFields {
            plate_number: "AA1234BB".into(),
        })
    }

    async fn vehicle_back(&self, _image: &Path) -> Option<VehicleBackFields> {
        Some(VehicleBackFields {
            brand: "Skoda".into(),
            model: "Octavia".into(),
            vin: "TMBJJ7NE5J0123456".into(),
        })
    }
}

/// An LLM whose every call fails.
struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "failing".into(),
            reason: "connection refused".into(),
        })
    }
}

/// Channel that serves the same bytes for every photo.
struct StubChannel;

#[async_trait]
impl Channel for StubChannel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send(&self, _chat_id: i64, _message: OutgoingMessage) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn download_photo(&self, _photo: &PhotoRef) -> Result<Vec<u8>, ChannelError> {
        Ok(b"\xff\xd8\xff jpeg".to_vec())
    }
}

struct Harness {
    dir: tempfile::TempDir,
    extractor: Arc<StubExtractor>,
    engine: Arc<RegistrationEngine>,
}

impl Harness {
    fn new() -> Self {
        Self::with_generator(TextGenerator::disabled())
    }

    fn with_generator(generator: TextGenerator) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(StubExtractor::new());
        let engine = Arc::new(RegistrationEngine::new(
            generator,
            extractor.clone(),
            Arc::new(LocalBlobStore::new(dir.path())),
            dec!(100),
        ));
        Self {
            dir,
            extractor,
            engine,
        }
    }

    fn store(&self) -> &Arc<ProgressStore> {
        self.engine.store()
    }

    async fn press(&self, button: Button) -> Vec<OutgoingMessage> {
        self.engine.handle_button(USER, button.label()).await.unwrap()
    }

    async fn upload(&self) -> Vec<OutgoingMessage> {
        self.engine
            .handle_photo(USER, PhotoUpload::Image(b"jpeg".to_vec()))
            .await
            .unwrap()
    }

    async fn step(&self) -> Option<Step> {
        self.store().current_step(USER).await
    }

    fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Drive a fresh user up to the confirmation step.
    async fn reach_confirmation(&self) {
        self.press(Button::Start).await;
        self.upload().await;
        self.upload().await;
        self.upload().await;
        assert_eq!(self.step().await, Some(Step::ConfirmData));
    }
}

#[tokio::test]
async fn happy_path_issues_policy() {
    let h = Harness::new();

    h.press(Button::Start).await;
    assert_eq!(h.step().await, Some(Step::IdCardUpload));

    let replies = h.upload().await;
    assert_eq!(h.step().await, Some(Step::VehicleFrontUpload));
    assert_eq!(
        replies.last().unwrap().text,
        "Upload a photo of the front side of your vehicle document."
    );
    let data = h.store().document_data(USER).await.unwrap();
    assert_eq!(data.full_name.as_deref(), Some("Ivan Petrenko"));
    assert_eq!(data.id_number.as_deref(), Some("AB123456"));

    h.upload().await;
    assert_eq!(h.step().await, Some(Step::VehicleBackUpload));

    let replies = h.upload().await;
    assert_eq!(h.step().await, Some(Step::ConfirmData));
    let prompt = replies.last().unwrap();
    assert!(prompt.text.contains("Car Number: AA1234BB"));
    assert_eq!(prompt.keyboard, buttons::confirmation());

    let replies = h.press(Button::Yes).await;
    assert_eq!(h.step().await, Some(Step::CostCalculation));
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text, "Insurance cost: $100. Do you confirm?");

    let replies = h.press(Button::Yes).await;
    assert!(!h.store().exists(USER).await);
    let policy = replies
        .iter()
        .find(|r| r.text.starts_with("CAR INSURANCE POLICY"))
        .expect("policy text in replies");
    assert!(policy.text.contains("Full Name: Ivan Petrenko"));
    assert!(policy.text.contains("VIN: TMBJJ7NE5J0123456"));
    assert_eq!(policy.keyboard, buttons::main_menu());

    assert_eq!(h.leftover_files(), 0);
}

#[tokio::test]
async fn policy_fallback_contains_a_five_digit_number() {
    let h = Harness::with_generator(TextGenerator::new(Arc::new(FailingLlm)));
    h.reach_confirmation().await;
    h.press(Button::Yes).await;

    let replies = h.press(Button::Yes).await;
    let policy = replies
        .iter()
        .find(|r| r.text.contains("Policy Number:"))
        .expect("policy text in replies");
    let number: String = policy
        .text
        .split("Policy Number: ")
        .nth(1)
        .unwrap()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    let number: u32 = number.parse().unwrap();
    assert!((10_000..=99_999).contains(&number));
}

#[tokio::test]
async fn rejecting_data_rolls_back_to_id_card() {
    let h = Harness::new();
    h.reach_confirmation().await;

    let replies = h.press(Button::No).await;

    assert_eq!(h.step().await, Some(Step::IdCardUpload));
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].text, "Please upload the photo again.");
    assert_eq!(replies[0].keyboard, Keyboard::Remove);
    assert_eq!(replies[1].text, "Upload a photo of your ID card.");
    assert_eq!(replies[1].keyboard, buttons::cancel_only());

    // Data gathered before the rollback is kept until overwritten.
    let data = h.store().document_data(USER).await.unwrap();
    assert_eq!(data.plate_number.as_deref(), Some("AA1234BB"));
}

#[tokio::test]
async fn rejecting_price_abandons_registration() {
    let h = Harness::new();
    h.reach_confirmation().await;
    h.press(Button::Yes).await;

    let replies = h.press(Button::No).await;

    assert!(!h.store().exists(USER).await);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.starts_with("Sorry, $100 is the only price available."));
    assert_eq!(replies[0].keyboard, buttons::main_menu());
}

#[tokio::test]
async fn failed_id_card_extraction_keeps_step() {
    let h = Harness::new();
    h.extractor.id_card_fails.store(true, Ordering::SeqCst);
    h.press(Button::Start).await;

    let replies = h.upload().await;

    assert_eq!(h.step().await, Some(Step::IdCardUpload));
    assert!(
        replies
            .iter()
            .any(|r| r.text == "Error processing photo. Please try again.")
    );
    let data = h.store().document_data(USER).await.unwrap();
    assert!(data.full_name.is_none());
    assert!(data.date_of_birth.is_none());
    assert!(data.id_number.is_none());
    assert_eq!(h.leftover_files(), 0);

    // A later good upload goes through.
    h.extractor.id_card_fails.store(false, Ordering::SeqCst);
    h.upload().await;
    assert_eq!(h.step().await, Some(Step::VehicleFrontUpload));
}

#[tokio::test]
async fn start_restarts_an_in_flight_registration() {
    let h = Harness::new();
    h.reach_confirmation().await;

    h.press(Button::Start).await;

    assert_eq!(h.step().await, Some(Step::IdCardUpload));
    let data = h.store().document_data(USER).await.unwrap();
    assert!(data.full_name.is_none());
}

#[tokio::test]
async fn users_are_independent() {
    let h = Harness::new();
    h.press(Button::Start).await;
    h.engine.handle_button(2002, Button::Start.label()).await.unwrap();
    h.engine.handle_button(2002, Button::Cancel.label()).await.unwrap();

    assert_eq!(h.step().await, Some(Step::IdCardUpload));
    assert!(!h.store().exists(2002).await);
}

#[tokio::test]
async fn concurrent_uploads_from_one_user_are_serialised() {
    let h = Harness::new();
    h.press(Button::Start).await;

    let (a, b) = tokio::join!(h.upload(), h.upload());

    // Both uploads were processed in turn, each advancing one step.
    assert_eq!(h.step().await, Some(Step::VehicleBackUpload));
    assert!(!a.is_empty() && !b.is_empty());
}

#[tokio::test]
async fn full_flow_through_the_bot() {
    let h = Harness::new();
    let bot = IntakeBot::new(Arc::clone(&h.engine), TextGenerator::disabled());
    let text = |t: &str| IncomingMessage::new("stub", USER, USER).with_text(t);
    let photo = || IncomingMessage::new("stub", USER, USER).with_photo(PhotoRef::new("file-1"));

    let welcome = bot.handle(&StubChannel, &text("/start")).await;
    assert_eq!(welcome[0].keyboard, buttons::main_menu());

    bot.handle(&StubChannel, &text(Button::Start.label())).await;
    for _ in 0..3 {
        bot.handle(&StubChannel, &photo()).await;
    }
    assert_eq!(h.step().await, Some(Step::ConfirmData));

    bot.handle(&StubChannel, &text(Button::Yes.label())).await;
    let replies = bot.handle(&StubChannel, &text(Button::Yes.label())).await;

    assert!(!h.store().exists(USER).await);
    assert!(
        replies
            .iter()
            .any(|r| r.text.starts_with("CAR INSURANCE POLICY"))
    );
}
