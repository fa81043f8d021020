//! Reply instructions and their literal fallbacks.
//!
//! Each reply is a semantic instruction for the text generator plus the
//! text sent verbatim when generation is unavailable.

use rust_decimal::Decimal;

use crate::llm::TextGenerator;

use super::buttons::Button;
use super::step::Step;

/// Acknowledgment sent when the quoted price is accepted.
pub const PRICE_ACCEPTED: &str = "Thank you!";

/// Reply for failures caught at the outer boundary.
pub const GENERIC_ERROR: &str = "An error occurred. Please try again.";

/// An instruction for the generator plus the fallback text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub instruction: String,
    pub fallback: String,
}

impl Prompt {
    pub fn new(instruction: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            fallback: fallback.into(),
        }
    }

    /// Generated text, or the fallback.
    pub async fn render(&self, generator: &TextGenerator) -> String {
        generator
            .generate_or(&self.instruction, self.fallback.as_str())
            .await
    }
}

/// Price as quoted to the user, e.g. `$100`.
pub fn format_price(price: Decimal) -> String {
    format!("${}", price.normalize())
}

/// The prompt for a step. `summary` is only used by `ConfirmData`.
pub fn step_prompt(step: Step, summary: &str, price: Decimal) -> Prompt {
    let start = Button::Start.label();
    match step {
        Step::Start => Prompt::new(
            format!(
                "This is the first step in the insurance registration process. \
                 Ask them to click the {start} button."
            ),
            format!("Click '{start}' to begin registration."),
        ),
        Step::IdCardUpload => Prompt::new(
            "Say the user to upload an ID card photo.",
            "Upload a photo of your ID card.",
        ),
        Step::VehicleFrontUpload => Prompt::new(
            "Say good. Say the user to upload a photo of the vehicle registration document \
             (front side).",
            "Upload a photo of the front side of your vehicle document.",
        ),
        Step::VehicleBackUpload => Prompt::new(
            "Say good. Say the user to upload a photo of the vehicle registration document \
             (back side).",
            "Upload a photo of the back side of your vehicle document.",
        ),
        Step::ConfirmData => Prompt::new(
            format!("Ask the user to confirm the data: {summary}. Without emoji!"),
            summary,
        ),
        Step::CostCalculation => {
            let price = format_price(price);
            Prompt::new(
                format!(
                    "Inform that the insurance cost is {price}. Ask if the user confirms. \
                     Without emoji!"
                ),
                format!("Insurance cost: {price}. Do you confirm?"),
            )
        }
        Step::IssuancePending => Prompt::new(
            "Notify that the insurance policy is being created and ask to wait.",
            "Please wait, the process of creating an insurance policy is in progress.",
        ),
        Step::Finished => Prompt::new(
            "Tell them the insurance is ready. Thank the user. Tell them it was a pleasure \
             working with them.",
            "Your car insurance is ready. Thank you for your trust, have a nice day!",
        ),
    }
}

/// Reply to `/start`.
pub fn welcome() -> Prompt {
    let start = Button::Start.label();
    Prompt::new(
        format!(
            "Say hello (no emoji), tell them you are a bot that will help them create car \
             insurance, and ask them to click the '{start}' button to begin the insurance process."
        ),
        format!(
            "Hello! I'm an insurance bot.\nI'll help you get car insurance quickly and easily. \
             Click '{start}' to begin."
        ),
    )
}

pub fn cancelled() -> Prompt {
    Prompt::new(
        "The user has cancelled the registration process. Please inform them that the process \
         has been reset and suggest starting over.",
        "The registration process has been cancelled.",
    )
}

pub fn upload_again() -> Prompt {
    Prompt::new(
        "Tell the user to try uploading the photos again.",
        "Please upload the photo again.",
    )
}

pub fn price_rejected(price: Decimal) -> Prompt {
    let price = format_price(price);
    Prompt::new(
        format!(
            "The user did not accept the price {price}. Please indicate that this is the only \
             price and reset the process."
        ),
        format!("Sorry, {price} is the only price available.\nThe registration process has been reset."),
    )
}

/// Document data vanished before the policy could be issued.
pub fn data_unavailable() -> Prompt {
    Prompt::new(
        "Information for registration of insurance is not available. Ask to start over.",
        "Insurance data not available. Please try again.",
    )
}

pub fn not_started() -> Prompt {
    let start = Button::Start.label();
    Prompt::new(
        format!("The registration process has not started. Please press {start}."),
        format!("The registration process has not started. Click {start}."),
    )
}

pub fn no_photo() -> Prompt {
    Prompt::new(
        "The user has not sent a photo. Ask to upload a photo.",
        "Please upload a photo.",
    )
}

pub fn processing() -> Prompt {
    Prompt::new(
        "The photo is being processed. Ask to wait.",
        "Please wait - the photo is being processed...",
    )
}

pub fn load_failed() -> Prompt {
    Prompt::new(
        "Error loading photo. Ask to try again.",
        "Error loading photo. Try again.",
    )
}

/// Document data missing while a photo is processed.
pub fn start_over() -> Prompt {
    Prompt::new(
        "Information for registration of insurance is not available. Ask to start over.",
        "Error. Please start over.",
    )
}

pub fn processing_failed() -> Prompt {
    Prompt::new(
        "Error processing photo. Ask to try again.",
        "Error processing photo. Please try again.",
    )
}

pub fn something_went_wrong() -> Prompt {
    Prompt::new(
        "Something went wrong. Ask to start over.",
        "Something went wrong",
    )
}
