//! Registration workflow: step table, progress store and the engine that
//! drives users through document upload, confirmation and policy issuance.

pub mod buttons;
pub mod composer;
pub mod engine;
pub mod intake;
pub mod model;
pub mod prompts;
pub mod step;
pub mod store;
pub mod turns;

pub use buttons::{Button, InputKind, classify};
pub use composer::StepMessageComposer;
pub use engine::{PhotoUpload, RegistrationEngine};
pub use intake::{IntakeOutcome, PhotoIntakeDispatcher};
pub use model::{DocumentData, UserProgress};
pub use step::Step;
pub use store::ProgressStore;
pub use turns::{Turn, UserTurns};

/// Stable identifier of a chat user.
pub type UserId = i64;
