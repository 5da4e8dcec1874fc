pub mod configuration;
pub mod defaults;
pub mod schema;
pub mod submission;
pub mod validator;

pub use configuration::{FormType, ServiceFormConfiguration};
pub use defaults::default_form_configuration;
pub use schema::{FieldOption, FieldType, FieldValidation, FormFieldSchema};
pub use submission::{AnswerValue, BookingSubmission, NormalizedSubmission, SubmissionId};
pub use validator::{
    DeterministicSubmissionValidator, FieldError, FieldErrorReason, SubmissionValidator,
};
