use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("Test case {name} is already registered.")]
    DuplicateCase { name: String },
}
