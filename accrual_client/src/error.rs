use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AccrualApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid accrual service address: {0}")]
    InvalidUrl(String),
    #[error("Request to the accrual service failed: {0}")]
    RequestError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Unexpected response from the accrual service. Status {status}. {message}")]
    UnexpectedStatus { status: u16, message: String },
}
