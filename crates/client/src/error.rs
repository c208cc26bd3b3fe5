use biobank_core::SampleError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid backend url '{0}': expected http:// or https://")]
    InvalidUrl(String),
    #[error("request to backend failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
}

impl ClientError {
    /// HTTP status returned by the backend, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ClientError> for SampleError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Status { status, message } if status == 400 || status == 422 => {
                SampleError::InvalidInput(message)
            }
            other => SampleError::Backend(other.to_string()),
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
