use std::num::ParseIntError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parsing error")]
    Parse,
    #[error("Storage error: {0} {1}")]
    Storage(String, String),
    #[error("Storage did not assign an identity to profile of {0}")]
    MissingIdentity(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ParseIntError> for ProfileError {
    fn from(_: ParseIntError) -> Self {
        Self::Parse
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(_: serde_json::Error) -> Self {
        Self::Parse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_storage_errors_pass_through() {
        fn failing_backend() -> Result<()> {
            Err(anyhow::anyhow!("backend is offline").into())
        }

        let err = failing_backend().unwrap_err();
        assert!(matches!(err, ProfileError::Other(_)));
        assert_eq!(err.to_string(), "backend is offline");
    }

    #[test]
    fn storage_errors_carry_their_label() {
        let err = ProfileError::Storage(
            "profiles".to_owned(),
            "Key not found".to_owned(),
        );
        assert_eq!(err.to_string(), "Storage error: profiles Key not found");
    }
}
