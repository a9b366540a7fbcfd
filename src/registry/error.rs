//! Registry error types

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Stream already has an active publisher
    AlreadyPublishing(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AlreadyPublishing(name) => {
                write!(f, "stream already has a publisher: {}", name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
