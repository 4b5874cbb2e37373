//! Failure classification
//!
//! Each stage keeps its own typed error (`FetchError`, `ParaphraseError`,
//! `MediaError`, `ImportError`, `PublishError`, `SchedulerError`). When a
//! failure is reported to the activity log it is wrapped in [`Error`], whose
//! [`SyndicErrorTrait`] implementation decides how it is recorded:
//!
//! - [`ErrorCategory`] prefixes the message (`network error: ...`)
//! - [`Error::severity`] makes recoverable failures warnings and the rest
//!   errors
//!
//! ```
//! use syndic::error::{Error, ErrorCategory, SyndicErrorTrait};
//! use syndic::models::Severity;
//! use syndic::utils::error::FetchError;
//!
//! let err = Error::from(FetchError::Status(503));
//! assert_eq!(err.category(), ErrorCategory::Network);
//! assert_eq!(err.severity(), Severity::Warning);
//! ```

use thiserror::Error;

use crate::models::Severity;
pub use crate::scheduler::error::SchedulerError;
pub use crate::social::PublishError;
pub use crate::utils::error::{FetchError, ImportError, MediaError, ParaphraseError};

/// Common interface of reported failures
pub trait SyndicErrorTrait: std::error::Error {
    /// Whether the same operation may succeed on a later cycle
    fn is_recoverable(&self) -> bool;

    fn category(&self) -> ErrorCategory;

    /// Message prefixed with the category label
    fn description(&self) -> String {
        format!("{}: {}", self.category().label(), self)
    }
}

/// Where a failure originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Remote site, media host or social API unreachable or refusing
    Network,
    /// Remote payload could not be understood
    Parsing,
    /// Local database or file system
    Storage,
    /// Paraphrase service
    Llm,
    /// Missing or invalid settings
    Config,
    /// Run lock and state store
    Scheduler,
}

impl ErrorCategory {
    /// Short label used in log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network => "network error",
            Self::Parsing => "parsing error",
            Self::Storage => "storage error",
            Self::Llm => "LLM error",
            Self::Config => "config error",
            Self::Scheduler => "scheduler error",
        }
    }
}

/// A pipeline failure from any stage
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Paraphrase(#[from] ParaphraseError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl SyndicErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Paraphrase(e) => e.is_recoverable(),
            Self::Media(e) => e.is_recoverable(),
            Self::Import(e) => e.is_recoverable(),
            Self::Publish(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(FetchError::Decode(_)) => ErrorCategory::Parsing,
            Self::Fetch(FetchError::InvalidUrl(_)) => ErrorCategory::Config,
            Self::Fetch(_) => ErrorCategory::Network,
            Self::Paraphrase(ParaphraseError::MissingApiKey) => ErrorCategory::Config,
            Self::Paraphrase(_) => ErrorCategory::Llm,
            Self::Media(MediaError::Io(_) | MediaError::Storage(_) | MediaError::TooLarge { .. }) => {
                ErrorCategory::Storage
            }
            Self::Media(_) => ErrorCategory::Network,
            Self::Import(ImportError::MissingField(_)) => ErrorCategory::Parsing,
            Self::Import(ImportError::ParaphraseDisabled) => ErrorCategory::Config,
            Self::Import(_) => ErrorCategory::Storage,
            Self::Publish(PublishError::InvalidConfig(_)) => ErrorCategory::Config,
            Self::Publish(_) => ErrorCategory::Network,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
        }
    }
}

impl Error {
    /// Activity log level for this failure
    pub fn severity(&self) -> Severity {
        if self.is_recoverable() {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        assert_eq!(Error::from(FetchError::Timeout).category(), ErrorCategory::Network);
        assert_eq!(
            Error::from(FetchError::Decode("expected array".into())).category(),
            ErrorCategory::Parsing
        );
        assert_eq!(
            Error::from(ParaphraseError::InvalidResponse("no choices".into())).category(),
            ErrorCategory::Llm
        );
        assert_eq!(
            Error::from(ParaphraseError::MissingApiKey).category(),
            ErrorCategory::Config
        );
        assert_eq!(Error::from(MediaError::Status(404)).category(), ErrorCategory::Network);
        assert_eq!(
            Error::from(SchedulerError::CyclePanicked).category(),
            ErrorCategory::Scheduler
        );
    }

    #[test]
    fn test_severity_follows_recoverability() {
        assert_eq!(Error::from(FetchError::Status(500)).severity(), Severity::Warning);
        assert_eq!(Error::from(FetchError::Status(404)).severity(), Severity::Error);
        assert_eq!(
            Error::from(ImportError::CreateRejected("duplicate".into())).severity(),
            Severity::Error
        );
        assert_eq!(
            Error::from(ImportError::Storage("locked".into())).severity(),
            Severity::Warning
        );
    }

    #[test]
    fn test_description() {
        let err = Error::from(FetchError::Timeout);
        assert_eq!(err.description(), "network error: Request timeout");
    }
}
