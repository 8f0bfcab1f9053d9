/// Shared error type surfaced to hosts of the chat subsystem.
#[derive(Debug, thiserror::Error)]
pub enum FleekError {
    #[error("not found")]
    NotFound,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        assert_eq!(FleekError::NotFound.to_string(), "not found");
    }

    #[test]
    fn validation_contains_message() {
        let err = FleekError::Validation("bad input".into());
        assert_eq!(err.to_string(), "validation error: bad input");
    }

    #[test]
    fn all_variants_impl_error() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(FleekError::NotFound),
            Box::new(FleekError::Validation("x".into())),
            Box::new(FleekError::Internal("y".into())),
            Box::new(FleekError::Crypto("z".into())),
            Box::new(FleekError::ServiceUnavailable("store down".into())),
        ];
        for e in &errors {
            let _ = e.to_string();
        }
    }
}
