use std::fmt;

/// Error type for tracker configuration and frame input.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
}

/// What went wrong.
#[derive(Debug)]
pub enum ErrorKind {
    /// A configuration value that can never be valid, such as a
    /// non-positive focal length, volume size, or truncation distance.
    /// The setter leaves the tracker untouched.
    InvalidParameter(String),
    /// A frame that cannot be processed: empty input, mismatched
    /// dimensions, or color data supplied before color integration was
    /// initialized. No tracker state is mutated when this is returned.
    InvalidInput(String),
}

impl Error {
    pub fn invalid_parameter<T: ToString>(msg: T) -> Self {
        Self {
            kind: ErrorKind::InvalidParameter(msg.to_string()),
        }
    }

    pub fn invalid_input<T: ToString>(msg: T) -> Self {
        Self {
            kind: ErrorKind::InvalidInput(msg.to_string()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            ErrorKind::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn kinds_carry_their_message() {
        let error = Error::invalid_parameter("volume size must be positive");
        assert!(matches!(error.kind, ErrorKind::InvalidParameter(_)));
        assert_eq!(
            error.to_string(),
            "invalid parameter: volume size must be positive"
        );

        let error = Error::invalid_input("empty depth frame");
        assert_eq!(error.to_string(), "invalid input: empty depth frame");
    }
}
