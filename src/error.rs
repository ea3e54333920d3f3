use std::fmt;

#[derive(Debug)]
pub enum DocflowError {
    InvalidGradient(String),
    InvalidGridPlacement(String),
    InvalidTable(String),
    UnknownNode(usize),
    Font(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for DocflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocflowError::InvalidGradient(message) => write!(f, "invalid gradient: {}", message),
            DocflowError::InvalidGridPlacement(message) => {
                write!(f, "invalid grid placement: {}", message)
            }
            DocflowError::InvalidTable(message) => write!(f, "invalid table: {}", message),
            DocflowError::UnknownNode(id) => write!(f, "unknown property tree node {}", id),
            DocflowError::Font(message) => write!(f, "font error: {}", message),
            DocflowError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            DocflowError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for DocflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocflowError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DocflowError {
    fn from(value: std::io::Error) -> Self {
        DocflowError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_errors_keep_their_source() {
        let err: DocflowError = std::io::Error::other("disk full").into();
        assert_eq!(err.to_string(), "io error: disk full");
        assert!(err.source().is_some());

        let gradient = DocflowError::InvalidGradient("no stops".to_string());
        assert_eq!(gradient.to_string(), "invalid gradient: no stops");
        assert!(gradient.source().is_none());
    }
}
