use std::{error::Error, fmt, fmt::Display};

#[derive(Clone, Debug, PartialEq)]
pub enum BridgeError {
    ERROR(String),
    SHARE(String),
}

impl Error for BridgeError {}

impl Display for BridgeError {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // The failure boundary serializes errors with `to_string`, so
        // whatever is written here is what the caller sees in the
        // envelope's `error` field.
        match self {
            BridgeError::ERROR(err_msg) => write!(f, "ERROR: {}", err_msg),
            BridgeError::SHARE(err_msg) => write!(f, "SHARE: {}", err_msg),
        }
    }
}
