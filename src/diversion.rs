use crate::error::BridgeError;
use gag::Redirect;
use std::io::{self, Stderr};

/// Scoped diversion of stdout to stderr.
///
/// The stdout of the bridge process is a strict single-JSON-object
/// channel: the caller parses whatever appears there as the result
/// envelope, so any stray text corrupts the contract. While a value of
/// this type is alive, everything written to the stdout file descriptor
/// lands on stderr instead, including output from code that bypasses
/// the `log` macros and writes to the descriptor directly. The original
/// stdout is restored when the value is dropped, on every exit path.
pub struct StdoutDiversion {
    _redirect: Redirect<Stderr>,
}

impl StdoutDiversion {
    pub fn acquire() -> Result<StdoutDiversion, BridgeError> {
        match Redirect::stdout(io::stderr()) {
            Ok(redirect) => Ok(StdoutDiversion {
                _redirect: redirect,
            }),
            Err(error) => Err(BridgeError::ERROR(format!(
                "Failed to divert stdout: {}",
                io::Error::from(error)
            ))),
        }
    }
}
