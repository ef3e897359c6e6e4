//! Error related data structures to be shared and used.
//!
//! This module contains the [`Error`] enum, which is used to represent
//! errors that can occur within the dotmatrix domain.

use std::fmt::{self, Display, Formatter};

/// Top level enum for error handling within dotmatrix.
///
/// Most of the time, you will want to use the `CustomError` variant
/// to provide a more detailed error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    RomSize,
    UnsupportedMapper(u8),
    IncompatibleBootRom,
    CustomError(String),
}

impl Error {
    pub fn description(&self) -> String {
        match self {
            Error::RomSize => String::from("Invalid ROM size"),
            Error::UnsupportedMapper(kind) => {
                format!("Unsupported mapper type 0x{:02x}", kind)
            }
            Error::IncompatibleBootRom => String::from("Incompatible boot ROM"),
            Error::CustomError(message) => String::from(message),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_description() {
        assert_eq!(Error::RomSize.description(), "Invalid ROM size");
        assert_eq!(
            Error::UnsupportedMapper(0x13).description(),
            "Unsupported mapper type 0x13"
        );
        assert_eq!(
            Error::CustomError(String::from("oops")).description(),
            "oops"
        );
    }
}
