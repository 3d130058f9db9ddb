// SPDX-FileCopyrightText: 2026 Eli Array Minkoff
//
// SPDX-License-Identifier: 0BSD

//! Output file formats

use std::error::Error;
use std::fmt::{self, Display};

/// An output file format
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Format {
    /// 2-byte little-endian load address, 2-byte little-endian length, then the code
    Bin,
    /// The code alone
    Raw,
}

/// The program can't be stored in the requested format
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FormatError {
    /// The format that was requested
    pub format: Format,
    /// Length of the code, in bytes
    pub len: usize,
}

impl Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes of code can't be stored in {} format",
            self.len,
            self.format.name()
        )
    }
}

impl Error for FormatError {}

impl Format {
    /// Look up a format by name
    ///
    /// ```
    /// use p11as::formats::Format;
    /// assert_eq!(Format::from_name("bin"), Some(Format::Bin));
    /// assert_eq!(Format::from_name("lda"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bin" => Some(Self::Bin),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }

    /// The format's name, which is also its file extension
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bin => "bin",
            Self::Raw => "raw",
        }
    }

    /// Render a linked program
    ///
    /// # Errors
    ///
    /// In [`Format::Bin`], the length must fit in 16 bits.
    ///
    /// # Example
    ///
    /// ```
    /// use p11as::formats::Format;
    /// assert_eq!(
    ///     Format::Bin.write(0o1000, &[0o240, 0]).unwrap(),
    ///     [0x00, 0x02, 0x02, 0x00, 0o240, 0]
    /// );
    /// ```
    pub fn write(self, base: u16, code: &[u8]) -> Result<Vec<u8>, FormatError> {
        match self {
            Self::Bin => {
                let len = u16::try_from(code.len()).map_err(|_| FormatError {
                    format: self,
                    len: code.len(),
                })?;
                let mut out = Vec::with_capacity(code.len() + 4);
                out.extend(base.to_le_bytes());
                out.extend(len.to_le_bytes());
                out.extend_from_slice(code);
                Ok(out)
            }
            Self::Raw => Ok(code.to_vec()),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_is_unchanged() {
        assert_eq!(Format::Raw.write(0o1000, &[1, 2, 3]).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn bin_length_limit() {
        let code = vec![0; 0x1_0000];
        assert_eq!(
            Format::Bin.write(0, &code),
            Err(FormatError {
                format: Format::Bin,
                len: 0x1_0000
            })
        );
        assert!(Format::Raw.write(0, &code).is_ok());
    }
}
