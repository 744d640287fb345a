use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Width of a module name in bytes. Shorter names are zero padded.
pub const MODULE_NAME_LEN: usize = 8;

/// A fixed-width module identifier, unique within a linking session.
///
/// Dependency matching is bytewise equality on the padded array.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleName([u8; MODULE_NAME_LEN]);

impl ModuleName {
    pub fn new(name: &str) -> Result<ModuleName, Error> {
        if name.len() > MODULE_NAME_LEN {
            return Err(Error::NameTooLong(name.to_owned()));
        }
        let mut bytes = [0; MODULE_NAME_LEN];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Ok(ModuleName(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; MODULE_NAME_LEN] {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(MODULE_NAME_LEN);
        String::from_utf8_lossy(&self.0[..end]).fmt(f)
    }
}

impl fmt::Debug for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleName({})", self)
    }
}

impl FromStr for ModuleName {
    type Err = Error;

    fn from_str(s: &str) -> Result<ModuleName, Error> {
        ModuleName::new(s)
    }
}
