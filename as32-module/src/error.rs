use thiserror::Error;

use crate::name::ModuleName;

/// Module construction and linking errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A name longer than [`MODULE_NAME_LEN`](crate::MODULE_NAME_LEN) bytes.
    #[error("Module name too long: `{0}`")]
    NameTooLong(String),

    /// A candidate module was offered to a module that never declared it.
    #[error("Unknown dependency name: `{0}`")]
    UnknownDependency(ModuleName),
}
