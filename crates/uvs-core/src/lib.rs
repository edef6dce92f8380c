//! uvs-core: shared types, configuration schema, repository layout and errors
//!
//! Every other uvs crate depends on this one; it carries no cryptography and
//! performs no I/O beyond reading configuration files.

pub mod config;
pub mod error;
pub mod layout;
pub mod types;

pub use config::{RepositoryConfig, UvsConfig};
pub use error::{IoResultExt, UvsError, UvsResult};
pub use layout::RepoLayout;
pub use types::{ObjectId, ObjectKind, SnapshotId};
