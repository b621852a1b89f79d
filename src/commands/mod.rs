//! CLI commands implementation

pub mod init;
pub mod register;
pub mod status;
pub mod versions;

pub use init::*;
pub use register::*;
pub use status::*;
pub use versions::*;
