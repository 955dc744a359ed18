mod formatting;
mod init;

pub use formatting::*;
pub use init::*;
