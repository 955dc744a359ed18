mod fs;
mod get_bytes_hash;
mod logging;
mod stdin_reader;

pub use fs::*;
pub use get_bytes_hash::*;
pub use logging::*;
pub use stdin_reader::*;
