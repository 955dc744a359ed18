mod cache;
mod cache_file;

pub use cache::*;
pub use cache_file::*;
