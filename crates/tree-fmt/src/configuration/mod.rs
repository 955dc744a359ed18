mod deserialize_config;
mod get_init_config_file_text;
mod resolve_config;
mod resolve_config_path;
mod types;

pub use deserialize_config::*;
pub use get_init_config_file_text::*;
pub use resolve_config::*;
pub use resolve_config_path::*;
pub use types::*;
