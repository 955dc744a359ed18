mod formatter;
mod graph;
mod stage;

pub use formatter::*;
pub use graph::*;
pub use stage::*;
