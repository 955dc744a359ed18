use std::io::Read;

use anyhow::Result;
use anyhow::bail;
use crossterm::tty::IsTty;

#[cfg(test)]
pub use test::TestStdInReader;

const NOT_PIPED_MESSAGE: &str = "--stdin expects the file text to be piped to stdin";

/// Source of the file text for `--stdin`.
pub trait StdInReader: Clone + Send + Sync {
  fn read(&self) -> Result<Vec<u8>>;
}

#[derive(Default, Clone, Copy)]
pub struct RealStdInReader;

impl StdInReader for RealStdInReader {
  fn read(&self) -> Result<Vec<u8>> {
    let mut stdin = std::io::stdin();
    // reading an interactive terminal would block until the user sends eof
    if stdin.is_tty() {
      bail!(NOT_PIPED_MESSAGE);
    }
    let mut bytes = Vec::new();
    stdin.read_to_end(&mut bytes)?;
    Ok(bytes)
  }
}
