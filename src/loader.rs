//! Loading of program images. An image is a flat binary file whose bytes are a
//! sequence of little-endian 64 bit instruction words.

use std::convert::TryInto;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::bytecode::{InstructionWord, WORD_BYTES};

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("cannot read program file `{path}`: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("program file `{path}` is {len} bytes, not a whole number of {} byte words", WORD_BYTES)]
  TrailingPartialWord { path: String, len: usize },
}

/// Reinterprets raw bytes as instruction words. The byte length must be a whole
/// number of words; a trailing fragment means the image is corrupt or was written
/// for a different word size.
pub fn parse_words(bytes: &[u8], path: &str) -> Result<Vec<InstructionWord>, LoadError> {
  if bytes.len() % WORD_BYTES != 0 {
    return Err(LoadError::TrailingPartialWord {
      path: path.to_string(),
      len: bytes.len(),
    });
  }

  Ok(
    bytes
      .chunks_exact(WORD_BYTES)
      .map(|chunk| InstructionWord::from_le_bytes(chunk.try_into().unwrap()))
      .collect()
  )
}

pub fn load_program(path: &Path) -> Result<Vec<InstructionWord>, LoadError> {
  let bytes = fs::read(path).map_err(|source| LoadError::Io {
    path: path.display().to_string(),
    source,
  })?;
  parse_words(&bytes, &path.display().to_string())
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn words_are_little_endian() {
    let bytes = [0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x00, 0x00, 0x02];
    let words = parse_words(&bytes, "test.bin").unwrap();
    assert_eq!(words, vec![0x0200_0000_DEAD_BEEF]);
  }

  #[test]
  fn multiple_words_preserve_order() {
    let mut bytes = vec![];
    bytes.extend_from_slice(&0x0200_0000_0000_0005u64.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    let words = parse_words(&bytes, "test.bin").unwrap();
    assert_eq!(words, vec![0x0200_0000_0000_0005, 0]);
  }

  #[test]
  fn empty_image_is_an_empty_program() {
    assert_eq!(parse_words(&[], "test.bin").unwrap(), vec![]);
  }

  #[test]
  fn trailing_partial_word_is_rejected() {
    let error = parse_words(&[0u8; 12], "test.bin").unwrap_err();
    match error {
      LoadError::TrailingPartialWord { len, .. } => assert_eq!(len, 12),
      other => panic!("unexpected error: {}", other),
    }
  }

  #[test]
  fn missing_file_reports_the_path() {
    let error = load_program(Path::new("no/such/image.bin")).unwrap_err();
    assert!(error.to_string().contains("no/such/image.bin"));
  }
}
