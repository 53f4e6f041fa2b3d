//! Input precondition: the document exists, is readable and is a PDF.
//!
//! This is the cheap check that runs before any model is loaded or invoked.
//! The `%PDF` magic is verified here so a wrong file fails with a clear
//! message instead of a pdfium error deep inside the converter.

use crate::error::Doc2MdError;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Validate that `path` names a readable PDF file.
pub fn check_input(path: &Path) -> Result<(), Doc2MdError> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Doc2MdError::InputNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(Doc2MdError::InputUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        match file.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(Doc2MdError::InputUnreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }
    }
    if &magic != PDF_MAGIC {
        return Err(Doc2MdError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    debug!("Input OK: {}", path.display());
    Ok(())
}
