//! Reading reference documents to index.

use std::path::Path;

use tracing::info;

use crate::error::IndexError;

/// Extract the text of a reference document.
///
/// `.pdf` files go through the PDF text extractor; anything else is read as
/// UTF-8 text.
pub fn read_source(path: &Path) -> Result<String, IndexError> {
    let text = if is_pdf(path) {
        extract_pdf(path)?
    } else {
        std::fs::read_to_string(path).map_err(|e| extract_error(path, e))?
    };

    info!(
        "Read {} characters from {}",
        text.chars().count(),
        path.display()
    );
    Ok(text)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn extract_pdf(path: &Path) -> Result<String, IndexError> {
    // The extractor panics on some malformed documents.
    match std::panic::catch_unwind(|| pdf_extract::extract_text(path)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(extract_error(path, e)),
        Err(_) => Err(extract_error(path, "PDF extractor panicked")),
    }
}

fn extract_error(path: &Path, reason: impl std::fmt::Display) -> IndexError {
    IndexError::Extract {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
