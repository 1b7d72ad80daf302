//! Clipboard save / restore helpers backed by the `arboard` crate.
//!
//! Each function creates a short-lived [`arboard::Clipboard`] handle rather
//! than sharing one across calls, because `arboard::Clipboard` is not `Send`
//! on all platforms and the handle is cheap to create.

use arboard::Clipboard;

use super::InjectError;

/// Capture the current clipboard plain-text content.
///
/// Returns `Ok(None)` when the clipboard is empty or contains non-text data
/// (e.g. an image); that is not an error.
///
/// # Errors
///
/// Returns [`InjectError::ClipboardAccess`] if the OS clipboard cannot be
/// opened.
pub fn save_clipboard() -> Result<Option<String>, InjectError> {
    let mut clipboard = open_clipboard()?;
    // get_text errors on empty or non-text content; treat both as None
    Ok(clipboard.get_text().ok())
}

/// Write `text` into the system clipboard, replacing whatever was there.
///
/// # Errors
///
/// Returns [`InjectError::ClipboardAccess`] if the clipboard cannot be
/// opened, or [`InjectError::ClipboardSet`] if writing fails.
pub fn set_clipboard(text: &str) -> Result<(), InjectError> {
    let mut clipboard = open_clipboard()?;
    clipboard
        .set_text(text)
        .map_err(|e| InjectError::ClipboardSet(e.to_string()))
}

/// Restore the clipboard to a previously saved value.
///
/// `None` means nothing was saved (the clipboard was empty or non-text
/// before the injection), so the clipboard is left untouched.
pub fn restore_clipboard(saved: Option<String>) -> Result<(), InjectError> {
    match saved {
        Some(text) => set_clipboard(&text),
        None => Ok(()),
    }
}

fn open_clipboard() -> Result<Clipboard, InjectError> {
    Clipboard::new().map_err(|e| InjectError::ClipboardAccess(e.to_string()))
}
