//! Keyboard simulation backed by the `enigo` crate.
//!
//! [`simulate_paste`] sends the OS-appropriate paste shortcut to the
//! currently focused window: ⌘V on macOS, Ctrl+V elsewhere.

use enigo::{Direction, Enigo, Key, Keyboard, Settings};

use super::InjectError;

#[cfg(target_os = "macos")]
const PASTE_MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const PASTE_MODIFIER: Key = Key::Control;

/// Simulate the system paste shortcut in the currently focused window.
///
/// A new [`Enigo`] instance is created for each call because `Enigo` is not
/// `Send` and the handle is cheap to construct.
///
/// # Errors
///
/// Returns [`InjectError::KeySimulation`] if the enigo backend cannot be
/// initialised or if any key event fails to be delivered.
pub fn simulate_paste() -> Result<(), InjectError> {
    let key_err = |e: enigo::InputError| InjectError::KeySimulation(e.to_string());

    let mut enigo =
        Enigo::new(&Settings::default()).map_err(|e| InjectError::KeySimulation(e.to_string()))?;

    enigo.key(PASTE_MODIFIER, Direction::Press).map_err(key_err)?;
    enigo
        .key(Key::Unicode('v'), Direction::Click)
        .map_err(key_err)?;
    enigo
        .key(PASTE_MODIFIER, Direction::Release)
        .map_err(key_err)?;

    Ok(())
}
