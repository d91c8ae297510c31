//! Helpers over data pulled from a connected device.

mod uiautomator;

pub use uiautomator::{ui_coordinates, ui_coordinates_in_file};
