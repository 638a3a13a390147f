// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Slot colors, slot names, image references, and phantom-typed ids.

mod id;
mod image_ref;
mod slot;

pub use id::{ContainerId, ImageId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use slot::{SlotColor, SlotName, SlotNameError};
