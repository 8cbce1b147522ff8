//! Episode data model: frames, object placements and the persisted document

mod document;
mod frame;
mod placement;

pub use document::{
    DOCUMENT_VERSION, Episode, StopReason, frames_from_value, unique_key, validate_frames,
};
pub use frame::{Detection, Frame, ObjectInView};
pub use placement::{ObjectPlacement, PhysicsProps, normalize_placements};
