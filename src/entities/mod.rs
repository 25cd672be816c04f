//! Plain data: slots, recordings, keyframe annotations.
//!
//! No playback state lives here; the engine in `core` reads these.

pub mod keyframe;
pub mod recording;
pub mod side;

pub use keyframe::{align_common_keyframes, keyframe_label, CommonKeyframe, Keyframe, KeyframeMap};
pub use recording::{Catalog, Recording};
pub use side::Side;
