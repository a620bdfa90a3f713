//! Entities module - plain data types and the collaborator contracts
//!
//! - Timeline geometry (timestamp <-> index)
//! - Frames and their annotation shapes
//! - `FrameSource` / `FrameRenderer` traits

pub mod annotation;
pub mod frame;
pub mod timeline;
pub mod traits;

pub use annotation::{Annotation, AnnotationList, Point, Shape, ShapeStyle};
pub use frame::Frame;
pub use timeline::{Timeline, TimelineError, Timestamp};
pub use traits::{FrameRenderer, FrameSource};
