//! A resident frame: image + annotations for one timeline slot.

use std::sync::Arc;

use super::annotation::AnnotationList;

/// Frame handed out by the stream.
///
/// Annotations are shared behind an `Arc` so that reading a cached slot is a
/// cheap clone. The image type comes from the `FrameSource`; sources with
/// large images should make it cheap to clone as well (e.g. `Arc<...>`).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<I> {
    index: usize,
    image: I,
    annotations: Arc<AnnotationList>,
}

impl<I> Frame<I> {
    pub fn new(index: usize, image: I, annotations: AnnotationList) -> Self {
        Self {
            index,
            image,
            annotations: Arc::new(annotations),
        }
    }

    /// Timeline slot this frame belongs to
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn image(&self) -> &I {
        &self.image
    }

    pub fn annotations(&self) -> &AnnotationList {
        &self.annotations
    }

    pub fn into_parts(self) -> (usize, I, Arc<AnnotationList>) {
        (self.index, self.image, self.annotations)
    }
}
