//! Abstract traits for dependency inversion.
//!
//! The engine never performs I/O or drawing itself. It depends on these
//! contracts, supplied by the embedding application:
//!
//! - [`FrameSource`]: fetch image / annotations for a frame index
//! - [`FrameRenderer`]: draw a frame onto some output surface

use async_trait::async_trait;

use super::annotation::AnnotationList;
use super::frame::Frame;

/// Supplier of frame data.
///
/// Both fetches are independent and may fail independently. The stream runs
/// them concurrently for every prefetched index; a failure of either one
/// leaves that slot non-resident until the next seek covering it.
///
/// # Example
/// ```ignore
/// struct Disk { dir: PathBuf }
///
/// #[async_trait]
/// impl FrameSource for Disk {
///     type Image = Arc<Vec<u8>>;
///
///     async fn fetch_image(&self, index: usize) -> anyhow::Result<Self::Image> {
///         let bytes = tokio::fs::read(self.dir.join(format!("{index:05}.png"))).await?;
///         Ok(Arc::new(bytes))
///     }
///
///     async fn fetch_annotations(&self, index: usize) -> anyhow::Result<AnnotationList> {
///         let raw = tokio::fs::read(self.dir.join(format!("{index:05}.json"))).await?;
///         Ok(serde_json::from_slice(&raw)?)
///     }
/// }
/// ```
#[async_trait]
pub trait FrameSource: Send + Sync + 'static {
    /// Decoded image type. Cloned on every read of a cached slot.
    type Image: Clone + Send + Sync + 'static;

    async fn fetch_image(&self, index: usize) -> anyhow::Result<Self::Image>;

    async fn fetch_annotations(&self, index: usize) -> anyhow::Result<AnnotationList>;
}

/// Output surface for the player.
pub trait FrameRenderer<I>: Send + 'static {
    /// Called once with the first frame before playback, to size the surface.
    fn prepare(&mut self, _first: &Frame<I>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Draw image and annotation shapes of a frame.
    fn draw(&mut self, frame: &Frame<I>) -> anyhow::Result<()>;
}
