//! Synthetic frame source for the demo binary and tests.
//!
//! Every frame gets a small image descriptor and a grid of polyline and
//! rectangle annotations shifted by 2.8px per frame and per row, so
//! consecutive frames visibly drift.
//!
//! Latency is simulated with `tokio::time::sleep`, which keeps tests using
//! paused time deterministic.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use log::trace;

use crate::entities::{Annotation, AnnotationList, FrameSource, Point, Shape, ShapeStyle};

/// Per-frame and per-row drift of the generated shapes
const DRIFT: f64 = 2.8;

const POLYLINE: [(f64, f64); 5] = [
    (123.5, 387.982),
    (223.5, 307.9),
    (423.5, 60.9),
    (323.5, 312.9),
    (23.5, 198.9),
];

/// Stand-in for a decoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockImage {
    pub index: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct MockSource {
    latency: Duration,
    failing: HashSet<usize>,
    rows: usize,
    image_fetches: AtomicUsize,
    annotation_fetches: AtomicUsize,
    /// Indices in the order their image fetch started
    log: Mutex<Vec<usize>>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            failing: HashSet::new(),
            rows: 4,
            image_fetches: AtomicUsize::new(0),
            annotation_fetches: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Delay applied to every fetch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Image fetches for these indices fail
    pub fn with_failing(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(indices);
        self
    }

    /// Number of shape rows generated per frame (each row = polyline + rectangle)
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    pub fn image_fetches(&self) -> usize {
        self.image_fetches.load(Ordering::Relaxed)
    }

    pub fn annotation_fetches(&self) -> usize {
        self.annotation_fetches.load(Ordering::Relaxed)
    }

    /// Indices whose image fetch was started, in start order
    pub fn fetch_log(&self) -> Vec<usize> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn shapes(&self, index: usize) -> AnnotationList {
        let dx = index as f64 * DRIFT;
        let style = ShapeStyle {
            fill_color: "rgba(0,0,0,0)".into(),
            stroke_color: "#ff4d4f".into(),
            stroke_width: 2.0,
        };

        let mut list = Vec::with_capacity(self.rows * 2);
        for row in 0..self.rows {
            let dy = row as f64 * DRIFT;
            let points = POLYLINE.iter().map(|&(x, y)| Point::new(x + dx, y + dy)).collect();
            list.push(Annotation::new(
                format!("{index}-polyline-{row}"),
                style.clone(),
                Shape::Polyline { points },
            ));
            list.push(Annotation::new(
                format!("{index}-rectangle-{row}"),
                style.clone(),
                Shape::Rectangle {
                    left: 200.0 + dx,
                    top: 300.0 + dy,
                    width: 400.0,
                    height: 300.0,
                    angle: 0.0,
                },
            ));
        }
        list
    }
}

#[async_trait]
impl FrameSource for MockSource {
    type Image = MockImage;

    async fn fetch_image(&self, index: usize) -> anyhow::Result<MockImage> {
        self.image_fetches.fetch_add(1, Ordering::Relaxed);
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(index);
        trace!("mock: fetch_image({})", index);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.contains(&index) {
            bail!("mock: image {} unavailable", index);
        }
        Ok(MockImage {
            index,
            width: 1280,
            height: 720,
        })
    }

    async fn fetch_annotations(&self, index: usize) -> anyhow::Result<AnnotationList> {
        self.annotation_fetches.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.shapes(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shapes_drift_per_frame() {
        let source = MockSource::new().with_rows(2);
        let a = source.fetch_annotations(0).await.unwrap();
        let b = source.fetch_annotations(1).await.unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(a[0].shape.kind(), "polyline");
        assert_eq!(a[1].shape.kind(), "rectangle");

        let mut shifted = a[1].shape.clone();
        shifted.offset(DRIFT, 0.0);
        assert_eq!(shifted, b[1].shape);
    }

    #[tokio::test]
    async fn test_failing_index() {
        let source = MockSource::new().with_failing([3]);
        assert!(source.fetch_image(2).await.is_ok());
        assert!(source.fetch_image(3).await.is_err());
        assert_eq!(source.image_fetches(), 2);
        assert_eq!(source.fetch_log(), vec![2, 3]);
    }
}
