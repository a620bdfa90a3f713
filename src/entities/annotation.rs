//! Annotation shapes attached to each frame.
//!
//! **Why**: A frame is an image plus vector labels drawn over it. The engine
//! never draws them, it only caches and hands them to a `FrameRenderer`.
//!
//! JSON layout is flat and tagged by `type`:
//!
//! ```json
//! { "type": "circle", "id": "c1", "fillColor": "#ff000080",
//!   "strokeColor": "#ff0000", "strokeWidth": 2, "origin": { "x": 10, "y": 20 }, "radius": 5 }
//! ```

use serde::{Deserialize, Serialize};

/// Annotations of one frame
pub type AnnotationList = Vec<Annotation>;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Fill/stroke styling shared by every shape
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeStyle {
    pub fill_color: String,
    pub stroke_color: String,
    pub stroke_width: f64,
}

/// Geometry of a shape, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Polyline {
        points: Vec<Point>,
    },
    Polygon {
        points: Vec<Point>,
    },
    Rectangle {
        left: f64,
        top: f64,
        width: f64,
        height: f64,
        #[serde(default)]
        angle: f64,
    },
    Circle {
        origin: Point,
        radius: f64,
    },
    Ellipse {
        left: f64,
        top: f64,
        width: f64,
        height: f64,
        #[serde(default)]
        angle: f64,
    },
}

impl Shape {
    /// Tag used in the JSON representation
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Polyline { .. } => "polyline",
            Shape::Polygon { .. } => "polygon",
            Shape::Rectangle { .. } => "rectangle",
            Shape::Circle { .. } => "circle",
            Shape::Ellipse { .. } => "ellipse",
        }
    }

    /// Translate the shape in place.
    pub fn offset(&mut self, dx: f64, dy: f64) {
        match self {
            Shape::Polyline { points } | Shape::Polygon { points } => {
                for p in points.iter_mut() {
                    p.x += dx;
                    p.y += dy;
                }
            }
            Shape::Rectangle { left, top, .. } | Shape::Ellipse { left, top, .. } => {
                *left += dx;
                *top += dy;
            }
            Shape::Circle { origin, .. } => {
                origin.x += dx;
                origin.y += dy;
            }
        }
    }
}

/// One labelled shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    #[serde(flatten)]
    pub style: ShapeStyle,
    #[serde(flatten)]
    pub shape: Shape,
}

impl Annotation {
    pub fn new(id: impl Into<String>, style: ShapeStyle, shape: Shape) -> Self {
        Self {
            id: id.into(),
            style,
            shape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_shapes() {
        let json = r##"[
            { "type": "polyline", "id": "a", "fillColor": "", "strokeColor": "#00ff00", "strokeWidth": 2,
              "points": [{ "x": 123.5, "y": 387.982 }, { "x": 223.5, "y": 307.9 }] },
            { "type": "rectangle", "id": "b", "fillColor": "#0000ff40", "strokeColor": "#0000ff", "strokeWidth": 1,
              "left": 200, "top": 300, "width": 400, "height": 300 },
            { "type": "circle", "id": "c", "fillColor": "", "strokeColor": "#ff0000", "strokeWidth": 3,
              "origin": { "x": 10, "y": 20 }, "radius": 5 }
        ]"##;

        let list: AnnotationList = serde_json::from_str(json).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].shape.kind(), "polyline");
        assert_eq!(list[0].style.stroke_color, "#00ff00");
        assert_eq!(
            list[1].shape,
            Shape::Rectangle { left: 200.0, top: 300.0, width: 400.0, height: 300.0, angle: 0.0 }
        );
        assert_eq!(list[2].shape, Shape::Circle { origin: Point::new(10.0, 20.0), radius: 5.0 });
    }

    #[test]
    fn test_serialize_uses_camel_case_and_tag() {
        let a = Annotation::new(
            "e1",
            ShapeStyle { fill_color: "red".into(), stroke_color: "blue".into(), stroke_width: 1.5 },
            Shape::Ellipse { left: 1.0, top: 2.0, width: 3.0, height: 4.0, angle: 45.0 },
        );
        let value = serde_json::to_value(&a).unwrap();
        assert_eq!(value["type"], "ellipse");
        assert_eq!(value["fillColor"], "red");
        assert_eq!(value["strokeWidth"], 1.5);
        assert_eq!(value["angle"], 45.0);
    }

    #[test]
    fn test_offset() {
        let mut shape = Shape::Polygon { points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)] };
        shape.offset(10.0, -1.0);
        assert_eq!(shape, Shape::Polygon { points: vec![Point::new(10.0, -1.0), Point::new(11.0, 0.0)] });
    }
}
