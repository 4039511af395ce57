//! Slidemark Core Library
//!
//! Platform-agnostic annotation editing for whole-slide images: drawing and
//! boolean shape composition, brush painting, style groups and pixelmap
//! category reconciliation, and per-annotation save scheduling.

pub mod annotation;
pub mod brush;
pub mod camera;
pub mod compose;
pub mod config;
pub mod editor;
pub mod elements;
pub mod geometry;
pub mod painter;
pub mod shortcuts;
pub mod storage;
pub mod style;
pub mod tools;

pub use annotation::{Annotation, AnnotationId};
pub use brush::{BrushEmission, BrushShape, BrushStroke};
pub use camera::Camera;
pub use compose::{CompositionOutcome, ShapeComposer};
pub use config::{ConfigError, EditorConfig, LogLevel, init_logging};
pub use editor::{Editor, SaveJob, SaveOutcome, StyleWrite};
pub use elements::{Category, Color, Element, ElementId, ElementStore, ElementStyle, Geometry, Pixelmap};
pub use geometry::{BooleanOp, BooleanOpOptions, Correspondence, GeometryEngine, Polygon, PolygonList, Ring};
pub use painter::{PixelmapDebouncer, RedrawQueue};
pub use shortcuts::{EditorAction, Shortcut, ShortcutRegistry};
pub use storage::{AnnotationStore, SaveRequest, SaveScheduler, SaveState, StoreError, StoreResult, StyleStore};
pub use style::{ImportMode, StyleError, StyleGroup, StyleGroupRegistry};
pub use tools::{DrawMode, DrawSession, ToolState};
