//! gsaimage-chain: Append-only image modification chains (sans-IO).
//!
//! A chain starts from an imported micrograph and grows one
//! [`Modification`] at a time:
//! blur -> threshold -> morphology -> contours / lines / gradients ->
//! layered pattern masks -> scale and density measurements.
//!
//! Every node caches its own output and property bag, reads its
//! predecessor's output when recomputing, and serialises together with
//! all of its ancestors into a nested JSON document (see [`codec`]).
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! buffers and JSON values. File decoding and writing live in the
//! `gsaimage` binary.

pub mod blur;
pub mod border;
pub mod canny;
pub mod codec;
pub mod contour;
pub mod draw;
pub mod edge;
pub mod error;
pub mod filter_pattern;
pub mod gradient;
pub mod hough;
pub mod mask;
pub mod modification;
pub mod morphology;
pub mod node;
pub mod recipe;
pub mod simplify;
pub mod sink;
pub mod summary;
pub mod template;
pub mod timestamp;
pub mod types;

pub use codec::{from_document, from_json, import_document, to_document, to_json};
pub use error::{ChainError, DecodeError, KernelError};
pub use filter_pattern::{FilterPattern, Layer};
pub use modification::{Modification, ModificationKind};
pub use node::{ModificationNode, SkippedRecompute};
pub use recipe::{apply_recipe, parse_recipe};
pub use sink::{Clock, ImageSink, RepaintThrottle, WebClock};
pub use summary::{ChainSummary, NodeSummary};
pub use template::MatchMethod;
pub use types::{
    Dimensions, GrayImage, ImageBuffer, Point, Properties, PropertyValue, Region, RgbImage,
};
