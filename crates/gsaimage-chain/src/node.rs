//! The chain itself: a singly linked list of [`ModificationNode`]s from
//! the leaf back to the root image.
//!
//! Each node exclusively owns its predecessor, its parameters, its own
//! property bag and its cached output. Recomputing a node reads the
//! predecessor's cached output by reference and never mutates it.
//!
//! ```rust
//! # use gsaimage_chain::{ChainError, GrayImage, ImageBuffer, Modification, ModificationNode};
//! # use gsaimage_chain::modification::Blur;
//! # fn run() -> Result<(), ChainError> {
//! let raw = ImageBuffer::Gray(GrayImage::from_pixel(32, 32, image::Luma([128])));
//! let root = ModificationNode::initial(raw)?;
//! let blurred = ModificationNode::new(root, Modification::Blur(Blur::default()))?;
//! assert_eq!(blurred.length(), 2);
//! # Ok(())
//! # }
//! ```

use crate::error::{ChainError, KernelError};
use crate::modification::{InitialImage, Modification, ModificationKind};
use crate::sink::{Clock, ImageSink, RepaintThrottle};
use crate::summary::{ChainSummary, NodeSummary};
use crate::types::{Dimensions, ImageBuffer, Properties, PropertyValue, merge_properties};

/// A recompute that was skipped during [`ModificationNode::update_chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecompute {
    /// Index from the root (root = 0).
    pub position: usize,
    /// Kind of the skipped node.
    pub kind: ModificationKind,
    /// Failed precondition.
    pub reason: KernelError,
}

/// One step of a modification chain.
#[derive(Debug, Clone)]
pub struct ModificationNode {
    predecessor: Option<Box<Self>>,
    modification: Modification,
    properties: Properties,
    cached_output: ImageBuffer,
    timestamp: String,
    last_skip: Option<KernelError>,
}

// ───────────────────────── Construction ──────────────────────────

impl ModificationNode {
    /// Root node holding a freshly imported image.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::EmptyImage`] if `image` has no pixels.
    pub fn initial(image: ImageBuffer) -> Result<Self, ChainError> {
        if image.is_empty() {
            return Err(KernelError::EmptyImage.into());
        }
        Ok(Self {
            predecessor: None,
            cached_output: image.clone(),
            modification: Modification::InitialImage(InitialImage { img_out: image }),
            properties: Properties::new(),
            timestamp: crate::timestamp::now(),
            last_skip: None,
        })
    }

    /// Append `modification` below `predecessor` and compute its output.
    ///
    /// A kernel precondition failure does not abort construction: the node
    /// starts with a copy of the predecessor's output and records the
    /// failure in [`Self::last_skip`].
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::RootNotFirst`] for an
    /// [`Modification::InitialImage`].
    pub fn new(predecessor: Self, modification: Modification) -> Result<Self, ChainError> {
        if modification.kind() == ModificationKind::InitialImage {
            return Err(ChainError::RootNotFirst);
        }
        let mut node = Self {
            cached_output: predecessor.cached_output.clone(),
            predecessor: Some(Box::new(predecessor)),
            modification,
            properties: Properties::new(),
            timestamp: crate::timestamp::now(),
            last_skip: None,
        };
        match node.update_image() {
            Ok(()) | Err(ChainError::Kernel(_)) => Ok(node),
            Err(e) => Err(e),
        }
    }

    /// Reassemble a node from decoded parts without recomputing.
    ///
    /// `held_output` seeds a non-root node's output in place of its
    /// predecessor's.
    pub(crate) fn restore(
        predecessor: Option<Self>,
        modification: Modification,
        properties: Properties,
        timestamp: String,
        held_output: Option<ImageBuffer>,
    ) -> Self {
        let cached_output = match (&modification, &predecessor, held_output) {
            (Modification::InitialImage(root), _, _) => root.img_out.clone(),
            (_, _, Some(held)) => held,
            (_, Some(p), None) => p.cached_output.clone(),
            (_, None, None) => ImageBuffer::Gray(crate::types::GrayImage::new(0, 0)),
        };
        Self {
            predecessor: predecessor.map(Box::new),
            modification,
            properties,
            cached_output,
            timestamp,
            last_skip: None,
        }
    }
}

// ───────────────────────── Recompute ──────────────────────────

impl ModificationNode {
    /// Recompute this node's output from its predecessor's cached output.
    ///
    /// On a kernel precondition failure the previous output is kept and
    /// the failure is returned (and remembered in [`Self::last_skip`]).
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::MissingPredecessor`] for a detached non-root
    /// node and [`ChainError::Kernel`] when the recompute is skipped.
    pub fn update_image(&mut self) -> Result<(), ChainError> {
        let mut context = self
            .predecessor
            .as_deref()
            .map(Self::back_properties)
            .unwrap_or_default();
        merge_properties(&mut context, &self.properties);

        let input = self.predecessor.as_deref().map(|p| &p.cached_output);
        match self.modification.apply(input, &context) {
            Ok(Some(step)) => {
                self.cached_output = step.output;
                merge_properties(&mut self.properties, &step.properties);
                self.last_skip = None;
                let dims = self.cached_output.dimensions();
                log::debug!(
                    "recomputed {}: {}x{}",
                    self.kind(),
                    dims.width,
                    dims.height
                );
                Ok(())
            }
            Ok(None) => {
                self.last_skip = None;
                log::debug!("{} left its output unchanged", self.kind());
                Ok(())
            }
            Err(ChainError::Kernel(reason)) => {
                log::warn!("skipped recompute of {}: {reason}", self.kind());
                self.last_skip = Some(reason.clone());
                Err(ChainError::Kernel(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Recompute every node, root first.
    ///
    /// Kernel skips do not stop the walk; downstream nodes recompute from
    /// whatever their predecessor retained.
    ///
    /// # Errors
    ///
    /// Returns any non-kernel error from [`Self::update_image`].
    pub fn update_chain(&mut self) -> Result<Vec<SkippedRecompute>, ChainError> {
        let mut skipped = match self.predecessor.as_deref_mut() {
            Some(p) => p.update_chain()?,
            None => Vec::new(),
        };
        match self.update_image() {
            Ok(()) => {}
            Err(ChainError::Kernel(reason)) => skipped.push(SkippedRecompute {
                position: self.length() - 1,
                kind: self.kind(),
                reason,
            }),
            Err(e) => return Err(e),
        }
        Ok(skipped)
    }

    /// Recompute, hand the output to `sink`, and return the properties.
    ///
    /// A skipped recompute leaves the previously shown image alone: the
    /// sink is not called and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::update_image`].
    pub fn update_view(&mut self, sink: &mut impl ImageSink) -> Result<Properties, ChainError> {
        self.update_image()?;
        sink.show(&self.cached_output, self.levels());
        Ok(self.properties.clone())
    }

    /// [`Self::update_view`] gated by `throttle`, for repaint triggers
    /// fired while the user drags or paints.
    ///
    /// Returns `None` without recomputing when the throttle is not ready.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::update_image`].
    pub fn update_view_throttled<C: Clock>(
        &mut self,
        sink: &mut impl ImageSink,
        throttle: &mut RepaintThrottle<C>,
    ) -> Result<Option<Properties>, ChainError> {
        if !throttle.ready() {
            return Ok(None);
        }
        self.update_view(sink).map(Some)
    }

    /// Edit this node's parameters and recompute.
    ///
    /// # Errors
    ///
    /// Returns the error from `edit` (the node is left untouched) or from
    /// [`Self::update_image`].
    pub fn modify<T>(
        &mut self,
        edit: impl FnOnce(&mut Modification) -> Result<T, ChainError>,
    ) -> Result<T, ChainError> {
        let value = edit(&mut self.modification)?;
        self.update_image()?;
        Ok(value)
    }

    /// Replace the root image. Only valid on an
    /// [`Modification::InitialImage`] node.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::WrongVariant`] on any other node and
    /// [`KernelError::EmptyImage`] for an empty buffer.
    pub fn set_image(&mut self, image: ImageBuffer) -> Result<(), ChainError> {
        let Modification::InitialImage(root) = &mut self.modification else {
            return Err(ChainError::WrongVariant {
                expected: ModificationKind::InitialImage,
                found: self.modification.kind(),
            });
        };
        if image.is_empty() {
            return Err(KernelError::EmptyImage.into());
        }
        self.cached_output = image.clone();
        root.img_out = image;
        Ok(())
    }
}

// ───────────────────────── Accessors ──────────────────────────

impl ModificationNode {
    /// Owned copy of the current output.
    #[must_use]
    pub fn image(&self) -> ImageBuffer {
        self.cached_output.clone()
    }

    /// Borrow the current output.
    #[must_use]
    pub const fn output(&self) -> &ImageBuffer {
        &self.cached_output
    }

    /// Size of the image this node reads: its predecessor's output, or
    /// its own for the root.
    #[must_use]
    pub fn input_dimensions(&self) -> Dimensions {
        self.predecessor
            .as_deref()
            .map_or(&self.cached_output, |p| &p.cached_output)
            .dimensions()
    }

    /// Display levels for the current output.
    #[must_use]
    pub fn levels(&self) -> (u8, u8) {
        self.modification.levels(&self.cached_output)
    }

    /// Kind of this node.
    #[must_use]
    pub const fn kind(&self) -> ModificationKind {
        self.modification.kind()
    }

    /// This node's parameters.
    #[must_use]
    pub const fn modification(&self) -> &Modification {
        &self.modification
    }

    /// Creation time, `YYYY-MM-DD HH:MM:SS`.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Precondition that skipped the most recent recompute, if any.
    #[must_use]
    pub const fn last_skip(&self) -> Option<&KernelError> {
        self.last_skip.as_ref()
    }

    /// This node's own property bag.
    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Set a node-local property. Takes effect downstream on the next
    /// recompute.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Every ancestor's properties merged root first, so later nodes win
    /// on key collisions.
    #[must_use]
    pub fn back_properties(&self) -> Properties {
        let mut merged = self
            .predecessor
            .as_deref()
            .map(Self::back_properties)
            .unwrap_or_default();
        merge_properties(&mut merged, &self.properties);
        merged
    }
}

// ───────────────────────── Navigation ──────────────────────────

impl ModificationNode {
    /// The previous node, or `None` at the root.
    #[must_use]
    pub fn predecessor(&self) -> Option<&Self> {
        self.predecessor.as_deref()
    }

    /// Detach and return the previous node, dropping this one.
    #[must_use]
    pub fn into_predecessor(self) -> Option<Self> {
        self.predecessor.map(|p| *p)
    }

    /// Number of nodes from the root to here (root = 1).
    #[must_use]
    pub fn length(&self) -> usize {
        std::iter::successors(Some(self), |n| n.predecessor()).count()
    }

    /// The node with no predecessor.
    #[must_use]
    pub fn root(&self) -> &Self {
        let mut node = self;
        while let Some(p) = node.predecessor() {
            node = p;
        }
        node
    }

    /// Every node, root first.
    #[must_use]
    pub fn to_list(&self) -> Vec<&Self> {
        let mut list: Vec<&Self> = std::iter::successors(Some(self), |n| n.predecessor()).collect();
        list.reverse();
        list
    }

    /// The node `steps` positions toward the root.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::OutOfRange`] if `steps` reaches past the root.
    pub fn back_traverse(&self, steps: usize) -> Result<&Self, ChainError> {
        let depth = self.length() - 1;
        if steps > depth {
            return Err(ChainError::OutOfRange {
                requested: steps,
                depth,
            });
        }
        std::iter::successors(Some(self), |n| n.predecessor())
            .nth(steps)
            .ok_or(ChainError::OutOfRange {
                requested: steps,
                depth,
            })
    }

    /// Mutable counterpart of [`Self::back_traverse`]. Descendants are not
    /// recomputed after an edit; call [`Self::update_chain`] on the leaf.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::OutOfRange`] if `steps` reaches past the root.
    pub fn back_traverse_mut(&mut self, steps: usize) -> Result<&mut Self, ChainError> {
        let depth = self.length() - 1;
        if steps > depth {
            return Err(ChainError::OutOfRange {
                requested: steps,
                depth,
            });
        }
        let mut node = self;
        for _ in 0..steps {
            node = node
                .predecessor
                .as_deref_mut()
                .ok_or(ChainError::OutOfRange {
                    requested: steps,
                    depth,
                })?;
        }
        Ok(node)
    }

    /// Per-node overview, root first.
    #[must_use]
    pub fn summary(&self) -> ChainSummary {
        let nodes = self
            .to_list()
            .into_iter()
            .enumerate()
            .map(|(position, node)| {
                let dims = node.cached_output.dimensions();
                NodeSummary {
                    position,
                    kind: node.kind(),
                    timestamp: node.timestamp.clone(),
                    width: dims.width,
                    height: dims.height,
                    channels: node.cached_output.channels(),
                    properties: node.back_properties(),
                    skipped: node.last_skip.as_ref().map(ToString::to_string),
                }
            })
            .collect();
        ChainSummary { nodes }
    }
}
