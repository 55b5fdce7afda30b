//! Layered pattern masks.
//!
//! A [`FilterPattern`] holds an append-only list of layers and an
//! optional selection. Filter layers own a template region, a scoring
//! method and a threshold tick; their mask marks every pixel that matches
//! the region's patch closely enough. Erase layers own a hand-painted
//! mask that removes pixels.
//!
//! The total mask is built from layer 0 up to and including the selected
//! layer, in order: filter masks are OR-ed in, erase masks are AND-NOT-ed
//! out. An erase layer therefore only removes what earlier filters set.

use serde::{Deserialize, Serialize};

use crate::error::{ChainError, KernelError};
use crate::mask::BoolMask;
use crate::template::{MAX_TICK, MIN_TICK, MatchMethod, match_mask};
use crate::types::{Dimensions, ImageBuffer, Point, Properties, PropertyValue, Region};

/// A template-matching layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterLayer {
    /// Pixels whose score fell below the threshold at the last recompute.
    #[serde(default)]
    pub mask: BoolMask,
    /// Template region.
    pub roi: Region,
    /// Threshold tick in `[1, 1000]`.
    pub threshold: u16,
    /// Scoring method.
    pub mode: MatchMethod,
}

/// A hand-painted removal layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraseLayer {
    /// Pixels to remove.
    pub mask: BoolMask,
}

/// One entry in the layer list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "lowercase")]
pub enum Layer {
    /// Adds matched pixels.
    Filter(FilterLayer),
    /// Removes painted pixels.
    Erase(EraseLayer),
}

impl Layer {
    /// The layer's current mask.
    #[must_use]
    pub const fn mask(&self) -> &BoolMask {
        match self {
            Self::Filter(l) => &l.mask,
            Self::Erase(l) => &l.mask,
        }
    }
}

/// Ordered filter/erase layers with a selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterPattern {
    /// Layers in append order.
    pub layer_list: Vec<Layer>,
    /// Index of the selected layer, if any.
    #[serde(default)]
    pub selected: Option<usize>,
}

impl FilterPattern {
    /// Initial threshold tick for new filter layers.
    pub const DEFAULT_THRESHOLD: u16 = 100;

    /// Initial scoring method for new filter layers.
    pub const DEFAULT_MODE: MatchMethod = MatchMethod::SqDiffNormed;

    /// Pattern from explicit layers.
    #[must_use]
    pub const fn from_layers(layer_list: Vec<Layer>, selected: Option<usize>) -> Self {
        Self {
            layer_list,
            selected,
        }
    }

    /// Layers in append order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layer_list
    }

    /// Square region centred in an image of `dims`, a tenth of the
    /// shorter side.
    #[must_use]
    pub fn default_region(dims: Dimensions) -> Region {
        let side = (dims.width.min(dims.height) / 10).max(1);
        Region::square(
            i64::from(dims.width.saturating_sub(side) / 2),
            i64::from(dims.height.saturating_sub(side) / 2),
            side,
        )
    }

    /// Append a filter layer with the default region and tick, and select
    /// it. Returns its index.
    pub fn add_filter_layer(&mut self, dims: Dimensions) -> usize {
        self.layer_list.push(Layer::Filter(FilterLayer {
            mask: BoolMask::new(dims),
            roi: Self::default_region(dims),
            threshold: Self::DEFAULT_THRESHOLD,
            mode: Self::DEFAULT_MODE,
        }));
        let index = self.layer_list.len() - 1;
        self.selected = Some(index);
        index
    }

    /// Append an empty erase layer and select it. Returns its index.
    pub fn add_erase_layer(&mut self, dims: Dimensions) -> usize {
        self.layer_list.push(Layer::Erase(EraseLayer {
            mask: BoolMask::new(dims),
        }));
        let index = self.layer_list.len() - 1;
        self.selected = Some(index);
        index
    }

    /// Pop the last layer and select the new last one, if any.
    pub fn remove_last_layer(&mut self) -> Option<Layer> {
        let removed = self.layer_list.pop();
        self.selected = self.layer_list.len().checked_sub(1);
        removed
    }

    /// Select layer `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NoSuchLayer`] if `index` is out of range.
    pub fn select(&mut self, index: usize) -> Result<(), ChainError> {
        if index >= self.layer_list.len() {
            return Err(ChainError::NoSuchLayer { index });
        }
        self.selected = Some(index);
        Ok(())
    }

    /// Region to display: the selected layer's, when it is a filter.
    /// Every other filter region stays hidden.
    #[must_use]
    pub fn visible_region(&self) -> Option<Region> {
        match self.selected.and_then(|i| self.layer_list.get(i)) {
            Some(Layer::Filter(l)) => Some(l.roi),
            _ => None,
        }
    }

    fn filter_mut(&mut self, index: usize) -> Result<&mut FilterLayer, ChainError> {
        match self.layer_list.get_mut(index) {
            Some(Layer::Filter(l)) => Ok(l),
            Some(Layer::Erase(_)) => Err(ChainError::LayerNotEditable { index }),
            None => Err(ChainError::NoSuchLayer { index }),
        }
    }

    /// Move or resize a filter layer's region.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NoSuchLayer`] for a bad index and
    /// [`ChainError::LayerNotEditable`] if the layer is not a filter.
    pub fn set_roi(&mut self, index: usize, roi: Region) -> Result<(), ChainError> {
        self.filter_mut(index)?.roi = roi;
        Ok(())
    }

    /// Set a filter layer's threshold tick, clamped to `[1, 1000]`.
    ///
    /// # Errors
    ///
    /// As for [`Self::set_roi`].
    pub fn set_threshold(&mut self, index: usize, tick: u16) -> Result<(), ChainError> {
        self.filter_mut(index)?.threshold = tick.clamp(MIN_TICK, MAX_TICK);
        Ok(())
    }

    /// Set a filter layer's scoring method.
    ///
    /// # Errors
    ///
    /// As for [`Self::set_roi`].
    pub fn set_mode(&mut self, index: usize, mode: MatchMethod) -> Result<(), ChainError> {
        self.filter_mut(index)?.mode = mode;
        Ok(())
    }

    /// Paint (or unpaint) discs along `points` on erase layer `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::NoSuchLayer`] for a bad index and
    /// [`ChainError::LayerNotEditable`] unless `index` is the last layer
    /// and that layer is an erase layer.
    pub fn erase(
        &mut self,
        index: usize,
        points: &[Point],
        radius: f64,
        value: bool,
    ) -> Result<(), ChainError> {
        let last = self.layer_list.len().checked_sub(1);
        match self.layer_list.get_mut(index) {
            None => Err(ChainError::NoSuchLayer { index }),
            Some(Layer::Erase(layer)) if Some(index) == last => {
                for &p in points {
                    layer.mask.paint_disc(p, radius, value);
                }
                Ok(())
            }
            Some(_) => Err(ChainError::LayerNotEditable { index }),
        }
    }

    /// Composite layers `0..=selected` into a total mask.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DimensionMismatch`] if a layer's mask does
    /// not match `dims`.
    pub fn composite(&self, selected: usize, dims: Dimensions) -> Result<BoolMask, KernelError> {
        let layers = self.layer_list.iter().take(selected.saturating_add(1));
        composite_masks(layers.map(|layer| (layer, layer.mask())), dims)
    }

    /// Recompute masks and the masked output.
    ///
    /// The selected filter layer is re-matched, as is any earlier filter
    /// whose stored mask no longer fits the input. New masks are stored
    /// only once every layer has succeeded. Returns `None` when no layer
    /// is selected.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DegenerateRegion`] if a filter region lies
    /// outside the image and [`KernelError::DimensionMismatch`] if an
    /// erase mask does not fit the input.
    pub fn apply(
        &mut self,
        input: &ImageBuffer,
        scale: f64,
    ) -> Result<Option<(ImageBuffer, Properties)>, KernelError> {
        let Some(selected) = self.selected.filter(|&i| i < self.layer_list.len()) else {
            return Ok(None);
        };
        let dims = input.dimensions();
        let gray = input.to_gray();
        let mut fresh: Vec<(usize, BoolMask)> = Vec::new();
        for (i, layer) in self.layer_list.iter().enumerate().take(selected + 1) {
            if let Layer::Filter(f) = layer
                && (i == selected || f.mask.dimensions() != dims)
            {
                fresh.push((i, match_mask(&gray, f.roi, f.mode, f.threshold)?));
            }
        }

        let layers = self.layer_list.iter().enumerate().take(selected + 1);
        let total = composite_masks(
            layers.map(|(i, layer)| {
                let mask = fresh
                    .iter()
                    .find(|(j, _)| *j == i)
                    .map_or(layer.mask(), |(_, m)| m);
                (layer, mask)
            }),
            dims,
        )?;
        for (i, mask) in fresh {
            if let Some(Layer::Filter(f)) = self.layer_list.get_mut(i) {
                f.mask = mask;
            }
        }
        let output = input.pin_outside_white(|x, y| total.get(x, y));
        #[allow(clippy::cast_precision_loss)]
        let masked_area = total.count() as f64 * scale * scale;
        let mut props = Properties::new();
        props.insert("masked_area".to_string(), PropertyValue::Number(masked_area));
        Ok(Some((output, props)))
    }
}

/// OR filter masks in and AND-NOT erase masks out, in order.
fn composite_masks<'a>(
    layers: impl Iterator<Item = (&'a Layer, &'a BoolMask)>,
    dims: Dimensions,
) -> Result<BoolMask, KernelError> {
    let mut total = BoolMask::new(dims);
    for (layer, mask) in layers {
        let found = mask.dimensions();
        if found != dims {
            return Err(KernelError::DimensionMismatch {
                width: dims.width,
                height: dims.height,
                found_width: found.width,
                found_height: found.height,
            });
        }
        match layer {
            Layer::Filter(_) => total.or_assign(mask),
            Layer::Erase(_) => total.and_not_assign(mask),
        }
    }
    Ok(total)
}
