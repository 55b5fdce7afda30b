//! Error taxonomy for chain navigation, document import and kernel
//! preconditions.

use crate::modification::ModificationKind;

/// Errors raised by chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// `back_traverse(n)` asked for more steps than the chain has.
    #[error("cannot step back {requested} node(s) from a chain of depth {depth}")]
    OutOfRange {
        /// Steps requested.
        requested: usize,
        /// Steps available (chain length minus one).
        depth: usize,
    },

    /// A non-root modification was asked to recompute without an input.
    #[error("{kind} has no predecessor to read its input from")]
    MissingPredecessor {
        /// Kind of the orphaned node.
        kind: ModificationKind,
    },

    /// An `InitialImage` was appended below an existing node.
    #[error("InitialImage can only be the root of a chain")]
    RootNotFirst,

    /// A document could not be turned into a chain.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A named document failed to import; no chain was constructed.
    #[error("failed to import document '{document}': {source}")]
    Import {
        /// Label of the document (file name or caller-supplied tag).
        document: String,
        /// Why it failed.
        #[source]
        source: DecodeError,
    },

    /// A kernel precondition failed; the node kept its previous output.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// Erase edits are only accepted on the last layer.
    #[error("layer {index} is not the last layer and cannot be edited")]
    LayerNotEditable {
        /// Index of the rejected layer.
        index: usize,
    },

    /// A layer index does not exist.
    #[error("no layer at index {index}")]
    NoSuchLayer {
        /// The requested index.
        index: usize,
    },

    /// A variant-specific edit was sent to a node of another kind.
    #[error("expected a {expected} node, found {found}")]
    WrongVariant {
        /// Kind the edit targets.
        expected: ModificationKind,
        /// Kind of the node that received it.
        found: ModificationKind,
    },
}

/// Reasons a chain document is rejected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The `@class` tag names no known modification.
    #[error("unknown modification type '{0}'")]
    UnknownVariant(String),

    /// A required field is absent or the structure is wrong.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// A field is present but holds the wrong kind of value.
    #[error("invalid field in {variant}: {detail}")]
    TypeMismatch {
        /// Modification tag of the offending object.
        variant: String,
        /// Parser message.
        detail: String,
    },

    /// A property cannot be written because JSON has no NaN or infinity.
    #[error("{variant} property '{key}' is not a finite number")]
    NonFiniteProperty {
        /// Modification tag of the offending node.
        variant: String,
        /// Property key.
        key: String,
    },

    /// The text is not valid JSON at all.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Kernel preconditions that cause a recompute to be skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// A region of interest or crop has no area inside the image.
    #[error("region of interest has zero area inside the image")]
    DegenerateRegion,

    /// A kernel has zero size after clamping.
    #[error("kernel size is zero after clamping")]
    EmptyKernel,

    /// Contour extraction found nothing to approximate.
    #[error("no contours found in the image")]
    EmptyContourSet,

    /// The input image has no pixels.
    #[error("input image is empty")]
    EmptyImage,

    /// A physical scale is zero, negative or not finite.
    #[error("scale must be a positive finite number")]
    InvalidScale,

    /// A stored mask no longer matches the input dimensions.
    #[error("mask is {found_width}x{found_height}, image is {width}x{height}")]
    DimensionMismatch {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
        /// Mask width.
        found_width: u32,
        /// Mask height.
        found_height: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_display() {
        let err = ChainError::OutOfRange {
            requested: 4,
            depth: 3,
        };
        assert_eq!(
            err.to_string(),
            "cannot step back 4 node(s) from a chain of depth 3"
        );
    }

    #[test]
    fn import_error_names_document() {
        let err = ChainError::Import {
            document: "sample-12.json".to_string(),
            source: DecodeError::UnknownVariant("Sharpen".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "failed to import document 'sample-12.json': unknown modification type 'Sharpen'"
        );
    }

    #[test]
    fn type_mismatch_names_variant() {
        let err = DecodeError::TypeMismatch {
            variant: "Blur".to_string(),
            detail: "invalid type: string \"x\", expected u32".to_string(),
        };
        assert!(err.to_string().starts_with("invalid field in Blur: "));
    }

    #[test]
    fn kernel_error_converts_into_chain_error() {
        let err: ChainError = KernelError::DegenerateRegion.into();
        assert!(matches!(
            err,
            ChainError::Kernel(KernelError::DegenerateRegion)
        ));
    }
}
