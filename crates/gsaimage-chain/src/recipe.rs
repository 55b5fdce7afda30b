//! Recipes: a JSON array of steps applied to a freshly imported image.
//!
//! Each step uses the same `@class` tag and field names as a chain
//! document, but any field may be left out to take its default:
//!
//! ```json
//! [
//!   { "@class": "Blur", "gaussian_size": 7 },
//!   { "@class": "BinaryMask" },
//!   { "@class": "FindContours", "max_vertices": 6 }
//! ]
//! ```

use serde_json::Value;

use crate::codec::CLASS_KEY;
use crate::error::{ChainError, DecodeError};
use crate::modification::{Modification, ModificationKind};
use crate::node::ModificationNode;

/// Build one step, filling absent fields from the kind's defaults.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedDocument`] for a non-object step, a
/// missing tag or an `InitialImage` step, [`DecodeError::UnknownVariant`]
/// for an unknown tag and [`DecodeError::TypeMismatch`] for a bad field.
pub fn modification_from_value(step: &Value) -> Result<Modification, DecodeError> {
    let Value::Object(fields) = step else {
        return Err(DecodeError::MalformedDocument(
            "recipe steps must be objects".to_string(),
        ));
    };
    let tag = fields
        .get(CLASS_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::MalformedDocument(format!("recipe step is missing {CLASS_KEY}")))?;
    let kind =
        ModificationKind::from_tag(tag).ok_or_else(|| DecodeError::UnknownVariant(tag.to_string()))?;
    let defaults = Modification::with_defaults(kind).ok_or_else(|| {
        DecodeError::MalformedDocument("recipes start from an imported image".to_string())
    })?;

    let mut merged = match serde_json::to_value(defaults)? {
        Value::Object(object) => object,
        _ => serde_json::Map::new(),
    };
    for (key, value) in fields {
        merged.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(merged)).map_err(|e| DecodeError::TypeMismatch {
        variant: tag.to_string(),
        detail: e.to_string(),
    })
}

/// Parse recipe text into its steps.
///
/// # Errors
///
/// Returns [`DecodeError::Json`] for unparseable text,
/// [`DecodeError::MalformedDocument`] if the top level is not an array,
/// and any error from [`modification_from_value`].
pub fn parse_recipe(text: &str) -> Result<Vec<Modification>, DecodeError> {
    let Value::Array(steps) = serde_json::from_str::<Value>(text)? else {
        return Err(DecodeError::MalformedDocument(
            "a recipe is a JSON array of steps".to_string(),
        ));
    };
    steps.iter().map(modification_from_value).collect()
}

/// Append every step below `root`, in order.
///
/// Kernel skips are recorded on the affected nodes and do not stop the
/// recipe.
///
/// # Errors
///
/// Returns [`ChainError::RootNotFirst`] if a step is an `InitialImage`.
pub fn apply_recipe(
    root: ModificationNode,
    steps: impl IntoIterator<Item = Modification>,
) -> Result<ModificationNode, ChainError> {
    steps.into_iter().try_fold(root, |chain, step| {
        log::debug!("recipe step {}", step.kind());
        ModificationNode::new(chain, step)
    })
}
