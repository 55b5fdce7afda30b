//! Chain documents: one JSON object per node, nested through `mod_in`
//! from the leaf down to the root.
//!
//! ```json
//! {
//!   "@class": "Blur",
//!   "@date": "2024-05-01 09:30:00",
//!   "properties": {},
//!   "gaussian_size": 5,
//!   "mod_in": { "@class": "InitialImage", "mod_in": null, "img_out": [[0, 255]], ... }
//! }
//! ```
//!
//! A node whose last recompute was skipped also carries the output it
//! kept under `held_output`, so the rebuilt chain shows the same image.
//!
//! Decoding is all-or-nothing: any bad level rejects the whole document
//! and no partial chain is returned.

use serde_json::{Map, Value};

use crate::error::{ChainError, DecodeError};
use crate::modification::{Modification, ModificationKind};
use crate::node::ModificationNode;
use crate::types::{ImageBuffer, Properties, PropertyValue};

/// Discriminator key.
pub const CLASS_KEY: &str = "@class";

/// Timestamp key.
pub const DATE_KEY: &str = "@date";

/// Predecessor key.
pub const PREDECESSOR_KEY: &str = "mod_in";

/// Property bag key.
pub const PROPERTIES_KEY: &str = "properties";

/// Output retained by a node whose last recompute was skipped.
pub const HELD_OUTPUT_KEY: &str = "held_output";

const PREDECESSOR_ALIAS: &str = "predecessor";
const DATE_ALIAS: &str = "timestamp";

/// Document for `node` and all of its ancestors.
///
/// # Errors
///
/// Returns [`DecodeError::NonFiniteProperty`] if a property holds NaN or
/// an infinity, and [`DecodeError::Json`] if a parameter fails to
/// serialise.
pub fn to_document(node: &ModificationNode) -> Result<Value, DecodeError> {
    if let Some(key) = non_finite_key(node.properties()) {
        return Err(DecodeError::NonFiniteProperty {
            variant: node.kind().to_string(),
            key,
        });
    }
    let mut object = match serde_json::to_value(node.modification())? {
        Value::Object(object) => object,
        other => {
            return Err(DecodeError::MalformedDocument(format!(
                "{} serialised to {other}, expected an object",
                node.kind()
            )));
        }
    };
    object.insert(DATE_KEY.to_string(), Value::String(node.timestamp().to_string()));
    object.insert(
        PROPERTIES_KEY.to_string(),
        serde_json::to_value(node.properties())?,
    );
    if node.last_skip().is_some() {
        object.insert(
            HELD_OUTPUT_KEY.to_string(),
            serde_json::to_value(node.output())?,
        );
    }
    let predecessor = match node.predecessor() {
        Some(p) => to_document(p)?,
        None => Value::Null,
    };
    object.insert(PREDECESSOR_KEY.to_string(), predecessor);
    Ok(Value::Object(object))
}

/// First key (dotted for nested maps) whose value JSON cannot represent.
fn non_finite_key(properties: &Properties) -> Option<String> {
    properties.iter().find_map(|(key, value)| {
        let finite = match value {
            PropertyValue::Number(v) => v.is_finite(),
            PropertyValue::Array(values) => values.iter().all(|v| v.is_finite()),
            PropertyValue::Map(nested) => {
                return non_finite_key(nested).map(|inner| format!("{key}.{inner}"));
            }
            PropertyValue::Bool(_) | PropertyValue::Text(_) => true,
        };
        (!finite).then(|| key.clone())
    })
}

fn malformed(detail: impl Into<String>) -> DecodeError {
    DecodeError::MalformedDocument(detail.into())
}

fn take_either(object: &mut Map<String, Value>, key: &str, alias: &str) -> Option<Value> {
    object.remove(key).or_else(|| object.remove(alias))
}

/// Rebuild a chain from a document and recompute every node.
///
/// The returned chain shares nothing with whatever produced the
/// document. Kernel skips during the recompute are logged and leave the
/// affected node holding its `held_output`, or its predecessor's output
/// when the document has none.
///
/// # Errors
///
/// Returns [`ChainError::Decode`] if any level is malformed or names an
/// unknown modification, and any non-kernel error from the recompute.
pub fn from_document(document: Value) -> Result<ModificationNode, ChainError> {
    let mut chain = decode_node(document)?;
    let skipped = chain.update_chain()?;
    for skip in &skipped {
        log::warn!(
            "node {} ({}) kept its input after import: {}",
            skip.position,
            skip.kind,
            skip.reason
        );
    }
    log::debug!("decoded chain of {} node(s)", chain.length());
    Ok(chain)
}

fn decode_node(document: Value) -> Result<ModificationNode, DecodeError> {
    let Value::Object(mut object) = document else {
        return Err(malformed("expected a JSON object for each chain node"));
    };
    let tag = match object.get(CLASS_KEY) {
        Some(Value::String(tag)) => tag.clone(),
        Some(other) => return Err(malformed(format!("{CLASS_KEY} must be a string, found {other}"))),
        None => return Err(malformed(format!("missing {CLASS_KEY}"))),
    };
    let kind = ModificationKind::from_tag(&tag).ok_or_else(|| DecodeError::UnknownVariant(tag.clone()))?;

    let predecessor = take_either(&mut object, PREDECESSOR_KEY, PREDECESSOR_ALIAS)
        .ok_or_else(|| malformed(format!("{tag} is missing {PREDECESSOR_KEY}")))?;
    let timestamp = match take_either(&mut object, DATE_KEY, DATE_ALIAS) {
        Some(Value::String(date)) => date,
        Some(other) => return Err(malformed(format!("{tag} has a non-string date {other}"))),
        None => crate::timestamp::now(),
    };
    let properties: Properties = match object.remove(PROPERTIES_KEY) {
        Some(Value::Null) | None => Properties::new(),
        Some(value) => serde_json::from_value(value).map_err(|e| DecodeError::TypeMismatch {
            variant: tag.clone(),
            detail: format!("properties: {e}"),
        })?,
    };

    let held_output: Option<ImageBuffer> = match object.remove(HELD_OUTPUT_KEY) {
        Some(Value::Null) | None => None,
        Some(value) => Some(serde_json::from_value(value).map_err(|e| {
            DecodeError::TypeMismatch {
                variant: tag.clone(),
                detail: format!("{HELD_OUTPUT_KEY}: {e}"),
            }
        })?),
    };

    let predecessor = match predecessor {
        Value::Null => None,
        value => Some(decode_node(value)?),
    };
    match (kind, &predecessor) {
        (ModificationKind::InitialImage, Some(_)) => {
            return Err(malformed("InitialImage must be the root of the chain"));
        }
        (ModificationKind::InitialImage, None) | (_, Some(_)) => {}
        (_, None) => return Err(malformed(format!("{tag} has a null {PREDECESSOR_KEY}"))),
    }

    let modification: Modification =
        serde_json::from_value(Value::Object(object)).map_err(|e| {
            let detail = e.to_string();
            if detail.starts_with("missing field") {
                malformed(format!("{tag}: {detail}"))
            } else {
                DecodeError::TypeMismatch {
                    variant: tag.clone(),
                    detail,
                }
            }
        })?;

    Ok(ModificationNode::restore(
        predecessor,
        modification,
        properties,
        timestamp,
        held_output,
    ))
}

/// Pretty-printed document text for `node`.
///
/// # Errors
///
/// Returns [`DecodeError::Json`] if serialisation fails.
pub fn to_json(node: &ModificationNode) -> Result<String, DecodeError> {
    Ok(serde_json::to_string_pretty(&to_document(node)?)?)
}

/// Parse document text and rebuild the chain.
///
/// # Errors
///
/// See [`from_document`]; unparseable text is [`DecodeError::Json`].
pub fn from_json(text: &str) -> Result<ModificationNode, ChainError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::from)?;
    from_document(value)
}

/// [`from_json`] for a named document, so a failure says which one.
///
/// # Errors
///
/// Decode failures become [`ChainError::Import`] carrying `label`.
pub fn import_document(label: &str, text: &str) -> Result<ModificationNode, ChainError> {
    from_json(text).map_err(|e| match e {
        ChainError::Decode(source) => ChainError::Import {
            document: label.to_string(),
            source,
        },
        other => other,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::modification::Blur;
    use crate::types::{GrayImage, ImageBuffer};

    fn chain() -> ModificationNode {
        let img = GrayImage::from_fn(6, 4, |x, y| image::Luma([u8::try_from(x * 40 + y).unwrap()]));
        let root = ModificationNode::initial(ImageBuffer::Gray(img)).unwrap();
        ModificationNode::new(root, Modification::Blur(Blur { gaussian_size: 3 })).unwrap()
    }

    #[test]
    fn document_nests_through_mod_in() {
        let doc = to_document(&chain()).unwrap();
        assert_eq!(doc[CLASS_KEY], "Blur");
        assert_eq!(doc["gaussian_size"], 3);
        assert_eq!(doc[PREDECESSOR_KEY][CLASS_KEY], "InitialImage");
        assert_eq!(doc[PREDECESSOR_KEY][PREDECESSOR_KEY], Value::Null);
        assert_eq!(doc[PREDECESSOR_KEY]["img_out"][0][1], 40);
    }

    #[test]
    fn round_trip_preserves_outputs_and_dates() {
        let original = chain();
        let text = to_json(&original).unwrap();
        let back = from_json(&text).unwrap();
        assert_eq!(back.image(), original.image());
        assert_eq!(back.timestamp(), original.timestamp());
        assert_eq!(back.length(), 2);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let doc = json!({"@class": "Sharpen", "mod_in": null});
        assert!(matches!(
            from_document(doc),
            Err(ChainError::Decode(DecodeError::UnknownVariant(tag))) if tag == "Sharpen"
        ));
    }

    #[test]
    fn nested_unknown_tag_rejects_whole_document() {
        let mut doc = to_document(&chain()).unwrap();
        doc[PREDECESSOR_KEY][CLASS_KEY] = json!("Mystery");
        assert!(matches!(
            from_document(doc),
            Err(ChainError::Decode(DecodeError::UnknownVariant(_)))
        ));
    }

    #[test]
    fn missing_field_is_malformed() {
        let mut doc = to_document(&chain()).unwrap();
        doc.as_object_mut().unwrap().remove("gaussian_size");
        assert!(matches!(
            from_document(doc),
            Err(ChainError::Decode(DecodeError::MalformedDocument(_)))
        ));
    }

    #[test]
    fn missing_predecessor_key_is_malformed() {
        let mut doc = to_document(&chain()).unwrap();
        doc.as_object_mut().unwrap().remove(PREDECESSOR_KEY);
        assert!(matches!(
            from_document(doc),
            Err(ChainError::Decode(DecodeError::MalformedDocument(_)))
        ));
    }

    #[test]
    fn wrong_field_type_names_variant() {
        let mut doc = to_document(&chain()).unwrap();
        doc["gaussian_size"] = json!("five");
        assert!(matches!(
            from_document(doc),
            Err(ChainError::Decode(DecodeError::TypeMismatch { variant, .. })) if variant == "Blur"
        ));
    }

    #[test]
    fn non_root_with_null_predecessor_is_malformed() {
        let doc = json!({"@class": "BinaryMask", "mod_in": null});
        assert!(matches!(
            from_document(doc),
            Err(ChainError::Decode(DecodeError::MalformedDocument(_)))
        ));
    }

    #[test]
    fn aliases_are_accepted() {
        let mut doc = to_document(&chain()).unwrap();
        let object = doc.as_object_mut().unwrap();
        let pred = object.remove(PREDECESSOR_KEY).unwrap();
        let date = object.remove(DATE_KEY).unwrap();
        object.insert("predecessor".into(), pred);
        object.insert("timestamp".into(), date.clone());
        let back = from_document(doc).unwrap();
        assert_eq!(back.timestamp(), date.as_str().unwrap());
    }

    #[test]
    fn import_error_carries_label() {
        let err = import_document("sample-7.json", "{\"@class\": 3}").unwrap_err();
        assert!(matches!(
            err,
            ChainError::Import { ref document, source: DecodeError::MalformedDocument(_) }
                if document == "sample-7.json"
        ));
        let err = import_document("broken.json", "{").unwrap_err();
        assert!(matches!(
            err,
            ChainError::Import { source: DecodeError::Json(_), .. }
        ));
    }
}
