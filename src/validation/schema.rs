//! JSON Schema for `h5p.json` and the schema-validation seam.

use jsonschema::{ValidationError as SchemaError, Validator};
use serde_json::{json, Value};

use super::ValidationError;

/// Validates a parsed document, returning one message per violation
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &Value) -> Vec<String>;
}

/// Compiled manifest schema
pub struct ManifestSchema {
    validator: Validator,
}

impl ManifestSchema {
    /// Compile the built-in manifest schema
    pub fn new() -> Result<Self, ValidationError> {
        Self::from_schema(&manifest_schema())
    }

    /// Compile an arbitrary schema document
    pub fn from_schema(schema: &Value) -> Result<Self, ValidationError> {
        let validator = Validator::new(schema).map_err(|e| {
            ValidationError::SchemaViolation(vec![format!("Failed to compile schema: {}", e)])
        })?;
        Ok(Self { validator })
    }
}

impl SchemaValidator for ManifestSchema {
    fn validate(&self, document: &Value) -> Vec<String> {
        match self.validator.validate(document) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|e| format_schema_error(&e)).collect(),
        }
    }
}

fn format_schema_error(error: &SchemaError) -> String {
    let path = error.instance_path.to_string();
    if path.is_empty() {
        error.to_string()
    } else {
        format!("{}: {}", path, error)
    }
}

/// ISO-639-1 codes plus "und" for language neutral content
const LANGUAGE_CODES: &[&str] = &[
    "aa", "ab", "ae", "af", "ak", "am", "an", "ar", "as", "av", "ay", "az", "ba", "be", "bg",
    "bh", "bi", "bm", "bn", "bo", "br", "bs", "ca", "ce", "ch", "co", "cr", "cs", "cu", "cv",
    "cy", "da", "de", "dv", "dz", "ee", "el", "en", "eo", "es", "et", "eu", "fa", "ff", "fi",
    "fj", "fo", "fr", "fy", "ga", "gd", "gl", "gn", "gu", "gv", "ha", "he", "hi", "ho", "hr",
    "ht", "hu", "hy", "hz", "ia", "id", "ie", "ig", "ii", "ik", "io", "is", "it", "iu", "ja",
    "jv", "ka", "kg", "ki", "kj", "kk", "kl", "km", "kn", "ko", "kr", "ks", "ku", "kv", "kw",
    "ky", "la", "lb", "lg", "li", "ln", "lo", "lt", "lu", "lv", "mg", "mh", "mi", "mk", "ml",
    "mn", "mr", "ms", "mt", "my", "na", "nb", "nd", "ne", "ng", "nl", "nn", "no", "nr", "nv",
    "ny", "oc", "oj", "om", "or", "os", "pa", "pi", "pl", "ps", "pt", "qu", "rm", "rn", "ro",
    "ru", "rw", "sa", "sc", "sd", "se", "sg", "si", "sk", "sl", "sm", "sn", "so", "sq", "sr",
    "ss", "st", "su", "sv", "sw", "ta", "te", "tg", "th", "ti", "tk", "tl", "tn", "to", "tr",
    "ts", "tt", "tw", "ty", "ug", "uk", "ur", "uz", "ve", "vi", "vo", "wa", "wo", "xh", "yi",
    "yo", "za", "zh", "zu", "und",
];

/// The `h5p.json` schema.
///
/// Additional properties are allowed everywhere; H5P itself does not forbid them.
pub fn manifest_schema() -> Value {
    json!({
        "type": "object",
        "required": ["title", "mainLibrary", "language", "preloadedDependencies", "embedTypes"],
        "properties": {
            "title": { "type": "string" },
            "mainLibrary": { "type": "string" },
            "language": { "type": "string", "enum": LANGUAGE_CODES },
            "preloadedDependencies": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["machineName", "majorVersion", "minorVersion"],
                    "properties": {
                        "machineName": { "type": "string" },
                        "majorVersion": { "type": ["integer", "string"] },
                        "minorVersion": { "type": ["integer", "string"] }
                    }
                }
            },
            "embedTypes": {
                "type": "array",
                "minItems": 1,
                "maxItems": 2,
                "uniqueItems": true,
                "items": { "type": "string", "enum": ["div", "iframe"] }
            },
            "authors": {
                "type": ["array", "null"],
                "items": {
                    "type": "object",
                    "required": ["name", "role"],
                    "properties": {
                        "name": { "type": "string" },
                        "role": { "type": "string", "enum": ["Author", "Editor", "Licensee", "Originator"] }
                    }
                }
            },
            "source": { "type": ["string", "null"] },
            "license": {
                "type": ["string", "null"],
                "enum": [
                    "CC-BY", "CC BY-SA", "CC BY-ND", "CC BY-NC", "CC BY-NC-SA", "CC CC-BY-NC-CD",
                    "CC0 1.0", "GNU GPL", "PD", "ODC PDDL", "CC PDM", "C", "U", null
                ]
            },
            "licenseVersion": { "type": ["string", "null"] },
            "licenseExtras": { "type": ["string", "null"] },
            "yearFrom": { "type": ["string", "null"] },
            "yearTo": { "type": ["string", "null"] },
            "changes": {
                "type": ["array", "null"],
                "items": {
                    "type": "object",
                    "required": ["date", "author", "log"],
                    "properties": {
                        "date": { "type": "string" },
                        "author": { "type": "string" },
                        "log": { "type": "string" }
                    }
                }
            },
            "authorComments": { "type": ["string", "null"] }
        },
        "additionalProperties": true
    })
}
