#![forbid(unsafe_code)]

//! Story data consumed by the runtime: steps and the object index.
//!
//! Both arrive fully materialized from the site build. The runtime never
//! mutates them after loading. Parsing is lenient where spreadsheet-sourced
//! data is known to be messy: coordinates may be numbers or numeric strings,
//! empty cells fall back to defaults, and object lookups ignore case.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LoadError;
use crate::geometry::{NormalizedRegion, ViewSpec};
use crate::panel::PanelLayer;

/// Default horizontal position for steps that leave `x` empty.
pub const DEFAULT_X: f64 = 0.5;
/// Default vertical position for steps that leave `y` empty.
pub const DEFAULT_Y: f64 = 0.5;
/// Default zoom multiplier for steps that leave `zoom` empty.
pub const DEFAULT_ZOOM: f64 = 1.0;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// One leniently parsed coordinate cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Coordinate {
    /// Empty or absent; the field default applies.
    #[default]
    Missing,
    Value(f64),
    /// Present but not numeric. Position application is skipped.
    Invalid,
}

impl Coordinate {
    /// Resolve to a number, substituting `default` for a missing cell.
    #[must_use]
    pub fn resolve(self, default: f64) -> Option<f64> {
        match self {
            Self::Missing => Some(default),
            Self::Value(v) => Some(v),
            Self::Invalid => None,
        }
    }
}

impl From<f64> for Coordinate {
    fn from(v: f64) -> Self {
        Self::Value(v)
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
            Other(serde_json::Value),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => Self::Missing,
            Some(Raw::Number(v)) => Self::Value(v),
            Some(Raw::Text(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    Self::Missing
                } else {
                    text.parse::<f64>().map_or(Self::Invalid, Self::Value)
                }
            }
            Some(Raw::Other(_)) => Self::Invalid,
        })
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::Missing | Self::Invalid => serializer.serialize_none(),
        }
    }
}

fn label_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Integer(i64),
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => String::new(),
        Some(Raw::Integer(n)) => n.to_string(),
        Some(Raw::Number(n)) => n.to_string(),
        Some(Raw::Text(text)) => text.trim().to_owned(),
    })
}

fn non_empty_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty()))
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One narrative unit bound to an object and a view.
///
/// Steps are addressed by index. `number` is only the user-facing label and
/// may skip values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, rename = "step", deserialize_with = "label_from_any")]
    pub number: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub x: Coordinate,
    #[serde(default)]
    pub y: Coordinate,
    #[serde(default)]
    pub zoom: Coordinate,
    /// Region alternative to point+zoom. Takes precedence when present.
    #[serde(default)]
    pub region: Option<NormalizedRegion>,
    #[serde(default, deserialize_with = "non_empty_text")]
    pub layer1: Option<String>,
    #[serde(default, deserialize_with = "non_empty_text")]
    pub layer2: Option<String>,
    /// Introductory slide without a viewer position of its own.
    #[serde(default)]
    pub intro: bool,
}

impl Step {
    /// A plain point step, mostly for hosts and tests building stories in code.
    #[must_use]
    pub fn at(object: impl Into<String>, x: f64, y: f64, zoom: f64) -> Self {
        Self {
            object: object.into(),
            x: x.into(),
            y: y.into(),
            zoom: zoom.into(),
            ..Self::default()
        }
    }

    /// An introductory slide.
    #[must_use]
    pub fn intro() -> Self {
        Self {
            intro: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = number.into();
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: NormalizedRegion) -> Self {
        self.region = Some(region);
        self
    }

    #[must_use]
    pub fn with_layer(mut self, layer: PanelLayer, reference: impl Into<String>) -> Self {
        match layer {
            PanelLayer::Layer1 => self.layer1 = Some(reference.into()),
            PanelLayer::Layer2 => self.layer2 = Some(reference.into()),
            PanelLayer::Glossary => {}
        }
        self
    }

    /// Object identifier, or `None` for steps without a viewer object.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        let id = self.object.trim();
        (!id.is_empty()).then_some(id)
    }

    /// Resolved view, or `None` when a coordinate cell is not numeric.
    #[must_use]
    pub fn view_spec(&self) -> Option<ViewSpec> {
        if let Some(region) = self.region {
            return Some(ViewSpec::Region(region));
        }
        Some(ViewSpec::point(
            self.x.resolve(DEFAULT_X)?,
            self.y.resolve(DEFAULT_Y)?,
            self.zoom.resolve(DEFAULT_ZOOM)?,
        ))
    }

    /// Panel reference for one of the step's own layers.
    #[must_use]
    pub fn layer_ref(&self, layer: PanelLayer) -> Option<&str> {
        match layer {
            PanelLayer::Layer1 => self.layer1.as_deref(),
            PanelLayer::Layer2 => self.layer2.as_deref(),
            PanelLayer::Glossary => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// Metadata for one zoomable image object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectRecord {
    #[serde(alias = "id")]
    pub object_id: String,
    /// External manifest URL.
    #[serde(default, deserialize_with = "non_empty_text")]
    pub source_url: Option<String>,
    /// Legacy name for `source_url`, still emitted by older builds.
    #[serde(default, deserialize_with = "non_empty_text")]
    pub iiif_manifest: Option<String>,
    #[serde(default, deserialize_with = "non_empty_text")]
    pub credit: Option<String>,
    #[serde(default, deserialize_with = "non_empty_text")]
    pub title: Option<String>,
}

impl ObjectRecord {
    #[must_use]
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// External manifest URL, if the object is hosted elsewhere.
    #[must_use]
    pub fn external_manifest(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .or(self.iiif_manifest.as_deref())
    }
}

/// Case-insensitive index of object records.
#[derive(Debug, Clone, Default)]
pub struct ObjectIndex {
    records: HashMap<String, ObjectRecord>,
}

/// Normalized key under which an object identifier is indexed and pooled.
#[must_use]
pub fn object_key(id: &str) -> String {
    id.trim().to_lowercase()
}

impl ObjectIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records. Later duplicates replace earlier ones.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = ObjectRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (object_key(&record.object_id), record))
            .collect();
        Self { records }
    }

    /// Parse the object list emitted by the site build (a JSON array).
    pub fn from_json_str(json: &str) -> Result<Self, LoadError> {
        let records: Vec<ObjectRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    #[must_use]
    pub fn get(&self, object_id: &str) -> Option<&ObjectRecord> {
        self.records.get(&object_key(object_id))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

/// Everything the runtime needs about one story.
#[derive(Debug, Clone, Default)]
pub struct Story {
    pub steps: Vec<Step>,
    pub objects: ObjectIndex,
    /// Protected stories start only after the unlock signal.
    pub protected: bool,
}

impl Story {
    #[must_use]
    pub fn new(steps: Vec<Step>, objects: ObjectIndex) -> Self {
        Self {
            steps,
            objects,
            protected: false,
        }
    }

    #[must_use]
    pub fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    /// Parse steps and objects JSON and validate the result.
    pub fn from_json(steps_json: &str, objects_json: &str) -> Result<Self, LoadError> {
        let steps: Vec<Step> = serde_json::from_str(steps_json)?;
        let story = Self::new(steps, ObjectIndex::from_json_str(objects_json)?);
        let errors = story.validate();
        if errors.is_empty() {
            Ok(story)
        } else {
            Err(LoadError::Validation(errors))
        }
    }

    /// Structural checks. Missing object records are not errors; they are
    /// reported when a card is created and fall back to a local manifest.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.steps.is_empty() {
            errors.push("story has no steps".into());
        }
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(region) = step.region
                && (region.width <= 0.0 || region.height <= 0.0)
            {
                errors.push(format!(
                    "step index {index} (\"{}\") has an empty region",
                    step.number
                ));
            }
        }
        errors
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }
}
