//! Type map side channel

use indexmap::IndexMap;
use serde_json::{Map, Value as Json};
use tagson_format::constants::BACK_REFERENCE;
use tagson_format::{Result, TagsonError};

/// Type annotation of one keypath
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    /// Single registered type
    Single(String),
    /// Chained conversions, applied in order on revival
    Chain(Vec<String>),
    /// Node is a back-reference to an earlier keypath
    BackReference,
}

impl TypeTag {
    /// Type names in revival order (empty for back-references)
    pub fn names(&self) -> Vec<String> {
        match self {
            TypeTag::Single(name) => vec![name.clone()],
            TypeTag::Chain(names) => names.clone(),
            TypeTag::BackReference => Vec::new(),
        }
    }

    fn to_json(&self) -> Json {
        match self {
            TypeTag::Single(name) => Json::String(name.clone()),
            TypeTag::Chain(names) => Json::Array(names.iter().cloned().map(Json::String).collect()),
            TypeTag::BackReference => Json::String(BACK_REFERENCE.to_string()),
        }
    }

    fn from_json(keypath: &str, json: &Json) -> Result<Self> {
        match json {
            Json::String(s) if s == BACK_REFERENCE => Ok(TypeTag::BackReference),
            Json::String(s) => Ok(TypeTag::Single(s.clone())),
            Json::Array(items) => {
                let names = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            TagsonError::InvalidTypeMap(format!(
                                "chain at '{}' contains a non-string entry",
                                keypath
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                match names.len() {
                    0 => Err(TagsonError::InvalidTypeMap(format!(
                        "empty chain at '{}'",
                        keypath
                    ))),
                    1 => Ok(TypeTag::Single(names.into_iter().next().unwrap_or_default())),
                    _ => Ok(TypeTag::Chain(names)),
                }
            }
            other => Err(TagsonError::InvalidTypeMap(format!(
                "entry at '{}' must be a string or array, found {}",
                keypath,
                tagson_format::classify::json_type_of(other)
            ))),
        }
    }
}

/// Keypath to type annotation, in detection order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeMap {
    entries: IndexMap<String, TypeTag>,
}

impl TypeMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no types were recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of annotated keypaths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Annotation at `keypath`
    pub fn get(&self, keypath: &str) -> Option<&TypeTag> {
        self.entries.get(keypath)
    }

    /// Iterate annotations in detection order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypeTag)> {
        self.entries.iter()
    }

    /// Record `name` as the outermost conversion at `keypath`
    ///
    /// Replacement results are annotated after the type that produced them,
    /// so a later name runs first on revival.
    pub fn prepend(&mut self, keypath: &str, name: &str) {
        let Some(tag) = self.entries.get_mut(keypath) else {
            self.entries
                .insert(keypath.to_string(), TypeTag::Single(name.to_string()));
            return;
        };
        *tag = match std::mem::replace(tag, TypeTag::BackReference) {
            TypeTag::BackReference => TypeTag::Single(name.to_string()),
            TypeTag::Single(existing) => TypeTag::Chain(vec![name.to_string(), existing]),
            TypeTag::Chain(mut names) => {
                names.insert(0, name.to_string());
                TypeTag::Chain(names)
            }
        };
    }

    /// Drop the annotation at `keypath`
    pub(crate) fn remove(&mut self, keypath: &str) {
        self.entries.shift_remove(keypath);
    }

    /// Mark `keypath` as a back-reference
    pub fn mark_back_reference(&mut self, keypath: &str) {
        self.entries
            .insert(keypath.to_string(), TypeTag::BackReference);
    }

    /// Distinct type names in detection order, excluding back-references
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for tag in self.entries.values() {
            for name in tag.names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// JSON form of the map
    pub fn to_json(&self) -> Json {
        let map: Map<String, Json> = self
            .entries
            .iter()
            .map(|(k, tag)| (k.clone(), tag.to_json()))
            .collect();
        Json::Object(map)
    }

    /// Parse the JSON form of the map
    pub fn from_json(map: &Map<String, Json>) -> Result<Self> {
        let mut entries = IndexMap::with_capacity(map.len());
        for (keypath, tag) in map {
            entries.insert(keypath.clone(), TypeTag::from_json(keypath, tag)?);
        }
        Ok(Self { entries })
    }
}
