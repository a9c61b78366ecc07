//! Cross-library references.
//!
//! A type library often uses interfaces and classes defined by another
//! library that already has bindings in some other crate. The
//! [`ReferenceMap`] records, for every class-like name the primary library
//! does not define itself, the package whose bindings define it.
//!
//! Names defined by the primary library always win. A name offered by more
//! than one auxiliary library is an error unless it is pinned to one of them.
//!
//! ```
//! use tlb_bindgen::{JsonTypeLibrary, ModelBuilder, ReferenceMap};
//!
//! let load = |json: &str| {
//!     let lib: JsonTypeLibrary = json.parse().unwrap();
//!     ModelBuilder::new().build(&lib).unwrap()
//! };
//! let primary = load(r#"{ "name": "App", "types": [] }"#);
//! let office = load(r#"{ "name": "Office", "types": [{ "kind": "dispatch", "name": "CommandBars" }] }"#);
//!
//! let refs = ReferenceMap::builder(&primary)
//!     .library(&office, "office")
//!     .build()
//!     .unwrap();
//! assert_eq!(refs.resolve("CommandBars").unwrap().package, "office");
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::error::ReferenceError;
use crate::model::{TypeDescriptor, TypeLibraryModel};
use crate::naming::cap_name;

/// Interfaces every binding gets from the runtime rather than from a package.
pub const PLATFORM_INTERFACES: &[&str] = &["IUnknown", "IDispatch", "IStream", "ISequentialStream"];

pub fn is_platform_interface(name: &str) -> bool {
    PLATFORM_INTERFACES.contains(&name)
}

/// Where an externally defined class-like name lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub package: String,
    /// Coclasses also re-export their activation function.
    pub instantiable: bool,
}

/// Class-like name → owning package, for names the primary library lacks.
#[derive(Debug, Clone, Default)]
pub struct ReferenceMap {
    own: HashSet<String>,
    entries: HashMap<String, ReferenceEntry>,
}

impl ReferenceMap {
    pub fn builder(primary: &TypeLibraryModel) -> ReferenceMapBuilder<'_> {
        ReferenceMapBuilder {
            primary,
            libraries: Vec::new(),
            pins: Vec::new(),
        }
    }

    /// Whether the primary library defines `name`.
    pub fn is_own(&self, name: &str) -> bool {
        self.own.contains(&cap_name(name))
    }

    /// Owning package of an external name. Own names never resolve.
    pub fn resolve(&self, name: &str) -> Option<&ReferenceEntry> {
        let name = cap_name(name);
        if self.own.contains(&name) {
            return None;
        }
        self.entries.get(&name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ReferenceMapBuilder<'a> {
    primary: &'a TypeLibraryModel,
    libraries: Vec<(&'a TypeLibraryModel, String)>,
    pins: Vec<(String, String)>,
}

impl<'a> ReferenceMapBuilder<'a> {
    /// Add an auxiliary library whose bindings live in `package`.
    pub fn library(mut self, model: &'a TypeLibraryModel, package: impl Into<String>) -> Self {
        self.libraries.push((model, package.into()));
        self
    }

    /// Resolve `name` to `package` when several libraries define it.
    pub fn pin(mut self, name: impl Into<String>, package: impl Into<String>) -> Self {
        self.pins.push((cap_name(&name.into()), package.into()));
        self
    }

    pub fn build(self) -> Result<ReferenceMap, ReferenceError> {
        let own: HashSet<String> = class_like_names(self.primary).map(|(name, _)| name).collect();

        // Candidates per name, in library order.
        let mut candidates: BTreeMap<String, Vec<(String, bool)>> = BTreeMap::new();
        for (model, package) in &self.libraries {
            for (name, instantiable) in class_like_names(model) {
                if own.contains(&name) {
                    continue;
                }
                let entry = candidates.entry(name).or_default();
                if !entry.iter().any(|(p, _)| p == package) {
                    entry.push((package.clone(), instantiable));
                }
            }
        }

        let pins: HashMap<&str, &str> = self
            .pins
            .iter()
            .map(|(name, package)| (name.as_str(), package.as_str()))
            .collect();
        for (name, package) in &pins {
            if own.contains(*name) {
                debug!(name, package, "pin ignored, name is defined by the primary library");
                continue;
            }
            let known = candidates
                .get(*name)
                .is_some_and(|c| c.iter().any(|(p, _)| p == package));
            if !known {
                return Err(ReferenceError::UnknownPin {
                    name: (*name).to_owned(),
                    package: (*package).to_owned(),
                });
            }
        }

        let mut entries = HashMap::with_capacity(candidates.len());
        for (name, found) in candidates {
            let chosen = match pins.get(name.as_str()) {
                Some(pinned) => found.into_iter().find(|(p, _)| p == pinned),
                None if found.len() > 1 => {
                    return Err(ReferenceError::Ambiguous {
                        name,
                        first: found[0].0.clone(),
                        second: found[1].0.clone(),
                    });
                }
                None => found.into_iter().next(),
            };
            if let Some((package, instantiable)) = chosen {
                entries.insert(
                    name,
                    ReferenceEntry {
                        package,
                        instantiable,
                    },
                );
            }
        }

        debug!(own = own.len(), references = entries.len(), "reference map built");
        Ok(ReferenceMap { own, entries })
    }
}

/// Class-like names of a model, capitalized, with whether each is a coclass.
fn class_like_names(model: &TypeLibraryModel) -> impl Iterator<Item = (String, bool)> + '_ {
    model
        .types
        .iter()
        .filter(|t| t.is_class_like() && !is_platform_interface(t.name()))
        .map(|t| (cap_name(t.name()), matches!(t, TypeDescriptor::CoClass(_))))
}

/// External names actually referenced by generated code, in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedReferenceSet {
    used: BTreeMap<String, ReferenceEntry>,
}

impl UsedReferenceSet {
    pub fn insert(&mut self, name: impl Into<String>, entry: &ReferenceEntry) {
        self.used.entry(name.into()).or_insert_with(|| entry.clone());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReferenceEntry)> {
        self.used.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
