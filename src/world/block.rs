// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

//! The process-wide block-state registry.
//!
//! Block states are interned once and referred to by [`BlockHandle`]
//! everywhere else, so a region full of stone costs one table entry rather
//! than 4096 strings per section. The table is append-only; a handle stays
//! valid for the life of the process.

use crate::nbt::NbtTag;
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock, Mutex};

/// Property key/value map of a block state.
pub type Properties = BTreeMap<String, String>;

/// A namespaced block id plus its property map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockState {
    id: String,
    properties: Properties,
}

impl BlockState {
    /// The namespaced id, e.g. `minecraft:stone`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Emits the palette-entry form: `{Name, Properties?}`.
    ///
    /// `Properties` is omitted when the state has none, matching what the
    /// game writes.
    pub fn to_nbt(&self) -> NbtTag {
        let mut map = IndexMap::new();
        map.insert("Name".to_string(), NbtTag::String(self.id.clone()));
        if !self.properties.is_empty() {
            let props = self
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), NbtTag::String(v.clone())))
                .collect();
            map.insert("Properties".to_string(), NbtTag::Compound(props));
        }
        NbtTag::Compound(map)
    }
}

/// Opaque handle to an interned [`BlockState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHandle(u32);

/// The handle for `minecraft:air`, always the first registry entry.
pub const AIR: BlockHandle = BlockHandle(0);

struct Registry {
    states: Vec<Arc<BlockState>>,
    by_state: HashMap<Arc<BlockState>, BlockHandle>,
}

impl Registry {
    fn with_builtins() -> Self {
        let mut registry = Self {
            states: Vec::new(),
            by_state: HashMap::new(),
        };
        // Air must come first so that AIR is handle 0.
        for id in ["air", "bedrock", "stone", "dirt", "grass_block"] {
            registry.intern(normalize(id), Properties::new());
        }
        registry
    }

    fn intern(&mut self, id: String, properties: Properties) -> BlockHandle {
        let state = Arc::new(BlockState { id, properties });
        if let Some(&handle) = self.by_state.get(&state) {
            return handle;
        }
        let handle = BlockHandle(self.states.len() as u32);
        self.states.push(Arc::clone(&state));
        self.by_state.insert(state, handle);
        handle
    }
}

static REGISTRY: LazyLock<Mutex<Registry>> = LazyLock::new(|| Mutex::new(Registry::with_builtins()));

/// A bare id gets the `minecraft:` namespace.
fn normalize(id: &str) -> String {
    if id.contains(':') {
        id.to_string()
    } else {
        format!("minecraft:{id}")
    }
}

/// Interns `(id, properties)` and returns its handle.
///
/// Idempotent: the same pair always yields the same handle.
pub fn intern(id: &str, properties: Properties) -> BlockHandle {
    REGISTRY.lock().unwrap().intern(normalize(id), properties)
}

/// Interns a property-less block state.
pub fn intern_simple(id: &str) -> BlockHandle {
    intern(id, Properties::new())
}

/// Returns the handle for `(id, properties)` if it has been interned.
pub fn find(id: &str, properties: &Properties) -> Option<BlockHandle> {
    let state = BlockState {
        id: normalize(id),
        properties: properties.clone(),
    };
    REGISTRY.lock().unwrap().by_state.get(&state).copied()
}

/// Resolves a handle back to its block state.
///
/// # Panics
///
/// Panics on a handle that was never issued by [`intern`]. Handles are
/// never retired, so every issued handle resolves.
pub fn lookup(handle: BlockHandle) -> Arc<BlockState> {
    Arc::clone(&REGISTRY.lock().unwrap().states[handle.0 as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_handle_zero() {
        assert_eq!(intern_simple("air"), AIR);
        assert_eq!(lookup(AIR).id(), "minecraft:air");
    }

    #[test]
    fn test_intern_is_idempotent() {
        let mut props = Properties::new();
        props.insert("facing".to_string(), "north".to_string());
        let a = intern("minecraft:furnace", props.clone());
        let b = intern("minecraft:furnace", props.clone());
        assert_eq!(a, b);
        assert_eq!(find("minecraft:furnace", &props), Some(a));
    }

    #[test]
    fn test_bare_id_gets_minecraft_namespace() {
        let bare = intern_simple("stone");
        let qualified = intern_simple("minecraft:stone");
        assert_eq!(bare, qualified);
        assert_eq!(lookup(bare).id(), "minecraft:stone");
    }

    #[test]
    fn test_custom_namespace_is_kept() {
        let handle = intern_simple("mymod:widget");
        assert_eq!(lookup(handle).id(), "mymod:widget");
    }

    #[test]
    fn test_distinct_properties_get_distinct_handles() {
        let mut lit = Properties::new();
        lit.insert("lit".to_string(), "true".to_string());
        let mut unlit = Properties::new();
        unlit.insert("lit".to_string(), "false".to_string());
        assert_ne!(
            intern("minecraft:campfire", lit),
            intern("minecraft:campfire", unlit)
        );
    }

    #[test]
    fn test_find_misses_unregistered() {
        assert_eq!(find("mymod:never_interned_state", &Properties::new()), None);
    }

    #[test]
    fn test_to_nbt_omits_empty_properties() {
        let state = lookup(intern_simple("bedrock"));
        let tag = state.to_nbt();
        let map = tag.as_compound().unwrap();
        assert_eq!(
            map.get("Name"),
            Some(&NbtTag::String("minecraft:bedrock".to_string()))
        );
        assert!(!map.contains_key("Properties"));
    }
}
