//! The configuration tree built by the parser.
//!
//! Four nested levels of insertion-ordered maps:
//! file → category → subcategory (platform qualifier) → value pack → key → values.
//! Lookups are total: a missing key at any level yields an empty node.

use crate::platform::Platform;
use indexmap::IndexMap;
use std::sync::LazyLock;

pub type ValueList = Vec<String>;

/// One level of the tree: a string-keyed, insertion-ordered mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<T> {
    entries: IndexMap<String, T>,
}

pub type ValuePack = Section<ValueList>;
pub type Subcategory = Section<ValuePack>;
pub type Category = Section<Subcategory>;
pub type ConfigFile = Section<Category>;

/// Shared empty node returned for missing keys.
pub trait EmptyNode: 'static {
    fn empty() -> &'static Self;
}

impl EmptyNode for ValueList {
    fn empty() -> &'static Self {
        static EMPTY: ValueList = Vec::new();
        &EMPTY
    }
}

macro_rules! empty_section {
    ($($ty:ty),*) => {
        $(
            impl EmptyNode for $ty {
                fn empty() -> &'static Self {
                    static EMPTY: LazyLock<$ty> = LazyLock::new(Section::default);
                    &EMPTY
                }
            }
        )*
    };
}

empty_section!(ValuePack, Subcategory, Category, ConfigFile);

impl<T> Default for Section<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T> Section<T> {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: EmptyNode + Default> Section<T> {
    pub fn get(&self, key: &str) -> &T {
        self.entries.get(key).unwrap_or_else(|| T::empty())
    }

    pub fn entry(&mut self, key: &str) -> &mut T {
        self.entries.entry(key.to_string()).or_default()
    }
}

impl ConfigFile {
    /// Values bound to `key` at the fully qualified path, or an empty slice.
    pub fn value(&self, category: &str, qualifier: &str, pack: &str, key: &str) -> &[String] {
        self.get(category).get(qualifier).get(pack).get(key)
    }

    /// First value of `key` in the default subcategory and default pack.
    pub fn first(&self, category: &str, key: &str) -> Option<&str> {
        self.value(category, "", "", key).first().map(String::as_str)
    }
}

/// Subcategories of `category` that apply on `platform`: the default one
/// first, then every matching qualified one in file order.
pub fn applicable<'a>(
    category: &'a Category,
    platform: &'a Platform,
) -> impl Iterator<Item = &'a Subcategory> + 'a {
    std::iter::once(category.get("")).chain(
        category
            .iter()
            .filter(move |(q, _)| !q.is_empty() && platform.matches(q))
            .map(|(_, sub)| sub),
    )
}

/// Values of `pack`/`key` merged across every applicable subcategory.
pub fn values_for_platform(
    category: &Category,
    pack: &str,
    key: &str,
    platform: &Platform,
) -> Vec<String> {
    applicable(category, platform)
        .flat_map(|sub| sub.get(pack).get(key).iter().cloned())
        .collect()
}

/// Value packs of `sub` that apply on `platform`: the unnamed pack first,
/// then every pack named after a host identifier, in file order.
pub fn packs_for_platform<'a>(
    sub: &'a Subcategory,
    platform: &'a Platform,
) -> impl Iterator<Item = &'a ValuePack> + 'a {
    std::iter::once(sub.get("")).chain(
        sub.iter()
            .filter(move |(name, _)| !name.is_empty() && platform.matches(name))
            .map(|(_, pack)| pack),
    )
}
