//! Addressing entries of a resource.
//!
//! Every operation on a resource takes a [`ResourceKey`], which is one of:
//!
//! - a single key ([`ResourceKey::Flat`]),
//! - a list of keys ([`ResourceKey::List`]),
//! - a named, parametrized query ([`ResourceKey::Alias`]) that is resolved into one of the
//!   former through the resource's [`AliasRegistry`](crate::AliasRegistry).
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Bounds every key type stored in a resource has to satisfy.
pub trait Key: Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> Key for T where T: Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static
{}

/// The tag identifying a kind of alias, like "all items" or "page of items".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AliasToken(&'static str);

impl AliasToken {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for AliasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A single parameter value of an alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasParam {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl AliasParam {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<bool> for AliasParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AliasParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for AliasParam {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for AliasParam {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for AliasParam {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl fmt::Display for AliasParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value:?}"),
        }
    }
}

/// Named alias parameters, ordered by name so that equal aliases hash equally.
pub type AliasParams = BTreeMap<String, AliasParam>;

/// A deferred query over the keys of a resource.
///
/// An alias may be chained from a `parent` key, which is how paged windows over another alias
/// (or over a list of keys) are expressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAlias<K> {
    token: AliasToken,
    params: AliasParams,
    parent: Option<Box<ResourceKey<K>>>,
}

impl<K> ResourceAlias<K> {
    pub fn new(token: AliasToken) -> Self {
        Self {
            token,
            params: AliasParams::new(),
            parent: None,
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<AliasParam>) -> Self {
        self.params.insert(name.to_owned(), value.into());
        self
    }

    pub fn with_parent(mut self, parent: ResourceKey<K>) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn token(&self) -> AliasToken {
        self.token
    }

    /// Returns `true` if this alias was created from `token`.
    pub fn is(&self, token: AliasToken) -> bool {
        self.token == token
    }

    pub fn params(&self) -> &AliasParams {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&AliasParam> {
        self.params.get(name)
    }

    pub fn parent(&self) -> Option<&ResourceKey<K>> {
        self.parent.as_deref()
    }

    fn is_equal_by<F>(&self, other: &Self, ordered: bool, eq: &F) -> bool
    where
        F: Fn(&K, &K) -> bool,
    {
        if self.token != other.token || self.params != other.params {
            return false;
        }
        match (self.parent(), other.parent()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_equal_by(b, ordered, eq),
            _ => false,
        }
    }
}

impl<K: fmt::Display> fmt::Display for ResourceAlias<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)?;
        if !self.params.is_empty() {
            f.write_str("(")?;
            for (index, (name, value)) in self.params.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}={value}")?;
            }
            f.write_str(")")?;
        }
        if let Some(parent) = &self.parent {
            write!(f, " <- {parent}")?;
        }
        Ok(())
    }
}

/// Addresses one or more entries of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey<K> {
    Flat(K),
    List(Vec<K>),
    Alias(ResourceAlias<K>),
}

impl<K> ResourceKey<K> {
    pub fn flat(key: K) -> Self {
        Self::Flat(key)
    }

    pub fn list(keys: impl IntoIterator<Item = K>) -> Self {
        Self::List(keys.into_iter().collect())
    }

    /// Creates a parameterless alias key.
    pub fn alias(token: AliasToken) -> Self {
        Self::Alias(ResourceAlias::new(token))
    }

    /// Merges flat keys and lists into a single list.
    ///
    /// Aliases have to be resolved before they can be merged.
    pub fn flatten(keys: impl IntoIterator<Item = ResourceKey<K>>) -> Result<Self, KeyError> {
        let mut list = Vec::new();
        for key in keys {
            match key {
                Self::Flat(key) => list.push(key),
                Self::List(keys) => list.extend(keys),
                Self::Alias(_) => return Err(KeyError::UnsupportedKeyKind),
            }
        }
        Ok(Self::List(list))
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, Self::Alias(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn as_alias(&self) -> Option<&ResourceAlias<K>> {
        match self {
            Self::Alias(alias) => Some(alias),
            _ => None,
        }
    }

    /// Normalizes a concrete key into a list of keys.
    pub fn to_list(&self) -> Result<Vec<K>, KeyError>
    where
        K: Clone,
    {
        match self {
            Self::Flat(key) => Ok(vec![key.clone()]),
            Self::List(keys) => Ok(keys.clone()),
            Self::Alias(_) => Err(KeyError::UnsupportedKeyKind),
        }
    }

    /// Compares two keys by value.
    ///
    /// Lists are compared regardless of order unless `ordered` is set.
    pub fn is_equal(&self, other: &Self, ordered: bool) -> bool
    where
        K: PartialEq,
    {
        self.is_equal_by(other, ordered, &|a: &K, b: &K| a == b)
    }

    /// Compares two keys using a custom key comparator.
    pub fn is_equal_by<F>(&self, other: &Self, ordered: bool, eq: &F) -> bool
    where
        F: Fn(&K, &K) -> bool,
    {
        match (self, other) {
            (Self::Flat(a), Self::Flat(b)) => eq(a, b),
            (Self::List(a), Self::List(b)) => is_arrays_equal_by(a, b, ordered, eq),
            (Self::Alias(a), Self::Alias(b)) => a.is_equal_by(b, ordered, eq),
            _ => false,
        }
    }
}

impl<K> From<ResourceAlias<K>> for ResourceKey<K> {
    fn from(alias: ResourceAlias<K>) -> Self {
        Self::Alias(alias)
    }
}

impl<K: fmt::Display> fmt::Display for ResourceKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat(key) => write!(f, "{key}"),
            Self::List(keys) => {
                f.write_str("[")?;
                for (index, key) in keys.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}")?;
                }
                f.write_str("]")
            }
            Self::Alias(alias) => write!(f, "{alias}"),
        }
    }
}

pub fn is_resource_alias<K>(key: &ResourceKey<K>) -> bool {
    key.is_alias()
}

pub fn is_resource_key_list<K>(key: &ResourceKey<K>) -> bool {
    key.is_list()
}

/// Compares two slices by value, see [`is_arrays_equal_by`].
pub fn is_arrays_equal<T: PartialEq>(a: &[T], b: &[T], ordered: bool) -> bool {
    is_arrays_equal_by(a, b, ordered, &|x: &T, y: &T| x == y)
}

/// Compares two slices element-wise.
///
/// Without `ordered`, both slices have to contain the same elements the same number of times,
/// in any order.
pub fn is_arrays_equal_by<T, F>(a: &[T], b: &[T], ordered: bool, eq: &F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    if a.len() != b.len() {
        return false;
    }
    if ordered {
        return a.iter().zip(b).all(|(x, y)| eq(x, y));
    }

    let mut matched = vec![false; b.len()];
    a.iter().all(|x| {
        let found = b
            .iter()
            .enumerate()
            .position(|(index, y)| !matched[index] && eq(x, y));
        match found {
            Some(index) => {
                matched[index] = true;
                true
            }
            None => false,
        }
    })
}
