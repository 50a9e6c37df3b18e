use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::KeyError;
use crate::key::{AliasToken, ResourceAlias, ResourceKey, is_arrays_equal_by};
use crate::metadata::MetaKey;
use crate::pagination::PageInfo;

/// Read access to the state of a resource while aliases are resolved.
pub trait AliasContext<K> {
    /// All keys currently holding data.
    fn keys(&self) -> Vec<K>;

    /// The direct children of `parent`, or the root nodes for `None`.
    ///
    /// Only hierarchical resources have children.
    fn children(&self, _parent: Option<&K>) -> Vec<K> {
        Vec::new()
    }

    /// The loaded pages of a paginated target key.
    fn page_info(&self, _target: &ResourceKey<K>) -> Option<&PageInfo<K>> {
        None
    }
}

/// Expands an alias into another key, which may be an alias again.
pub type Resolver<K> =
    Arc<dyn Fn(&ResourceAlias<K>, &dyn AliasContext<K>) -> Result<ResourceKey<K>, KeyError> + Send + Sync>;

/// The metadata entries an operation on a key touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTargets<K> {
    /// The alias as requested, if the key was an alias.
    pub alias: Option<ResourceAlias<K>>,
    /// The concrete keys the key resolved to.
    pub keys: Vec<K>,
}

impl<K: Clone> KeyTargets<K> {
    pub fn meta_keys(&self) -> impl Iterator<Item = MetaKey<K>> + '_ {
        self.alias
            .iter()
            .cloned()
            .map(MetaKey::Alias)
            .chain(self.keys.iter().cloned().map(MetaKey::Key))
    }

    /// Adds `keys` that are not targeted yet.
    pub fn extend(&mut self, keys: impl IntoIterator<Item = K>)
    where
        K: PartialEq,
    {
        for key in keys {
            if !self.keys.contains(&key) {
                self.keys.push(key);
            }
        }
    }
}

/// Resolves alias keys into concrete keys.
///
/// Every alias kind is identified by its [`AliasToken`]. A resolver may return another alias,
/// which is resolved in turn. Aliases without a registered resolver fall back to their parent
/// key, if they have one.
pub struct AliasRegistry<K> {
    resolvers: BTreeMap<AliasToken, Resolver<K>>,
}

impl<K> Default for AliasRegistry<K> {
    fn default() -> Self {
        Self {
            resolvers: BTreeMap::new(),
        }
    }
}

impl<K> fmt::Debug for AliasRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.resolvers.keys()).finish()
    }
}

impl<K> AliasRegistry<K>
where
    K: Clone + PartialEq,
{
    /// Registers a resolver for a new alias kind.
    pub fn add<F>(&mut self, token: AliasToken, resolver: F) -> Result<(), KeyError>
    where
        F: Fn(&ResourceAlias<K>, &dyn AliasContext<K>) -> Result<ResourceKey<K>, KeyError>
            + Send
            + Sync
            + 'static,
    {
        if self.resolvers.contains_key(&token) {
            return Err(KeyError::AliasAlreadyRegistered(token));
        }
        self.resolvers.insert(token, Arc::new(resolver));
        Ok(())
    }

    /// Registers a resolver, overriding any resolver already registered for `token`.
    pub fn replace<F>(&mut self, token: AliasToken, resolver: F)
    where
        F: Fn(&ResourceAlias<K>, &dyn AliasContext<K>) -> Result<ResourceKey<K>, KeyError>
            + Send
            + Sync
            + 'static,
    {
        self.resolvers.insert(token, Arc::new(resolver));
    }

    pub fn contains(&self, token: AliasToken) -> bool {
        self.resolvers.contains_key(&token)
    }

    /// Returns the alias if `key` is an alias of kind `token`.
    pub fn is_alias<'a>(
        &self,
        key: &'a ResourceKey<K>,
        token: AliasToken,
    ) -> Option<&'a ResourceAlias<K>> {
        key.as_alias().filter(|alias| alias.is(token))
    }

    /// Resolves `key` down to a flat key or a list of keys.
    pub fn transform_to_key(
        &self,
        key: &ResourceKey<K>,
        ctx: &dyn AliasContext<K>,
    ) -> Result<ResourceKey<K>, KeyError> {
        let mut visited: Vec<AliasToken> = Vec::new();
        let mut current = key.clone();

        loop {
            let alias = match current {
                ResourceKey::Alias(alias) => alias,
                concrete => return Ok(concrete),
            };
            if visited.contains(&alias.token()) {
                return Err(KeyError::CyclicAlias(alias.token()));
            }

            let next = match self.resolvers.get(&alias.token()) {
                Some(resolver) => resolver(&alias, ctx)?,
                None => match alias.parent() {
                    Some(parent) => parent.clone(),
                    None => return Err(KeyError::UnregisteredAlias(alias.token())),
                },
            };
            visited.push(alias.token());
            current = next;
        }
    }

    /// Finds the alias a list of keys is currently known as.
    ///
    /// Returns the first parameterless alias whose non-empty resolution equals the list,
    /// regardless of order, or the key itself.
    pub fn transform_to_alias(
        &self,
        key: &ResourceKey<K>,
        ctx: &dyn AliasContext<K>,
        eq: &dyn Fn(&K, &K) -> bool,
    ) -> ResourceKey<K> {
        let ResourceKey::List(keys) = key else {
            return key.clone();
        };

        for token in self.resolvers.keys() {
            let alias = ResourceKey::alias(*token);
            if let Ok(ResourceKey::List(resolved)) = self.transform_to_key(&alias, ctx) {
                if !resolved.is_empty() && is_arrays_equal_by(&resolved, keys, false, &eq) {
                    return alias;
                }
            }
        }
        key.clone()
    }

    /// Returns the metadata entries addressed by `key`.
    pub fn expand(
        &self,
        key: &ResourceKey<K>,
        ctx: &dyn AliasContext<K>,
    ) -> Result<KeyTargets<K>, KeyError> {
        let alias = key.as_alias().cloned();
        let keys = self.transform_to_key(key, ctx)?.to_list()?;
        Ok(KeyTargets { alias, keys })
    }
}
