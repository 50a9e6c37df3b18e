//! A keyed, in-memory cache of remote entries.
//!
//! The central type is [`CachedResource`], which holds values by key, tracks per-key metadata
//! such as outdatedness and load errors, and deduplicates concurrent loads through a
//! [`ResourceLoader`]. Entries are addressed by [`ResourceKey`]s, which can be aliases resolved
//! through the resource's [`AliasRegistry`].

#[macro_use]
pub mod metrics;

pub mod aliases;
pub mod config;
pub mod error;
pub mod events;
pub mod key;
pub mod loader;
pub mod logging;
pub mod metadata;
pub mod pagination;
pub mod resource;
pub mod store;
pub mod sync;
pub mod use_tracker;
pub mod utils;

pub use aliases::{AliasContext, AliasRegistry, KeyTargets};
pub use error::{KeyError, LoadError, ResourceError, SyncError};
pub use events::{DataError, ResourceEvents, Subscribers, Subscription, SubscriptionId};
pub use key::{AliasParam, AliasToken, Key, ResourceAlias, ResourceKey};
pub use loader::{FnLoader, LoadRequest, ResourceLoader, loader_fn};
pub use metadata::{MetaKey, Metadata, MetadataStore};
pub use pagination::{OFFSET_PAGE, OFFSET_PAGE_LIST, PageInfo, offset_page_key, offset_page_list_key};
pub use resource::{ALL_ITEMS, CachedMapResource, CachedResource, CachedTreeResource};
pub use store::{MapStore, ResourceStore, TREE_CHILDREN, TREE_ROOT_CHILDREN, TreeStore, tree_children_key};
pub use sync::{ResourceId, ResourceNode, SyncSource};
pub use use_tracker::{UseEvent, UseId};
