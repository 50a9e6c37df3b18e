use futures::FutureExt;
use futures::future::BoxFuture;
use resource_cache::config::ResourceConfig;
use resource_cache::{
    CachedResource, CachedTreeResource, FnLoader, LoadError, LoadRequest, ResourceError,
    ResourceKey, TREE_CHILDREN, TREE_ROOT_CHILDREN, loader_fn, tree_children_key,
};

use crate::setup;

type LoadTree = fn(LoadRequest<String>) -> BoxFuture<'static, Result<Vec<(String, String)>, LoadError>>;

pub type Schema = CachedTreeResource<String, FnLoader<LoadTree>>;

const PATHS: &[&str] = &[
    "db",
    "db/public",
    "db/public/users",
    "db/public/orders",
    "db/private",
    "analytics",
];

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn load_tree(request: LoadRequest<String>) -> BoxFuture<'static, Result<Vec<(String, String)>, LoadError>> {
    let paths: Vec<&str> = match &request.key {
        ResourceKey::Flat(path) => PATHS.iter().copied().filter(|p| *p == path.as_str()).collect(),
        ResourceKey::List(paths) => PATHS
            .iter()
            .copied()
            .filter(|p| paths.iter().any(|path| path == p))
            .collect(),
        ResourceKey::Alias(alias) if alias.is(TREE_ROOT_CHILDREN) => PATHS
            .iter()
            .copied()
            .filter(|p| parent_of(p).is_none())
            .collect(),
        ResourceKey::Alias(alias) if alias.is(TREE_CHILDREN) => {
            let parent = alias.param("path").and_then(|path| path.as_str());
            PATHS
                .iter()
                .copied()
                .filter(|p| parent.is_some() && parent_of(p) == parent)
                .collect()
        }
        ResourceKey::Alias(_) => PATHS.to_vec(),
    };

    let entries: Vec<(String, String)> = paths
        .into_iter()
        .map(|path| (path.to_owned(), format!("node {path}")))
        .collect();
    futures::future::ready(Ok(entries)).boxed()
}

pub fn schema() -> Schema {
    CachedResource::new(
        "schema",
        loader_fn(load_tree as LoadTree),
        ResourceConfig::default(),
    )
}

fn path(path: &str) -> ResourceKey<String> {
    ResourceKey::flat(path.to_owned())
}

fn paths(paths: &[&str]) -> ResourceKey<String> {
    ResourceKey::list(paths.iter().map(|path| path.to_string()))
}

#[tokio::test]
async fn test_load_children() {
    setup();
    let resource = schema();

    let roots = resource
        .load(ResourceKey::alias(TREE_ROOT_CHILDREN))
        .await
        .unwrap();
    assert_eq!(roots, ["node db", "node analytics"]);

    let children = tree_children_key("db");
    resource.load(children.clone()).await.unwrap();
    assert_eq!(
        resource.transform_to_key(&children).unwrap(),
        paths(&["db/private", "db/public"])
    );
    assert!(!resource.is_outdated(&children).unwrap());

    resource.load(tree_children_key("db/public")).await.unwrap();
    assert!(resource.has(&"db/public/users".to_owned()));
    assert_eq!(
        resource.get(&"db/public".to_owned()).as_deref(),
        Some("node db/public")
    );
}

#[tokio::test]
async fn test_children_without_values_are_hidden() {
    setup();
    let resource = schema();

    resource
        .load(paths(&["db/public/users", "db/public/orders"]))
        .await
        .unwrap();
    // ancestors are not loaded along with their children
    assert!(!resource.has(&"db/public".to_owned()));
    assert_eq!(
        resource.transform_to_key(&tree_children_key("db")).unwrap(),
        ResourceKey::List(vec![])
    );
    assert_eq!(
        resource.transform_to_key(&tree_children_key("db/public")).unwrap(),
        paths(&["db/public/orders", "db/public/users"])
    );
}

#[tokio::test]
async fn test_delete_does_not_cascade() {
    setup();
    let resource = schema();
    resource.load(path("db")).await.unwrap();
    resource.load(tree_children_key("db")).await.unwrap();

    resource.delete(path("db")).unwrap();
    assert!(!resource.has(&"db".to_owned()));
    assert!(resource.has(&"db/public".to_owned()));
    assert!(resource.is_outdated(&path("db")).unwrap());
    assert_eq!(
        resource.transform_to_key(&ResourceKey::alias(TREE_ROOT_CHILDREN)).unwrap(),
        ResourceKey::List(vec![])
    );
}

#[tokio::test]
async fn test_outdating_does_not_cascade() {
    setup();
    let resource = schema();
    resource.load(path("db")).await.unwrap();
    resource.load(tree_children_key("db")).await.unwrap();

    resource.mark_outdated(path("db")).unwrap();
    assert!(resource.is_outdated(&path("db")).unwrap());
    assert!(!resource.is_outdated(&tree_children_key("db")).unwrap());
}

#[tokio::test]
async fn test_malformed_paths_are_rejected() {
    setup();
    let resource = schema();

    let result = resource.load(path("db//public")).await;
    assert_eq!(result, Err(ResourceError::InvalidKey("db//public".into())));
    assert!(resource.set(String::new(), "root".into()).is_err());
    assert_eq!(resource.get(&"/db".to_owned()), None);
    assert!(resource.keys().is_empty());
}
