use resource_cache::{ALL_ITEMS, ResourceKey};

use crate::tree::schema;
use crate::{MockLoader, setup};

#[tokio::test]
async fn test_get_through_all_items() {
    setup();
    let loader = MockLoader::new([(1, "postgres"), (2, "mysql"), (3, "sqlite")]);
    let resource = loader.resource();
    let all = ResourceKey::alias(ALL_ITEMS);

    resource.load(all.clone()).await.unwrap();

    let values = resource.get_many(&all).unwrap();
    assert_eq!(
        values,
        [
            Some("postgres".to_owned()),
            Some("mysql".to_owned()),
            Some("sqlite".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_refresh_seeded_item() {
    setup();
    let loader = MockLoader::new([(1, "postgres")]);
    let resource = loader.resource();

    resource.set(1, "seeded".into()).unwrap();
    resource.mark_outdated(ResourceKey::flat(1)).unwrap();
    resource.refresh(ResourceKey::flat(1)).await.unwrap();

    assert_eq!(loader.calls(), 1);
    assert!(!resource.is_outdated(&ResourceKey::flat(1)).unwrap());
    assert_eq!(resource.get(&1).as_deref(), Some("postgres"));
}

#[tokio::test]
async fn test_same_key_loaded_twice() {
    setup();
    let loader = MockLoader::new([(1, "postgres")]);
    let resource = loader.resource();

    let (first, second) = futures::join!(
        resource.load(ResourceKey::flat(1)),
        resource.load(ResourceKey::flat(1))
    );

    assert_eq!(loader.calls(), 1);
    assert_eq!(first.unwrap(), second.unwrap());
}

#[test]
fn test_tree_delete_child() {
    setup();
    let resource = schema();

    resource.set("root".into(), "v1".into()).unwrap();
    resource.set("root/child".into(), "v2".into()).unwrap();
    resource.delete(ResourceKey::flat("root/child".into())).unwrap();

    assert!(resource.has(&"root".to_owned()));
    assert!(!resource.has(&"root/child".to_owned()));
}

#[tokio::test]
async fn test_three_pages_of_25() {
    setup();
    let loader = MockLoader::with_count(25);
    let resource = loader.resource();
    let target = ResourceKey::alias(ALL_ITEMS);

    for _ in 0..3 {
        resource.load_more(target.clone(), Some(10)).await.unwrap();
    }

    let windows: Vec<_> = loader
        .requests()
        .iter()
        .filter_map(|request| request.page())
        .collect();
    assert_eq!(windows, [(0, 10), (10, 10), (20, 10)]);
    assert_eq!(resource.next_page_offset(&target), 25);
    assert!(!resource.has_next_page(&target));
}
