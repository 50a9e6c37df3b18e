use resource_cache::{ALL_ITEMS, ResourceKey, UseEvent, UseId, offset_page_key};

use crate::{MockLoader, collect, setup};

#[tokio::test]
async fn test_use_and_free_balance() {
    setup();
    let loader = MockLoader::new([(1, "postgres"), (2, "mysql")]);
    let resource = loader.resource();
    let events = collect(resource.on_use());
    let all = ResourceKey::alias(ALL_ITEMS);
    resource.load(all.clone()).await.unwrap();

    let id = resource.use_key(&all, None).unwrap();
    assert!(resource.is_in_use(&all).unwrap());
    assert!(resource.is_in_use(&ResourceKey::flat(2)).unwrap());
    assert!(resource.has_use_id(&id));
    assert!(resource.is_resource_in_use());

    resource.free(&all, &id).unwrap();
    assert!(!resource.is_in_use(&all).unwrap());
    assert!(!resource.is_in_use(&ResourceKey::flat(2)).unwrap());
    assert!(!resource.has_use_id(&id));
    assert!(!resource.is_resource_in_use());

    assert_eq!(
        *events.lock().unwrap(),
        [
            UseEvent {
                id: id.clone(),
                key: all.clone(),
                is_in_use: true,
            },
            UseEvent {
                id,
                key: all,
                is_in_use: false,
            },
        ]
    );
}

#[tokio::test]
async fn test_several_consumers() {
    setup();
    let resource = MockLoader::default().resource();
    let key = ResourceKey::flat(1);
    let navigator = UseId::from("navigator");
    let editor = UseId::from("editor");

    resource.use_key(&key, Some(navigator.clone())).unwrap();
    resource.use_key(&key, Some(editor.clone())).unwrap();
    // using the same id twice counts once
    resource.use_key(&key, Some(editor.clone())).unwrap();

    resource.free(&key, &editor).unwrap();
    assert!(resource.is_in_use(&key).unwrap());
    resource.free(&key, &navigator).unwrap();
    assert!(!resource.is_in_use(&key).unwrap());

    // freeing an unknown consumer is a no-op
    resource.free(&ResourceKey::flat(3), &navigator).unwrap();
    assert!(resource.metadata(&3).is_none());
}

#[tokio::test]
async fn test_use_does_not_load_or_evict() {
    setup();
    let loader = MockLoader::new([(1, "postgres")]);
    let resource = loader.resource();

    let id = resource.use_key(&ResourceKey::flat(1), None).unwrap();
    assert!(!resource.has(&1));
    resource.load(ResourceKey::flat(1)).await.unwrap();
    resource.free(&ResourceKey::flat(1), &id).unwrap();

    assert!(resource.has(&1));
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn test_free_after_page_shifted() {
    setup();
    let loader = MockLoader::with_count(10);
    let resource = loader.resource();
    let page = offset_page_key(ResourceKey::alias(ALL_ITEMS), 0, 5);
    resource.load(page.clone()).await.unwrap();

    let id = resource.use_key(&page, None).unwrap();
    assert!(resource.is_in_use(&ResourceKey::flat(1)).unwrap());

    for key in 1..=5 {
        loader.remove_item(key);
    }
    resource.refresh(page.clone()).await.unwrap();
    assert_eq!(
        resource.transform_to_key(&page).unwrap(),
        ResourceKey::list(6..=10)
    );

    resource.free(&page, &id).unwrap();
    assert!(!resource.is_in_use(&ResourceKey::flat(1)).unwrap());
    assert!(!resource.is_in_use(&page).unwrap());
    assert!(!resource.has_use_id(&id));
    assert!(!resource.is_resource_in_use());
}
