use resource_cache::{ALL_ITEMS, AliasToken, KeyError, ResourceAlias, ResourceKey};

use crate::{MockLoader, collect, setup};

const POSTGRES: AliasToken = AliasToken::new("postgres-connections");
const BY_DRIVER: AliasToken = AliasToken::new("connections-by-driver");

#[tokio::test]
async fn test_all_items() {
    setup();
    let loader = MockLoader::new([(1, "postgres"), (2, "mysql"), (3, "postgres")]);
    let resource = loader.resource();
    let all = ResourceKey::alias(ALL_ITEMS);

    assert_eq!(resource.transform_to_key(&all).unwrap(), ResourceKey::List(vec![]));
    let values = resource.load(all.clone()).await.unwrap();
    assert_eq!(values, ["postgres", "mysql", "postgres"]);

    // the loader sees the alias, not its resolution
    assert_eq!(loader.requests()[0].key, all);
    assert_eq!(resource.transform_to_key(&all).unwrap(), ResourceKey::list([1, 2, 3]));
    assert_eq!(resource.transform_to_alias(&ResourceKey::list([2, 3, 1])), all);
    assert_eq!(
        resource.transform_to_alias(&ResourceKey::list([1, 2])),
        ResourceKey::list([1, 2])
    );

    assert!(!resource.is_outdated(&all).unwrap());
    resource.load(all.clone()).await.unwrap();
    resource.load(ResourceKey::flat(2)).await.unwrap();
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn test_outdated_key_outdates_alias() {
    setup();
    let loader = MockLoader::new([(1, "postgres"), (2, "mysql")]);
    let resource = loader.resource();
    let all = ResourceKey::alias(ALL_ITEMS);

    resource.load(all.clone()).await.unwrap();
    resource.mark_outdated(ResourceKey::flat(2)).unwrap();
    assert!(resource.is_outdated(&all).unwrap());
    assert!(!resource.is_outdated(&ResourceKey::flat(1)).unwrap());

    resource.load(all.clone()).await.unwrap();
    assert_eq!(loader.calls(), 2);
    assert!(!resource.is_outdated(&all).unwrap());
}

#[tokio::test]
async fn test_custom_alias() {
    setup();
    let loader = MockLoader::new([(1, "postgres"), (2, "mysql"), (3, "postgres")]);
    let resource = loader.resource();
    resource.load(ResourceKey::alias(ALL_ITEMS)).await.unwrap();

    resource
        .add_alias(POSTGRES, |_, ctx| {
            // odd ids are postgres in this fixture
            let keys = ctx.keys().into_iter().filter(|key| key % 2 == 1);
            Ok(ResourceKey::list(keys))
        })
        .unwrap();

    let err = resource.add_alias(POSTGRES, |_, _| Ok(ResourceKey::List(vec![])));
    assert_eq!(err, Err(KeyError::AliasAlreadyRegistered(POSTGRES)));

    let key = ResourceKey::alias(POSTGRES);
    assert_eq!(resource.transform_to_key(&key).unwrap(), ResourceKey::list([1, 3]));
}

#[tokio::test]
async fn test_parametrized_alias() {
    setup();
    let loader = MockLoader::new([(1, "postgres"), (2, "mysql"), (3, "postgres")]);
    let resource = loader.resource();
    resource.load(ResourceKey::alias(ALL_ITEMS)).await.unwrap();

    resource.replace_alias(BY_DRIVER, |alias, ctx| {
        let driver = alias
            .param("driver")
            .and_then(|driver| driver.as_str())
            .ok_or(KeyError::MalformedAlias {
                token: alias.token(),
                reason: "driver is required",
            })?;
        let even = driver == "mysql";
        Ok(ResourceKey::list(
            ctx.keys().into_iter().filter(|key| (key % 2 == 0) == even),
        ))
    });

    let mysql: ResourceKey<u32> = ResourceAlias::new(BY_DRIVER).with_param("driver", "mysql").into();
    assert_eq!(resource.transform_to_key(&mysql).unwrap(), ResourceKey::list([2]));

    let missing = ResourceKey::alias(BY_DRIVER);
    assert!(matches!(
        resource.transform_to_key(&missing),
        Err(KeyError::MalformedAlias { .. })
    ));
}

#[tokio::test]
async fn test_unregistered_alias() {
    setup();
    let resource = MockLoader::default().resource();
    let key = ResourceKey::alias(POSTGRES);
    assert_eq!(
        resource.transform_to_key(&key),
        Err(KeyError::UnregisteredAlias(POSTGRES))
    );
    assert!(resource.load(key).await.is_err());
}

#[tokio::test]
async fn test_delete_alias_emits_once() {
    setup();
    let loader = MockLoader::new([(1, "postgres"), (2, "mysql")]);
    let resource = loader.resource();
    let deleted = collect(resource.on_item_delete());
    let all = ResourceKey::alias(ALL_ITEMS);

    resource.load(all.clone()).await.unwrap();
    resource.delete(all.clone()).unwrap();
    resource.delete(all.clone()).unwrap();

    assert_eq!(*deleted.lock().unwrap(), [all.clone()]);
    assert!(resource.keys().is_empty());
    assert!(resource.is_outdated(&all).unwrap());
}

#[tokio::test]
async fn test_alias_chain_back_to_itself() {
    setup();
    let loader = MockLoader::new([(1, "postgres")]);
    let resource = loader.resource();
    resource
        .add_alias(BY_DRIVER, |alias, _| {
            let depth = alias.param("depth").and_then(|depth| depth.as_int()).unwrap_or(0);
            Ok(ResourceAlias::new(BY_DRIVER)
                .with_param("depth", depth + 1)
                .into())
        })
        .unwrap();
    let key = ResourceKey::alias(BY_DRIVER);

    assert_eq!(
        resource.transform_to_key(&key),
        Err(KeyError::CyclicAlias(BY_DRIVER))
    );
    assert!(resource.load(key).await.is_err());
    assert_eq!(loader.calls(), 0);

    // the resource stays usable
    resource.load(ResourceKey::flat(1)).await.unwrap();
    assert!(resource.has(&1));
}

#[test]
fn test_panicking_resolver_does_not_wedge_resource() {
    setup();
    let resource = MockLoader::default().resource();
    resource
        .add_alias(POSTGRES, |_, _| panic!("resolver failed"))
        .unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        resource.transform_to_key(&ResourceKey::alias(POSTGRES))
    }));
    assert!(result.is_err());

    resource.set(1, "postgres".into()).unwrap();
    assert_eq!(resource.get(&1).as_deref(), Some("postgres"));
}
