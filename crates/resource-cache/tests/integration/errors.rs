use resource_cache::{DataError, LoadError, ResourceError, ResourceKey};

use crate::{MockLoader, collect, setup};

#[tokio::test]
async fn test_errors_are_stored_and_emitted() {
    setup();
    let loader = MockLoader::new([(1, "postgres")]);
    let resource = loader.resource();
    let errors = collect(resource.on_data_error());

    let error = LoadError::NotFound("Connection not found".into());
    loader.fail_with(Some(error.clone()));
    let result = resource.load(ResourceKey::flat(1)).await;
    assert_eq!(result, Err(ResourceError::Load(error.clone())));

    assert_eq!(
        resource.exception(&ResourceKey::flat(1)).unwrap(),
        Some(error.clone())
    );
    assert_eq!(
        *errors.lock().unwrap(),
        [DataError {
            key: ResourceKey::flat(1),
            error: error.clone(),
        }]
    );
    assert!(resource.is_outdated(&ResourceKey::flat(1)).unwrap());
    assert!(!resource.is_loading_key(&ResourceKey::flat(1)).unwrap());

    // a successful load clears the error
    loader.fail_with(None);
    resource.load(ResourceKey::flat(1)).await.unwrap();
    assert_eq!(resource.exception(&ResourceKey::flat(1)).unwrap(), None);
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_errors_are_shared_by_coalesced_callers() {
    setup();
    let loader = MockLoader::new([(1, "postgres")]);
    let resource = loader.resource();
    loader.fail_with(Some(LoadError::PermissionDenied("read-only role".into())));
    let gate = loader.hold_next();

    let first = resource.load(ResourceKey::flat(1));
    let second = resource.load(ResourceKey::flat(1));
    gate.open();

    let (first, second) = futures::join!(first, second);
    assert_eq!(first, second);
    insta::assert_snapshot!(first.unwrap_err(), @"permission denied: read-only role");
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn test_errors_keep_previous_data() {
    setup();
    let loader = MockLoader::new([(1, "postgres")]);
    let resource = loader.resource();

    resource.load(ResourceKey::flat(1)).await.unwrap();
    loader.fail_with(Some(LoadError::RequestFailed("connection reset".into())));
    assert!(resource.refresh(ResourceKey::flat(1)).await.is_err());

    assert_eq!(resource.get(&1).as_deref(), Some("postgres"));
    assert!(resource.exception(&ResourceKey::flat(1)).unwrap().is_some());
}

#[tokio::test]
async fn test_invalid_keys_are_rejected() {
    setup();
    let loader = MockLoader::new([(1, "postgres")]);
    let resource = loader.resource();

    let result = resource.load(ResourceKey::list([1, 0])).await;
    assert_eq!(result, Err(ResourceError::InvalidKey("0".into())));
    assert_eq!(loader.calls(), 0);

    assert_eq!(resource.get(&0), None);
    assert!(resource.get_many(&ResourceKey::flat(0)).unwrap().is_empty());
    assert!(resource.set(0, "none".into()).is_err());
    assert!(resource.mark_outdated(ResourceKey::flat(0)).is_err());
    assert!(resource.keys().is_empty());
}
