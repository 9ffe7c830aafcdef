use federation_runtime::FederationError;
use federation_runtime::shared::{
    ShareOptions, SharedFactory, SharedInstance, SharedScope, requirement,
};
use semver::{Version, VersionReq};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Library {
    version: Version,
}

fn counting_factory(version: &str, constructions: &Arc<AtomicUsize>) -> SharedFactory {
    let version = Version::parse(version).unwrap();
    let constructions = constructions.clone();
    Arc::new(move || -> anyhow::Result<SharedInstance> {
        constructions.fetch_add(1, Ordering::SeqCst);
        Ok(SharedInstance::new(Library {
            version: version.clone(),
        }))
    })
}

fn v(version: &str) -> Version {
    Version::parse(version).unwrap()
}

fn req(range: &str) -> VersionReq {
    VersionReq::parse(range).unwrap()
}

#[test]
fn repeated_provide_constructs_one_instance() {
    let scope = SharedScope::new();
    let constructions = Arc::new(AtomicUsize::new(0));

    let mut registered = Vec::new();
    for provider in ["host", "app1", "app2", "vue_remote", "host"] {
        registered.push(scope.provide(
            "react",
            v("18.2.0"),
            ShareOptions::new(provider).singleton(true),
            counting_factory("18.2.0", &constructions),
        ));
    }
    assert_eq!(registered, vec![true, false, false, false, false]);

    let first = scope.consume("react", &req("^18.0.0")).unwrap();
    let second = scope.consume("react", &req(">=18.2, <19")).unwrap();
    let third = scope.consume("react", &VersionReq::STAR).unwrap();

    assert!(first.ptr_eq(&second));
    assert!(first.ptr_eq(&third));
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert_eq!(scope.instance_count("react"), 1);
    assert_eq!(scope.versions("react"), vec![v("18.2.0")]);
}

#[test]
fn singleton_rejects_requirement_outside_active_version() {
    let scope = SharedScope::new();
    let constructions = Arc::new(AtomicUsize::new(0));
    scope.provide(
        "react",
        v("18.2.0"),
        ShareOptions::new("host").singleton(true),
        counting_factory("18.2.0", &constructions),
    );
    let active = scope.consume("react", &req("^18")).unwrap();

    // A remote bundling an older copy offers it afterwards
    scope.provide(
        "react",
        v("17.0.2"),
        ShareOptions::new("legacy_remote").singleton(true),
        counting_factory("17.0.2", &constructions),
    );

    let err = scope.consume("react", &req("^17")).unwrap_err();
    assert_eq!(
        err,
        FederationError::VersionMismatch {
            library: "react".to_string(),
            required: "^17".to_string(),
            available: "18.2.0".to_string(),
        }
    );
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert_eq!(scope.instance_count("react"), 1);

    let (version, instance) = scope.active("react").unwrap();
    assert_eq!(version, v("18.2.0"));
    assert!(instance.ptr_eq(&active));
}

#[test]
fn first_consumer_fixes_singleton_version() {
    let scope = SharedScope::new();
    let constructions = Arc::new(AtomicUsize::new(0));
    for version in ["3.3.0", "3.4.21"] {
        scope.provide(
            "vue",
            v(version),
            ShareOptions::new("remote").singleton(true),
            counting_factory(version, &constructions),
        );
    }

    let instance = scope.consume("vue", &req("~3.3")).unwrap();
    assert_eq!(instance.downcast_ref::<Library>().unwrap().version, v("3.3.0"));

    // 3.4.21 is provided, but the singleton is already 3.3.0
    assert!(matches!(
        scope.consume("vue", &req("^3.4")),
        Err(FederationError::VersionMismatch { .. })
    ));
    assert!(scope.consume("vue", &req("^3")).unwrap().ptr_eq(&instance));
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

#[test]
fn non_singleton_uses_highest_matching_version() {
    let scope = SharedScope::new();
    let constructions = Arc::new(AtomicUsize::new(0));
    for version in ["1.2.0", "1.5.3", "2.0.0"] {
        scope.provide(
            "lodash",
            v(version),
            ShareOptions::new("host"),
            counting_factory(version, &constructions),
        );
    }

    let one = scope.consume("lodash", &req("^1")).unwrap();
    let two = scope.consume("lodash", &req("^2")).unwrap();
    let one_again = scope.consume("lodash", &req(">=1.5, <2")).unwrap();

    assert_eq!(one.downcast_ref::<Library>().unwrap().version, v("1.5.3"));
    assert_eq!(two.downcast_ref::<Library>().unwrap().version, v("2.0.0"));
    assert!(one.ptr_eq(&one_again));
    assert!(!one.ptr_eq(&two));
    assert_eq!(constructions.load(Ordering::SeqCst), 2);

    assert!(matches!(
        scope.consume("lodash", &req("^3")),
        Err(FederationError::VersionMismatch { .. })
    ));
}

#[test]
fn consuming_unprovided_library_fails() {
    let scope = SharedScope::new();
    let err = scope.consume("svelte", &VersionReq::STAR).unwrap_err();
    assert!(matches!(
        err,
        FederationError::VersionMismatch { ref available, .. } if available == "none"
    ));
}

#[test]
fn eager_instance_is_handed_out_as_is() {
    let scope = SharedScope::new();
    let constructions = Arc::new(AtomicUsize::new(0));
    let eager = SharedInstance::new(Library {
        version: v("18.2.0"),
    });
    scope.provide_instance(
        "react",
        v("18.2.0"),
        ShareOptions::new("host").singleton(true),
        eager.clone(),
    );
    // Same version offered lazily later is a no-op
    assert!(!scope.provide(
        "react",
        v("18.2.0"),
        ShareOptions::new("app1").singleton(true),
        counting_factory("18.2.0", &constructions),
    ));

    let consumed = scope.consume("react", &req("^18")).unwrap();
    assert!(consumed.ptr_eq(&eager));
    assert_eq!(constructions.load(Ordering::SeqCst), 0);
}

#[test]
fn failing_factory_leaves_no_instance() {
    let scope = SharedScope::new();
    let factory: SharedFactory = Arc::new(|| -> anyhow::Result<SharedInstance> {
        Err(anyhow::anyhow!("runtime crashed"))
    });
    scope.provide(
        "react",
        v("18.2.0"),
        ShareOptions::new("host").singleton(true),
        factory,
    );

    let err = scope.consume("react", &req("^18")).unwrap_err();
    assert!(matches!(err, FederationError::SharedInit { ref library, .. } if library == "react"));
    assert_eq!(scope.instance_count("react"), 0);
    assert!(scope.active("react").is_none());
}

#[test]
fn declared_requirements() {
    let bundled = requirement(None, Some("3.4.0")).unwrap();
    assert!(bundled.matches(&v("3.5.1")));
    assert!(!bundled.matches(&v("4.0.0")));

    let explicit = requirement(Some(">=18, <19"), Some("17.0.0")).unwrap();
    assert!(explicit.matches(&v("18.3.1")));
    assert!(!explicit.matches(&v("17.0.0")));

    assert_eq!(requirement(None, None).unwrap(), VersionReq::STAR);
    assert!(requirement(Some("not a range"), None).is_err());
}

#[test]
fn constructor_may_consume_other_shared_libraries() {
    let scope = Arc::new(SharedScope::new());
    let constructions = Arc::new(AtomicUsize::new(0));
    scope.provide(
        "react",
        v("18.2.0"),
        ShareOptions::new("host").singleton(true),
        counting_factory("18.2.0", &constructions),
    );

    // react-dom needs the react instance from the same scope
    let inner = scope.clone();
    let react_dom: SharedFactory = Arc::new(move || -> anyhow::Result<SharedInstance> {
        let react = inner.consume("react", &req("^18"))?;
        Ok(SharedInstance::new(react))
    });
    scope.provide(
        "react-dom",
        v("18.2.0"),
        ShareOptions::new("host").singleton(true),
        react_dom,
    );

    let (tx, rx) = std::sync::mpsc::channel();
    let consumer = scope.clone();
    std::thread::spawn(move || {
        let _ = tx.send(consumer.consume("react-dom", &req("^18")));
    });
    let dom = rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("consume did not return")
        .unwrap();

    let react = scope.consume("react", &req("^18")).unwrap();
    assert!(dom.downcast_ref::<SharedInstance>().unwrap().ptr_eq(&react));
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert_eq!(scope.instance_count("react-dom"), 1);
}
