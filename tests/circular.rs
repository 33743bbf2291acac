use ferrous_ioc::{
    Container, Ctor, ErrorKind, Lazy, Made, Many, Param, Registrator, Resolver, Reuse, Rules, Setup,
};
use std::sync::Arc;

#[derive(Debug)]
struct Ping {
    _pong: Arc<Pong>,
}

#[derive(Debug)]
struct Pong {
    _ping: Arc<Ping>,
}

#[test]
fn test_constructor_cycle_is_detected() {
    let container = Container::new();
    container
        .register_made(Made::new(
            Ctor::new(|args| Ok(Ping { _pong: args.get::<Pong>(0)? })).param(Param::of::<Pong>()),
        ))
        .unwrap();
    container
        .register_made(Made::new(
            Ctor::new(|args| Ok(Pong { _ping: args.get::<Ping>(0)? })).param(Param::of::<Ping>()),
        ))
        .unwrap();

    let err = container.get::<Ping>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecursiveDependency);
    assert_eq!(err.request_chain().len(), 3);
    assert!(err.request_chain()[0].contains("Ping"));
    assert!(err.request_chain()[1].contains("Pong"));
    assert!(err.request_chain()[2].contains("Ping"));
}

#[test]
fn test_delegate_resolving_itself_is_detected() {
    #[derive(Debug)]
    struct Node;

    let container = Container::new();
    container
        .register_delegate(Reuse::Transient, |ctx| {
            ctx.get::<Node>()?;
            Ok(Node)
        })
        .unwrap();

    assert!(container.get::<Node>().unwrap_err().is(ErrorKind::RecursiveDependency));
}

struct Parent {
    child: Lazy<Child>,
}

struct Child {
    parent: Arc<Parent>,
}

#[test]
fn test_lazy_breaks_a_cycle() {
    let container = Container::new();
    container
        .register::<Parent>()
        .reuse(Reuse::Singleton)
        .made(Made::new(
            Ctor::new(|args| {
                Ok(Parent {
                    child: (*args.get::<Lazy<Child>>(0)?).clone(),
                })
            })
            .param(Param::wrapped::<Lazy<Child>>()),
        ))
        .register()
        .unwrap();
    container
        .register_made(Made::new(
            Ctor::new(|args| Ok(Child { parent: args.get::<Parent>(0)? })).param(Param::of::<Parent>()),
        ))
        .unwrap();

    let parent = container.get_required::<Parent>();
    assert!(!parent.child.is_created());
    let child = parent.child.value().unwrap();
    assert!(Arc::ptr_eq(&child.parent, &parent));

    // the singleton holds a handle to the container; disposing breaks the cycle
    container.dispose().unwrap();
}

struct Cache;

#[derive(Debug)]
struct RequestState;

#[derive(Debug)]
struct Captive {
    _state: Arc<RequestState>,
}

fn register_captive(container: &Container, param: Param) {
    container.register_delegate(Reuse::Scoped, |_| Ok(RequestState)).unwrap();
    container
        .register::<Captive>()
        .reuse(Reuse::Singleton)
        .made(Made::new(
            Ctor::new(|args| Ok(Captive { _state: args.get::<RequestState>(0)? })).param(param),
        ))
        .register()
        .unwrap();
}

#[test]
fn test_singleton_capturing_scoped_is_rejected() {
    let container = Container::new();
    register_captive(&container, Param::of::<RequestState>());

    let scope = container.open_scope(None).unwrap();
    let err = scope.get::<Captive>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShorterReuseLifespan);
    assert!(err.message().contains("Singleton"));
}

#[test]
fn test_lifespan_check_can_be_disabled() {
    let container = Container::with_rules(Rules::default().without_throw_on_shorter_lifespan());
    register_captive(&container, Param::of::<RequestState>());

    let scope = container.open_scope(None).unwrap();
    assert!(scope.get::<Captive>().is_ok());
}

#[test]
fn test_resolution_call_parameter_skips_the_lifespan_check() {
    let container = Container::new();
    register_captive(&container, Param::of::<RequestState>().as_resolution_call());

    let scope = container.open_scope(None).unwrap();
    assert!(scope.get::<Captive>().is_ok());
}

#[test]
fn test_resolution_call_setup_skips_the_lifespan_check() {
    let container = Container::new();
    container
        .register::<RequestState>()
        .reuse(Reuse::Scoped)
        .setup(Setup::new().as_resolution_call())
        .delegate(|ctx| {
            assert!(ctx.request().map_or(false, |r| r.is_resolution_call()));
            Ok(RequestState)
        })
        .register()
        .unwrap();
    container
        .register::<Captive>()
        .reuse(Reuse::Singleton)
        .made(Made::new(
            Ctor::new(|args| Ok(Captive { _state: args.get::<RequestState>(0)? }))
                .param(Param::of::<RequestState>()),
        ))
        .register()
        .unwrap();

    let scope = container.open_scope(None).unwrap();
    assert!(scope.get::<Captive>().is_ok());
}

#[test]
fn test_singleton_may_hold_a_lazy_scoped_dependency() {
    struct Holder {
        state: Lazy<RequestState>,
    }

    let container = Container::new();
    container.register_delegate(Reuse::Scoped, |_| Ok(RequestState)).unwrap();
    container
        .register::<Holder>()
        .reuse(Reuse::Singleton)
        .made(Made::new(
            Ctor::new(|args| {
                Ok(Holder {
                    state: (*args.get::<Lazy<RequestState>>(0)?).clone(),
                })
            })
            .param(Param::wrapped::<Lazy<RequestState>>()),
        ))
        .register()
        .unwrap();

    let scope = container.open_scope(None).unwrap();
    let holder = scope.get_required::<Holder>();
    assert!(holder.state.value().is_ok());
    scope.dispose().unwrap();
    container.dispose().unwrap();
}

#[test]
fn test_transient_dependencies_of_singletons_are_fine() {
    let container = Container::new();
    container.register_made(Made::of(|| Cache)).unwrap();
    container
        .register::<Captive>()
        .reuse(Reuse::Singleton)
        .made(Made::new(
            Ctor::new(|args| {
                args.get::<Cache>(0)?;
                Ok(Captive { _state: Arc::new(RequestState) })
            })
            .param(Param::of::<Cache>()),
        ))
        .register()
        .unwrap();

    assert!(container.get::<Captive>().is_ok());
}

#[test]
fn test_eager_collection_of_own_type_is_recursive() {
    struct Plugin {
        _others: Option<Many<Plugin>>,
    }

    impl std::fmt::Debug for Plugin {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Plugin").finish_non_exhaustive()
        }
    }

    let container = Container::new();
    container.register_made(Made::of(|| Plugin { _others: None })).unwrap();
    container
        .register_made(Made::new(
            Ctor::new(|args| {
                Ok(Plugin {
                    _others: Some((*args.get::<Many<Plugin>>(0)?).clone()),
                })
            })
            .param(Param::wrapped::<Many<Plugin>>()),
        ))
        .unwrap();

    let err = container.get_all::<Plugin>().unwrap_err();
    assert!(err.is(ErrorKind::RecursiveDependency));
}
