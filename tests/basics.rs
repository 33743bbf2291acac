use ferrous_ioc::{
    ConstructorSelector, Container, Ctor, ErrorKind, Factory, IfAlreadyRegistered, IfUnresolved, Made, Param, Registrator, Resolver, Reuse,
    Rules, ServiceKey, ServiceType,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Config {
    port: u16,
}

#[derive(Debug)]
struct Server {
    config: Arc<Config>,
    name: String,
}

fn server_made() -> Made<Server> {
    Made::new(
        Ctor::new(|args| {
            Ok(Server {
                config: args.get::<Config>(0)?,
                name: "api".to_string(),
            })
        })
        .param(Param::of::<Config>()),
    )
}

#[test]
fn test_singleton_is_built_once() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let container = Container::new();
    container
        .register_delegate(Reuse::Singleton, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Config { port: 8080 })
        })
        .unwrap();

    let a = container.get_required::<Config>();
    let b = container.get_required::<Config>();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn test_transient_creates_new_instances() {
    let container = Container::new();
    container.register_made(Made::of(|| Config { port: 1 })).unwrap();

    let a = container.get_required::<Config>();
    let b = container.get_required::<Config>();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn test_made_injects_constructor_parameters() {
    let container = Container::new();
    container.register_instance(Config { port: 8080 }).unwrap();
    container.register_made(server_made()).unwrap();

    let server = container.get_required::<Server>();
    assert_eq!(server.config.port, 8080);
    assert_eq!(server.name, "api");
}

#[test]
fn test_missing_dependency_is_an_unresolved_parameter() {
    let container = Container::new();
    container.register_made(server_made()).unwrap();

    let err = container.get::<Server>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedRequiredParameter);
    assert_eq!(err.request_chain().len(), 2);
    assert!(err.request_chain()[0].contains("Server"));
    assert!(err.request_chain()[1].contains("Config"));
}

#[test]
fn test_unknown_service() {
    let container = Container::new();
    let err = container.get::<Config>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownService);
    assert!(container.try_get::<Config>().unwrap().is_none());
}

#[test]
fn test_optional_and_defaulted_parameters() {
    struct Client {
        timeout: Arc<u64>,
        proxy: Option<Arc<String>>,
    }

    let container = Container::new();
    container
        .register_made(Made::new(
            Ctor::new(|args| {
                Ok(Client {
                    timeout: args.get::<u64>(0)?,
                    proxy: args.optional::<String>(1)?,
                })
            })
            .param(Param::of::<u64>().with_default(30u64))
            .param(Param::of::<String>().optional()),
        ))
        .unwrap();

    let client = container.get_required::<Client>();
    assert_eq!(*client.timeout, 30);
    assert!(client.proxy.is_none());

    container.register_instance(5u64).unwrap();
    container.register_instance("proxy:3128".to_string()).unwrap();
    let client = container.get_required::<Client>();
    assert_eq!(*client.timeout, 5);
    assert_eq!(client.proxy.as_deref().map(String::as_str), Some("proxy:3128"));
}

#[test]
fn test_members_are_set_when_resolvable() {
    #[derive(Default)]
    struct Handler {
        config: Option<Arc<Config>>,
    }

    let container = Container::new();
    container
        .register_made(Made::of(Handler::default).member(Param::of::<Config>(), |h: &mut Handler, c: Arc<Config>| {
            h.config = Some(c)
        }))
        .unwrap();

    assert!(container.get_required::<Handler>().config.is_none());

    container.register_instance(Config { port: 9 }).unwrap();
    assert_eq!(container.get_required::<Handler>().config.as_ref().map(|c| c.port), Some(9));
}

#[test]
fn test_keyed_registrations() {
    let container = Container::new();
    container.register::<Config>().key("public").instance(Config { port: 80 }).register().unwrap();
    container.register::<Config>().key(2).instance(Config { port: 443 }).register().unwrap();

    assert_eq!(container.get_keyed::<Config>("public").unwrap().port, 80);
    assert_eq!(container.get_keyed::<Config>(2).unwrap().port, 443);
    assert!(container.get_keyed::<Config>("missing").unwrap_err().is(ErrorKind::UnknownService));
    assert!(container.get::<Config>().is_err());

    let via_resolve = container
        .resolve::<Config>(Some(ServiceKey::from("public")), None, IfUnresolved::Throw)
        .unwrap()
        .unwrap();
    assert_eq!(via_resolve.port, 80);
}

#[test]
fn test_keyed_parameter() {
    let container = Container::new();
    container.register::<Config>().key("admin").instance(Config { port: 9000 }).register().unwrap();
    container
        .register_made(Made::new(
            Ctor::new(|args| {
                Ok(Server {
                    config: args.get::<Config>(0)?,
                    name: "admin".to_string(),
                })
            })
            .param(Param::of::<Config>().key("admin")),
        ))
        .unwrap();

    assert_eq!(container.get_required::<Server>().config.port, 9000);
}

#[test]
fn test_required_implementation() {
    trait Store: Send + Sync {
        fn name(&self) -> &'static str;
    }
    impl std::fmt::Debug for dyn Store {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.name())
        }
    }
    struct Memory;
    struct Disk;
    impl Store for Memory {
        fn name(&self) -> &'static str {
            "memory"
        }
    }
    impl Store for Disk {
        fn name(&self) -> &'static str {
            "disk"
        }
    }

    let container = Container::new();
    container
        .register_trait::<dyn Store>()
        .implementation::<Memory>()
        .delegate(|_| Ok(Arc::new(Memory) as Arc<dyn Store>))
        .register()
        .unwrap();
    container
        .register_trait::<dyn Store>()
        .implementation::<Disk>()
        .delegate(|_| Ok(Arc::new(Disk) as Arc<dyn Store>))
        .register()
        .unwrap();

    assert!(container.get_trait::<dyn Store>().unwrap_err().is(ErrorKind::AmbiguousDefaults));

    let disk = container
        .resolve::<Arc<dyn Store>>(None, Some(ServiceType::of::<Disk>()), IfUnresolved::Throw)
        .unwrap()
        .unwrap();
    assert_eq!(disk.name(), "disk");
    assert_eq!(container.get_all_trait::<dyn Store>().unwrap().len(), 2);
}

#[test]
fn test_trait_resolution() {
    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }
    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    let container = Container::new();
    container
        .register_trait::<dyn Greeter>()
        .reuse(Reuse::Singleton)
        .delegate(|_| Ok(Arc::new(English) as Arc<dyn Greeter>))
        .register()
        .unwrap();

    let a = container.get_required_trait::<dyn Greeter>();
    let b = container.get_required_trait::<dyn Greeter>();
    assert_eq!(a.greet(), "hello");
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_delegate_resolves_through_context() {
    let container = Container::new();
    container.register_instance(Config { port: 7 }).unwrap();
    container
        .register_delegate(Reuse::Transient, |ctx| {
            assert_eq!(ctx.request().map(|r| r.depth()), Some(0));
            Ok(Server {
                config: ctx.get::<Config>()?,
                name: "delegate".to_string(),
            })
        })
        .unwrap();

    assert_eq!(container.get_required::<Server>().config.port, 7);
}

#[test]
fn test_constructor_selection() {
    #[derive(Debug)]
    struct Widget {
        params: usize,
    }
    let made = || {
        Made::new(Ctor::new(|_| Ok(Widget { params: 0 })))
            .or(Ctor::new(|args| {
                args.get::<u8>(0)?;
                Ok(Widget { params: 1 })
            })
            .param(Param::of::<u8>()))
            .or(Ctor::new(|_| Ok(Widget { params: 2 }))
                .param(Param::of::<u8>())
                .param(Param::of::<u16>()))
    };

    let strict = Container::new();
    strict.register_made(made()).unwrap();
    assert!(strict.get::<Widget>().unwrap_err().is(ErrorKind::ConstructorSelection));

    let container = Container::with_rules(Rules::default().with_constructor_selector(ConstructorSelector::MostResolvable));
    container.register_made(made()).unwrap();
    assert_eq!(container.get_required::<Widget>().params, 0);

    container.register_instance(1u8).unwrap();
    assert_eq!(container.get_required::<Widget>().params, 1);
}

#[test]
fn test_fallback_container() {
    let parent = Container::new();
    parent.register_instance(Config { port: 5432 }).unwrap();

    let child = Container::with_rules(Rules::default().with_fallback_container(parent.clone()));
    child.register_made(server_made()).unwrap();

    assert_eq!(child.get_required::<Server>().config.port, 5432);
    assert!(Arc::ptr_eq(&child.get_required::<Config>(), &parent.get_required::<Config>()));
}

#[test]
fn test_fallback_container_changes_are_seen() {
    let fallback = Container::new();
    fallback.register_instance(1u32).unwrap();
    let container = Container::with_rules(Rules::default().with_fallback_container(fallback.clone()));
    assert_eq!(*container.get_required::<u32>(), 1);

    fallback
        .register::<u32>()
        .if_already_registered(IfAlreadyRegistered::Replace)
        .instance(2)
        .register()
        .unwrap();
    assert_eq!(*fallback.get_required::<u32>(), 2);
    assert_eq!(*container.get_required::<u32>(), 2);
}

#[test]
fn test_unknown_service_resolver() {
    let container = Container::with_rules(Rules::default().with_unknown_service_resolver(|request| {
        (request.service_type() == ServiceType::of::<Config>())
            .then(|| Arc::new(Factory::made(Reuse::Singleton, Made::of(|| Config { port: 1234 }))))
    }));

    assert_eq!(container.get_required::<Config>().port, 1234);
    assert!(container.get::<Server>().is_err());
}

#[test]
fn test_runtime_state_rule() {
    let container = Container::with_rules(Rules::default().with_throw_if_runtime_state_required());
    container.register_instance(Config { port: 1 }).unwrap();
    container.register_made(Made::of(|| 3u8)).unwrap();

    assert!(container.get::<Config>().unwrap_err().is(ErrorKind::RuntimeStateRequired));
    assert_eq!(*container.get_required::<u8>(), 3);
}

#[test]
fn test_registration_is_visible_to_later_resolutions() {
    let container = Container::new();
    assert!(container.get::<Config>().is_err());
    container.register_instance(Config { port: 2 }).unwrap();
    assert_eq!(container.get_required::<Config>().port, 2);
}

#[test]
fn test_service_descriptors() {
    let container = Container::new();
    container.register_instance(Config { port: 1 }).unwrap();
    container.register::<u32>().key("n").reuse(Reuse::Scoped).made(Made::of(|| 1)).register().unwrap();

    let descriptors = container.service_descriptors();
    assert_eq!(descriptors.len(), 2);
    assert!(descriptors[0].type_name().contains("Config"));
    assert_eq!(descriptors[0].reuse, Reuse::Singleton);
    assert!(descriptors[1].is_keyed());
    assert_eq!(descriptors[1].reuse, Reuse::Scoped);
    assert!(descriptors[0].id < descriptors[1].id);
}
