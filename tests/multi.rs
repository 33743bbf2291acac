use ferrous_ioc::{
    Closes, Container, Ctor, Func, GenericFamily, IfAlreadyRegistered, Lazy, Made, Many, Param, Registrator, Resolver,
    ResolverCore, Reuse, Rules,
};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

trait Handler: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Audit;
struct Billing;

impl Handler for Audit {
    fn name(&self) -> &'static str {
        "audit"
    }
}

impl Handler for Billing {
    fn name(&self) -> &'static str {
        "billing"
    }
}

fn register_handlers(container: &Container) {
    container
        .register_trait::<dyn Handler>()
        .if_already_registered(IfAlreadyRegistered::AppendNonKeyed)
        .delegate(|_| Ok(Arc::new(Audit) as Arc<dyn Handler>))
        .register()
        .unwrap();
    container
        .register_trait::<dyn Handler>()
        .if_already_registered(IfAlreadyRegistered::AppendNonKeyed)
        .delegate(|_| Ok(Arc::new(Billing) as Arc<dyn Handler>))
        .register()
        .unwrap();
}

#[test]
fn test_many_yields_every_registration_in_order() {
    let container = Container::new();
    register_handlers(&container);

    let many = container.get_wrapped::<Many<Arc<dyn Handler>>>().unwrap();
    let names: Vec<_> = many.to_vec().unwrap().iter().map(|h| h.name()).collect();
    assert_eq!(names, vec!["audit", "billing"]);

    let all: Vec<_> = container.get_all_trait::<dyn Handler>().unwrap().iter().map(|h| h.name()).collect();
    assert_eq!(all, vec!["audit", "billing"]);
}

#[test]
fn test_many_of_nothing_is_empty() {
    let container = Container::new();
    let many = container.get_wrapped::<Many<u32>>().unwrap();
    assert!(many.to_vec().unwrap().is_empty());
}

#[test]
fn test_many_as_constructor_parameter() {
    struct Pipeline {
        handlers: Many<Arc<dyn Handler>>,
    }

    let container = Container::new();
    register_handlers(&container);
    container
        .register_made(Made::new(
            Ctor::new(|args| {
                Ok(Pipeline {
                    handlers: (*args.get::<Many<Arc<dyn Handler>>>(0)?).clone(),
                })
            })
            .param(Param::wrapped::<Many<Arc<dyn Handler>>>()),
        ))
        .unwrap();

    let pipeline = container.get_required::<Pipeline>();
    assert_eq!(pipeline.handlers.iter().count(), 2);
}

#[test]
fn test_resolve_many_sees_later_registrations() {
    let container = Container::new();
    container.register_made(Made::of(|| 1u32)).unwrap();

    let values = container.resolve_many::<u32>();
    assert_eq!(values.to_vec().unwrap().len(), 1);

    container.register_made(Made::of(|| 2u32)).unwrap();
    let collected: Vec<u32> = values.iter().map(|v| *v.unwrap()).collect();
    assert_eq!(collected, vec![1, 2]);
}

#[test]
fn test_lazy_many_rule_defers_item_resolution() {
    let built = Arc::new(AtomicUsize::new(0));
    let container = Container::with_rules(Rules::default().with_resolve_enumerable_as_lazy());
    let counter = built.clone();
    container
        .register_delegate(Reuse::Transient, move |_| Ok(counter.fetch_add(1, Ordering::SeqCst) as u64))
        .unwrap();

    let many = container.get_wrapped::<Many<u64>>().unwrap();
    assert!(many.is_lazy());
    assert_eq!(built.load(Ordering::SeqCst), 0);
    assert_eq!(many.to_vec().unwrap().len(), 1);
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn test_keyed_wrappers_narrow_the_inner_request() {
    let container = Container::new();
    container.register::<String>().key("primary").instance("db1".to_string()).register().unwrap();
    container.register::<String>().key("replica").instance("db2".to_string()).register().unwrap();

    let info = ferrous_ioc::ServiceInfo::wrapped::<Lazy<String>>().with_key("replica");
    let value = container
        .resolve_info(&info, ferrous_ioc::IfUnresolved::Throw)
        .unwrap()
        .unwrap()
        .downcast::<Lazy<String>>()
        .unwrap();
    assert_eq!(value.value().unwrap().as_str(), "db2");
}

#[test]
fn test_func_builds_a_new_transient_per_call() {
    struct Job;

    let container = Container::new();
    container.register_made(Made::of(|| Job)).unwrap();
    let factory = container.get_wrapped::<Func<Job>>().unwrap();
    assert!(!Arc::ptr_eq(&factory.call().unwrap(), &factory.call().unwrap()));
}

#[test]
fn test_replace_and_keep_policies() {
    let container = Container::new();
    container.register_instance(1u8).unwrap();
    container
        .register::<u8>()
        .if_already_registered(IfAlreadyRegistered::Keep)
        .instance(2)
        .register()
        .unwrap();
    assert_eq!(*container.get_required::<u8>(), 1);

    container
        .register::<u8>()
        .if_already_registered(IfAlreadyRegistered::Replace)
        .instance(3)
        .register()
        .unwrap();
    assert_eq!(container.get_all::<u8>().unwrap().len(), 1);
    assert_eq!(*container.get_required::<u8>(), 3);
}

#[test]
fn test_throw_policy_rejects_a_second_registration() {
    let container = Container::with_rules(Rules::default().with_default_if_already_registered(IfAlreadyRegistered::Throw));
    container.register_instance(1u8).unwrap();
    let err = container.register_instance(2u8).unwrap_err();
    assert!(err.is(ferrous_ioc::ErrorKind::AlreadyRegistered));
}

#[test]
fn test_append_new_implementation_skips_known_implementations() {
    let container = Container::new();
    for _ in 0..2 {
        container
            .register_trait::<dyn Handler>()
            .implementation::<Audit>()
            .if_already_registered(IfAlreadyRegistered::AppendNewImplementation)
            .delegate(|_| Ok(Arc::new(Audit) as Arc<dyn Handler>))
            .register()
            .unwrap();
    }
    container
        .register_trait::<dyn Handler>()
        .implementation::<Billing>()
        .if_already_registered(IfAlreadyRegistered::AppendNewImplementation)
        .delegate(|_| Ok(Arc::new(Billing) as Arc<dyn Handler>))
        .register()
        .unwrap();

    assert_eq!(container.get_all_trait::<dyn Handler>().unwrap().len(), 2);
}

struct Repository<E> {
    instance: usize,
    _entity: PhantomData<E>,
}

struct RepositoryFamily;

impl GenericFamily for RepositoryFamily {}

static REPOSITORIES: AtomicUsize = AtomicUsize::new(0);

impl<E: Send + Sync + 'static> Closes<E> for RepositoryFamily {
    type Closed = Repository<E>;

    fn made() -> Made<Repository<E>> {
        Made::of(|| Repository {
            instance: REPOSITORIES.fetch_add(1, Ordering::SeqCst),
            _entity: PhantomData,
        })
    }
}

struct User;
struct Order;

#[test]
fn test_open_generic_closes_per_member() {
    let container = Container::new();
    container.register_open_generic::<RepositoryFamily>(Reuse::Singleton).unwrap();

    let users = container.get_generic::<RepositoryFamily, User>().unwrap();
    let users_again = container.get_generic::<RepositoryFamily, User>().unwrap();
    let orders = container.get_generic::<RepositoryFamily, Order>().unwrap();

    assert!(Arc::ptr_eq(&users, &users_again));
    assert_ne!(users.instance, orders.instance);
}

#[test]
fn test_open_generic_as_parameter() {
    struct Service {
        users: Arc<Repository<User>>,
    }

    let container = Container::new();
    container.register_open_generic::<RepositoryFamily>(Reuse::Singleton).unwrap();
    container
        .register_made(Made::new(
            Ctor::new(|args| Ok(Service { users: args.get::<Repository<User>>(0)? }))
                .param(Param::generic::<RepositoryFamily, User>()),
        ))
        .unwrap();

    let service = container.get_required::<Service>();
    let direct = container.get_generic::<RepositoryFamily, User>().unwrap();
    assert!(Arc::ptr_eq(&service.users, &direct));
}

#[test]
fn test_closed_registration_wins_over_the_family() {
    let container = Container::new();
    container.register_open_generic::<RepositoryFamily>(Reuse::Singleton).unwrap();
    container
        .register_instance(Repository::<Order> {
            instance: usize::MAX,
            _entity: PhantomData,
        })
        .unwrap();

    assert_eq!(container.get_generic::<RepositoryFamily, Order>().unwrap().instance, usize::MAX);
}
