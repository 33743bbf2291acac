use ferrous_ioc::{Container, Made, Registrator, Resolver, Reuse, Setup};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default, Debug)]
struct X {
    field: Mutex<String>,
}

impl X {
    fn append(&self, text: &str) {
        self.field.lock().push_str(text);
    }

    fn value(&self) -> String {
        self.field.lock().clone()
    }
}

fn container_with_x() -> Container {
    let container = Container::new();
    container.register_made(Made::of(X::default)).unwrap();
    container
}

fn short_name(type_name: &str) -> &str {
    type_name.rsplit("::").next().unwrap_or(type_name)
}

#[test]
fn test_initializer_runs_on_resolve() {
    let container = container_with_x();
    container
        .register_initializer::<X, _>(|x, _| {
            x.append("blah");
            Ok(())
        })
        .unwrap();

    assert_eq!(container.get_required::<X>().value(), "blah");
}

#[test]
fn test_initializers_run_in_registration_order() {
    let container = container_with_x();
    for text in ["yeah", "blah"] {
        container
            .register_initializer::<X, _>(move |x, _| {
                x.append(text);
                Ok(())
            })
            .unwrap();
    }

    assert_eq!(container.get_required::<X>().value(), "yeahblah");
}

#[test]
fn test_initializers_registered_before_the_service() {
    let container = Container::new();
    container
        .register_initializer::<X, _>(|x, _| {
            x.append("green");
            Ok(())
        })
        .unwrap();
    container
        .register_initializer::<X, _>(|x, _| {
            x.append("-blah");
            Ok(())
        })
        .unwrap();
    container.register_made(Made::of(X::default)).unwrap();

    assert_eq!(container.get_required::<X>().value(), "green-blah");
}

#[test]
fn test_universal_initializer_sees_every_resolve() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let container = container_with_x();
    let sink = log.clone();
    container
        .register_initializer_any(move |instance, _| {
            sink.lock().push(short_name(instance.type_name()).to_string());
            Ok(())
        })
        .unwrap();

    container.get_required::<X>();
    assert_eq!(*log.lock(), vec!["X".to_string()]);

    container.get_required::<X>();
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn test_universal_and_typed_initializers_share_one_order() {
    let container = container_with_x();
    container
        .register_initializer::<X, _>(|x, _| {
            x.append("a");
            Ok(())
        })
        .unwrap();
    container
        .register_initializer_any(|instance, _| {
            if let Some(x) = instance.downcast_ref::<X>() {
                x.append("b");
            }
            Ok(())
        })
        .unwrap();
    container
        .register_initializer::<X, _>(|x, _| {
            x.append("c");
            Ok(())
        })
        .unwrap();

    assert_eq!(container.get_required::<X>().value(), "abc");
}

#[test]
fn test_decorator_replaces_the_instance() {
    struct Greeting(String);

    let container = Container::new();
    container.register_instance(Greeting("hello".to_string())).unwrap();
    container
        .register_decorator::<Greeting, _>(|inner, _| Ok(Arc::new(Greeting(format!("{}!", inner.0)))))
        .unwrap();
    container
        .register_decorator::<Greeting, _>(|inner, _| Ok(Arc::new(Greeting(inner.0.to_uppercase()))))
        .unwrap();

    assert_eq!(container.get_required::<Greeting>().0, "HELLO!");
}

#[test]
fn test_decorators_run_on_every_resolve_of_a_singleton() {
    let runs = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register_delegate(Reuse::Singleton, |_| Ok(X::default())).unwrap();
    let counter = runs.clone();
    container
        .register_decorator::<X, _>(move |x, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(x)
        })
        .unwrap();

    let a = container.get_required::<X>();
    let b = container.get_required::<X>();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_decoratee_reuse_caches_the_decorated_value() {
    let runs = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register_delegate(Reuse::Singleton, |_| Ok(X::default())).unwrap();
    let counter = runs.clone();
    container
        .register_decorator_with::<X, _>(Setup::new().use_decoratee_reuse(), move |x, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            x.append("once");
            Ok(x)
        })
        .unwrap();

    container.get_required::<X>();
    let x = container.get_required::<X>();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(x.value(), "once");
}

#[test]
fn test_conditional_initializer() {
    struct Holder {
        x: Arc<X>,
    }

    let container = container_with_x();
    container
        .register_delegate(Reuse::Transient, |ctx| Ok(Holder { x: ctx.get::<X>()? }))
        .unwrap();
    container
        .register_initializer_with::<X, _>(Setup::new().condition(|req| req.parent().is_some()), |x, _| {
            x.append("nested");
            Ok(())
        })
        .unwrap();

    assert_eq!(container.get_required::<X>().value(), "");
    assert_eq!(container.get_required::<Holder>().x.value(), "nested");
}

#[test]
fn test_decorator_errors_propagate() {
    let container = container_with_x();
    container
        .register_initializer::<X, _>(|_, ctx| ctx.get::<String>().map(|_| ()))
        .unwrap();

    let err = container.get::<X>().unwrap_err();
    assert!(err.is(ferrous_ioc::ErrorKind::UnknownService));
}

#[test]
fn test_decorators_are_listed_in_descriptors() {
    let container = container_with_x();
    container.register_initializer::<X, _>(|_, _| Ok(())).unwrap();

    let descriptors = container.service_descriptors();
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[1].kind, ferrous_ioc::FactoryKind::Decorator);
}
