mod common;

use common::{node_class, quiet_loop};
use quiver::testing::EventRecorder;
use quiver::{
    BoxError, Component, ComponentClass, ComponentError, PropertyDescriptor, QuiverError,
    ReactionDescriptor, Value,
};
use std::cell::RefCell;
use std::rc::Rc;
use tracing_test::traced_test;

fn triple(recorder: &EventRecorder) -> Rc<ComponentClass> {
    ComponentClass::builder("Triple")
        .property(PropertyDescriptor::int("a").settable())
        .property(PropertyDescriptor::int("b").settable())
        .property(PropertyDescriptor::int("c").settable())
        .reaction(recorder.descriptor("watch", &["a", "b", "c"]))
        .build()
        .unwrap()
}

#[test]
fn test_events_from_several_connections_arrive_in_one_batch() {
    let lp = quiet_loop();
    let recorder = EventRecorder::new();
    let c = Component::new(&triple(&recorder), &lp).unwrap();
    lp.iter().unwrap();
    assert_eq!(recorder.batch_sizes(), [3]);
    recorder.clear();

    c.set("c", 1).unwrap();
    c.set("a", 2).unwrap();
    lp.iter().unwrap();

    assert_eq!(recorder.batch_sizes(), [2]);
    assert_eq!(recorder.kinds(), ["c", "a"]);
}

#[test]
fn test_reactions_run_in_registration_order() {
    let lp = quiet_loop();
    let order = Rc::new(RefCell::new(Vec::new()));
    let source = Component::new(&node_class(), &lp).unwrap();
    let listeners: Vec<_> = (0..3)
        .map(|i| {
            let order = Rc::clone(&order);
            source
                .react(format!("r{i}"), &["value"], move |_, _| order.borrow_mut().push(i))
                .unwrap()
        })
        .collect();
    lp.iter().unwrap();
    order.borrow_mut().clear();

    source.set("value", 1).unwrap();
    lp.iter().unwrap();
    assert_eq!(*order.borrow(), [0, 1, 2]);
    assert_eq!(listeners.len(), 3);
}

#[test]
fn test_labels_order_handlers_and_scope_disconnect() {
    let lp = quiet_loop();
    let c = Component::new(&node_class(), &lp).unwrap();
    let zed = c.react("zed", &["value"], |_, _| ()).unwrap();
    let first = c.react("first", &["value:aaa"], |_, _| ()).unwrap();

    let names: Vec<String> = c
        .event_handlers("value")
        .unwrap()
        .iter()
        .map(|r| r.name().to_owned())
        .collect();
    assert_eq!(names, ["first", "zed"]);

    c.disconnect("value:aaa", None);
    let remaining = c.event_handlers("value").unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].ptr_eq(&zed));
    assert!(!first.is_disposed());

    assert!(matches!(
        c.event_handlers("value:zed"),
        Err(ComponentError::LabelNotAllowed(_))
    ));
}

#[test]
fn test_events_carry_subscription_label() {
    let lp = quiet_loop();
    let recorder = EventRecorder::new();
    let c = Component::new(&node_class(), &lp).unwrap();
    c.react("watch", &["value:mine"], recorder.handler()).unwrap();
    c.react("other", &["value"], |_, _| ()).unwrap();
    lp.iter().unwrap();

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label(), "mine");
    assert_eq!(events[0].kind(), "value");
}

#[test]
#[traced_test]
fn test_failing_reaction_does_not_stop_the_flush() {
    let lp = quiet_loop();
    let recorder = EventRecorder::new();
    let c = Component::new(&node_class(), &lp).unwrap();
    c.react("broken", &["value"], |_, _| Err::<(), BoxError>("boom".into()))
        .unwrap();
    c.react("panicky", &["value"], |_, _| -> () { panic!("kaboom") })
        .unwrap();
    c.react("fine", &["value"], recorder.handler()).unwrap();

    let report = lp.iter().unwrap();
    assert_eq!(report.reactions, 3);
    assert_eq!(report.failures, 2);
    assert_eq!(recorder.call_count(), 1);
    assert!(logs_contain("reaction failed"));
    assert!(logs_contain("kaboom"));
}

#[test]
fn test_disposed_reaction_gets_nothing() {
    let lp = quiet_loop();
    let recorder = EventRecorder::new();
    let c = Component::new(&node_class(), &lp).unwrap();
    let r = c.react("watch", &["value"], recorder.handler()).unwrap();
    c.set("value", 3).unwrap();
    assert_eq!(lp.pending_events(), 2);

    r.dispose();
    assert_eq!(lp.pending_events(), 0);
    c.set("value", 4).unwrap();
    lp.iter().unwrap();
    assert_eq!(recorder.call_count(), 0);
}

#[test]
fn test_class_reaction_instances() {
    let lp = quiet_loop();
    let recorder = EventRecorder::new();
    let c = Component::new(&triple(&recorder), &lp).unwrap();
    let watch = c.reaction("watch").unwrap();
    assert_eq!(watch.owner().map(|o| o.id()), Some(c.id()));
    let info = watch.connection_info();
    let strings: Vec<&str> = info.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(strings, ["a", "b", "c"]);
    assert_eq!(info[0].1, ["a:watch"]);
}

#[test]
fn test_bind_errors_surface_at_construction() {
    let lp = quiet_loop();
    let class = ComponentClass::builder("Broken")
        .property(PropertyDescriptor::int("n"))
        .reaction(ReactionDescriptor::new("r", &["n.value"], |_, _| ()))
        .build()
        .unwrap();
    assert!(matches!(
        Component::new(&class, &lp),
        Err(QuiverError::Connection(_))
    ));
    let c = Component::new(&node_class(), &lp).unwrap();
    assert!(c.react("bad", &["!!value"], |_, _| ()).is_err());
    assert_eq!(c.get("value").unwrap(), Value::Int(0));
}
