mod common;

use common::{counter_class, node_class, quiet_loop, watching};
use quiver::testing::EventRecorder;
use quiver::{
    ActionDescriptor, BoxError, ClassBuilder, Component, ComponentError, QuiverError, Value,
};
use std::cell::Cell;
use std::rc::Rc;

fn watched_counter(recorder: &EventRecorder) -> (quiver::Loop, Component) {
    let lp = quiet_loop();
    let c = Component::new(&watching(&counter_class(), recorder, &["count"]), &lp).unwrap();
    lp.iter().unwrap();
    recorder.clear();
    (lp, c)
}

#[test]
fn test_assignments_in_one_action_emit_one_event() {
    let recorder = EventRecorder::new();
    let (lp, c) = watched_counter(&recorder);

    c.call("burst", &[Value::Int(1), Value::Int(2), Value::Int(3)])
        .unwrap();
    // Nothing is delivered synchronously.
    assert_eq!(recorder.call_count(), 0);
    assert_eq!(lp.pending_events(), 1);
    lp.iter().unwrap();

    assert_eq!(recorder.batch_sizes(), [1]);
    let event = &recorder.events()[0];
    assert_eq!(event.old_value(), Some(&Value::Int(0)));
    assert_eq!(event.new_value(), Some(&Value::Int(3)));
}

#[test]
fn test_nested_actions_emit_once_with_final_value() {
    let recorder = EventRecorder::new();
    let (lp, c) = watched_counter(&recorder);

    c.call("nested", &[]).unwrap();
    lp.iter().unwrap();

    assert_eq!(recorder.call_count(), 1);
    assert_eq!(recorder.new_values(), [Value::Int(20)]);
}

#[test]
fn test_separate_actions_batch_into_one_call() {
    let recorder = EventRecorder::new();
    let (lp, c) = watched_counter(&recorder);

    c.call("increment", &[]).unwrap();
    c.call("increment", &[]).unwrap();
    lp.iter().unwrap();

    assert_eq!(recorder.batch_sizes(), [2]);
    assert_eq!(recorder.new_values(), [Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_round_trip_inside_action_still_notifies() {
    let recorder = EventRecorder::new();
    let (lp, c) = watched_counter(&recorder);

    c.call("burst", &[Value::Int(5), Value::Int(0)]).unwrap();
    lp.iter().unwrap();
    assert_eq!(recorder.call_count(), 1);
    let event = &recorder.events()[0];
    assert_eq!(event.old_value(), event.new_value());

    recorder.clear();
    c.call("burst", &[Value::Int(0)]).unwrap();
    lp.iter().unwrap();
    assert_eq!(recorder.call_count(), 0);
}

#[test]
fn test_is_processing_actions_inside_body() {
    let lp = quiet_loop();
    let observed = Rc::new(Cell::new(false));
    let seen = Rc::clone(&observed);
    let class = ClassBuilder::extends("Inspecting", &counter_class())
        .action(ActionDescriptor::new("inspect", move |c, _| {
            seen.set(c.event_loop().is_processing_actions());
        }))
        .build()
        .unwrap();
    let c = Component::new(&class, &lp).unwrap();

    assert!(!lp.is_processing_actions());
    c.call("inspect", &[]).unwrap();
    assert!(observed.get());
    assert!(!lp.is_processing_actions());
}

#[test]
fn test_failing_body_reports_member() {
    let lp = quiet_loop();
    let class = ClassBuilder::extends("Failing", &counter_class())
        .action(ActionDescriptor::new("explode", |c, _| {
            c.set("count", 5)?;
            Err::<(), BoxError>("no luck".into())
        }))
        .build()
        .unwrap();
    let c = Component::new(&class, &lp).unwrap();

    let err = c.call("explode", &[]).unwrap_err();
    assert_eq!(err.to_string(), "`explode` failed: no luck");
    // Changes made before the failure stay.
    assert_eq!(c.get("count").unwrap(), Value::Int(5));
}

#[test]
fn test_panicking_body_still_announces_its_changes() {
    let lp = quiet_loop();
    let recorder = EventRecorder::new();
    let base = watching(&counter_class(), &recorder, &["count"]);
    let class = ClassBuilder::extends("Fragile", &base)
        .action(ActionDescriptor::new("boom", |c, _| -> Result<(), QuiverError> {
            c.set("count", 5)?;
            panic!("boom")
        }))
        .build()
        .unwrap();
    let c = Component::new(&class, &lp).unwrap();
    let other = Component::new(&node_class(), &lp).unwrap();
    lp.iter().unwrap();
    recorder.clear();
    c.react("fire", &["label"], |c, _| c.call("boom", &[])).unwrap();

    c.set("label", "go").unwrap();
    let report = lp.iter().unwrap();
    assert_eq!(report.failures, 1);
    assert_eq!(c.get("count").unwrap(), Value::Int(5));
    assert_eq!(recorder.new_values(), [Value::Int(5)]);
    recorder.clear();

    // Nothing from the failed action is left to leak into a later one.
    other.call("set_value", &[Value::Int(1)]).unwrap();
    lp.iter().unwrap();
    assert_eq!(recorder.call_count(), 0);
}

#[test]
fn test_unknown_member() {
    let lp = quiet_loop();
    let c = Component::new(&counter_class(), &lp).unwrap();
    assert!(matches!(
        c.call("count", &[]),
        Err(QuiverError::Component(ComponentError::UnknownMember { .. }))
    ));
}
