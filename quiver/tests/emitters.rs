mod common;

use common::{counter_class, node_class, quiet_loop, standalone, watching};
use quiver::testing::EventRecorder;
use quiver::{
    ClassBuilder, Component, ComponentError, EmitterDescriptor, Payload, Value, payload,
};

#[test]
fn test_eager_reaction_batches_raw_emits_until_flush() {
    let lp = quiet_loop();
    let recorder = EventRecorder::new();
    let c = Component::new(&standalone(&recorder, &["!foo"]), &lp).unwrap();

    c.emit("foo", Payload::new()).unwrap();
    lp.iter().unwrap();
    assert_eq!(recorder.batch_sizes(), [1]);

    c.emit("foo", Payload::new()).unwrap();
    c.emit("foo", Payload::new()).unwrap();
    lp.iter().unwrap();
    assert_eq!(recorder.batch_sizes(), [1, 2]);
}

#[test]
fn test_eager_reaction_runs_before_emitter_returns() {
    let lp = quiet_loop();
    let eager = EventRecorder::new();
    let normal = EventRecorder::new();
    let class = ClassBuilder::extends("Clicky", &node_class())
        .reaction(eager.descriptor("eager", &["!clicked"]))
        .reaction(normal.descriptor("normal", &["clicked"]))
        .build()
        .unwrap();
    let c = Component::new(&class, &lp).unwrap();

    c.call("clicked", &[]).unwrap();
    assert_eq!(eager.call_count(), 1);
    assert_eq!(normal.call_count(), 0);

    lp.iter().unwrap();
    assert_eq!(eager.call_count(), 1);
    assert_eq!(normal.call_count(), 1);
}

#[test]
fn test_eager_reaction_runs_before_action_returns() {
    let lp = quiet_loop();
    let eager = EventRecorder::new();
    let c = Component::new(&watching(&counter_class(), &eager, &["!count"]), &lp).unwrap();
    lp.iter().unwrap();
    eager.clear();

    c.call("nested", &[]).unwrap();
    assert_eq!(eager.new_values(), [Value::Int(20)]);
}

#[test]
fn test_batch_block_defers_eager_delivery() {
    let lp = quiet_loop();
    let eager = EventRecorder::new();
    let class = ClassBuilder::extends("Clicky", &node_class())
        .reaction(eager.descriptor("eager", &["!clicked"]))
        .build()
        .unwrap();
    let c = Component::new(&class, &lp).unwrap();

    let inside = lp
        .batch(|| {
            c.call("clicked", &[]).unwrap();
            c.call("clicked", &[]).unwrap();
            (lp.is_processing_actions(), eager.call_count())
        })
        .unwrap();

    assert_eq!(inside, (true, 0));
    assert_eq!(eager.batch_sizes(), [2]);
    assert!(!lp.is_processing_actions());
}

#[test]
fn test_emitter_payload_and_silence() {
    let lp = quiet_loop();
    let recorder = EventRecorder::new();
    let class = ClassBuilder::extends("Maybe", &counter_class())
        .emitter(EmitterDescriptor::new("maybe", |_, args| {
            args.first()
                .and_then(Value::as_str)
                .map(|s| payload! { "text" => s })
        }))
        .reaction(recorder.descriptor("watch", &["maybe", "bumped"]))
        .build()
        .unwrap();
    let c = Component::new(&class, &lp).unwrap();

    c.call("maybe", &[]).unwrap();
    c.call("maybe", &[Value::from("hi")]).unwrap();
    c.call("bumped", &[Value::Int(3)]).unwrap();
    lp.iter().unwrap();

    let events = recorder.events();
    assert_eq!(recorder.kinds(), ["maybe", "bumped"]);
    assert_eq!(events[0].get("text"), Some(&Value::from("hi")));
    assert_eq!(events[1].get("by"), Some(&Value::Int(3)));
    assert_eq!(events[1].get("count"), Some(&Value::Int(0)));
    assert!(events[0].sequence() < events[1].sequence());
}

#[test]
fn test_emit_rejects_labels() {
    let lp = quiet_loop();
    let c = Component::new(&node_class(), &lp).unwrap();
    assert!(matches!(
        c.emit("clicked:label", Payload::new()),
        Err(ComponentError::LabelNotAllowed(_))
    ));
}
