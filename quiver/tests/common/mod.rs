#![allow(dead_code)]

use quiver::testing::EventRecorder;
use quiver::{
    ActionDescriptor, ClassBuilder, ComponentClass, EmitterDescriptor, Loop, LoopConfig,
    PropertyDescriptor, ReactionDescriptor, Value, payload,
};
use std::rc::Rc;

// ============================================================================
// Loops
// ============================================================================

/// A loop that does not warn about unknown event types.
pub fn quiet_loop() -> Loop {
    Loop::with_config(LoopConfig::default().with_warn_unknown_events(false))
}

// ============================================================================
// Test Classes
// ============================================================================

/// `Counter`: read-only `count`, settable `label`, actions that mutate
/// `count`, and a `bumped` emitter.
pub fn counter_class() -> Rc<ComponentClass> {
    ComponentClass::builder("Counter")
        .property(PropertyDescriptor::int("count"))
        .property(PropertyDescriptor::string("label").settable())
        .action(ActionDescriptor::new("increment", |c, _| {
            let n = c.get("count")?.as_int().unwrap_or(0);
            c.set("count", n + 1)
        }))
        .action(ActionDescriptor::new("set_to", |c, args| {
            c.set("count", args.first().cloned().unwrap_or_default())
        }))
        .action(ActionDescriptor::new("burst", |c, args| {
            for value in args {
                c.set("count", value.clone())?;
            }
            Ok::<(), quiver::QuiverError>(())
        }))
        .action(ActionDescriptor::new("nested", |c, _| {
            c.call("set_to", &[Value::Int(10)])?;
            c.call("set_to", &[Value::Int(20)])
        }))
        .emitter(EmitterDescriptor::new("bumped", |c, args| {
            let by = args.first().cloned().unwrap_or(Value::Int(1));
            Ok::<_, quiver::QuiverError>(payload! { "by" => by, "count" => c.get("count")? })
        }))
        .build()
        .unwrap()
}

/// `Node`: a tree node with a value, a component slot and a child list.
pub fn node_class() -> Rc<ComponentClass> {
    ComponentClass::builder("Node")
        .property(PropertyDescriptor::int("value").settable())
        .property(PropertyDescriptor::component("sub").settable())
        .property(PropertyDescriptor::list("children").settable())
        .emitter(EmitterDescriptor::new("clicked", |_, _| payload! {}))
        .build()
        .unwrap()
}

/// A subclass of `base` with one reaction recorded by `recorder`.
pub fn watching(
    base: &Rc<ComponentClass>,
    recorder: &EventRecorder,
    connections: &[&str],
) -> Rc<ComponentClass> {
    ClassBuilder::extends(format!("Watching{}", base.name()), base)
        .reaction(recorder.descriptor("watch", connections))
        .build()
        .unwrap()
}

/// A class with one reaction whose body is `recorder`.
pub fn standalone(recorder: &EventRecorder, connections: &[&str]) -> Rc<ComponentClass> {
    ComponentClass::builder("Standalone")
        .reaction(ReactionDescriptor::new("watch", connections, recorder.handler()))
        .build()
        .unwrap()
}
