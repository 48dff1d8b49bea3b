//! Diagnostics tests: property traces, problem accumulation, tolerant
//! regions, and report rendering.

mod fixtures;

use std::rc::Rc;

use futures::executor::block_on;

use fixtures::model::{self, manifest, node, widget, widget_of};
use keepsake::{
    Bindings, CodecError, Instance, Limits, Owner, ProblemCollector, ReadContext, ServiceMap,
    Unsupported, WriteContext, decode_graph, encode_graph,
};

fn session() -> Owner {
    Owner::session(Rc::new(ServiceMap::new()))
}

#[test]
fn problems_carry_the_trace_of_the_failing_property() {
    let root: Instance = manifest(
        "report",
        vec![
            node("a"),
            node("b"),
            node("c"),
            widget(false, 99),
        ],
    );

    let encoded =
        block_on(encode_graph(model::bindings(), session(), &root)).expect("encode succeeds");

    assert_eq!(encoded.problems.len(), 1);
    let problem = &encoded.problems[0];
    assert_eq!(
        problem.trace.to_string(),
        "record Manifest / field entries / element 3 / record Widget / field payload"
    );
    assert_eq!(problem.message, "widget payload cannot be serialized");
}

#[test]
fn problems_accumulate_without_aborting() {
    let root: Instance = manifest(
        "broken",
        vec![widget(false, 1), widget(true, 2), widget(false, 3)],
    );

    let encoded =
        block_on(encode_graph(model::bindings(), session(), &root)).expect("encode succeeds");
    assert_eq!(encoded.problems.len(), 2);

    // The stream is still complete; unserializable payloads were replaced.
    let decoded = block_on(decode_graph(
        model::bindings(),
        session(),
        encoded.bytes,
        &Limits::default(),
    ))
    .expect("decode succeeds");
    assert!(decoded.problems.is_empty());

    let manifest = decoded
        .root
        .downcast_ref::<fixtures::model::Manifest>()
        .expect("manifest");
    let entries = manifest.entries.borrow();
    let payloads: Vec<u64> = entries
        .iter()
        .map(|e| *widget_of(e).expect("widget").payload.borrow())
        .collect();
    assert_eq!(payloads, vec![0, 2, 0]);
}

#[test]
fn tolerant_region_substitutes_a_placeholder_for_unbound_types() {
    struct Opaque;
    let value: Instance = Rc::new(Opaque);

    let collector = ProblemCollector::new();
    let mut write = WriteContext::new(model::bindings(), session(), Rc::new(collector.clone()));

    // Outside a tolerant region an unbound type is a hard error.
    let err = block_on(write.write_value(&value)).expect_err("unbound type");
    assert!(matches!(err, CodecError::UnsupportedValue { .. }));
    assert!(collector.is_empty());

    block_on(write.for_incompatible_type(async |ctx| ctx.write_value(&value).await))
        .expect("tolerated");
    assert_eq!(collector.len(), 1);
    assert_eq!(
        collector.take()[0].message,
        "value of an unregistered runtime type cannot be serialized"
    );

    let mut read = ReadContext::new(
        model::bindings(),
        session(),
        write.into_bytes(),
        &Limits::default(),
        Rc::new(ProblemCollector::new()),
    );
    let decoded = block_on(read.read_value()).expect("placeholder decodes");
    assert!(decoded.downcast_ref::<Unsupported>().is_some());
    read.expect_end().expect("stream exhausted");
}

#[test]
fn tolerance_is_scoped_and_restored() {
    struct Opaque;
    let value: Instance = Rc::new(Opaque);

    let collector = ProblemCollector::new();
    let mut write = WriteContext::new(model::bindings(), session(), Rc::new(collector.clone()));
    block_on(write.for_incompatible_type(async |ctx| {
        assert!(ctx.tolerates_incompatible_types());
        ctx.write_value(&value).await
    }))
    .expect("tolerated");
    assert!(!write.tolerates_incompatible_types());

    // Back outside the region the same value fails again.
    let err = block_on(write.write_value(&value)).expect_err("tolerance ended");
    assert!(matches!(err, CodecError::UnsupportedValue { .. }));
    assert_eq!(collector.len(), 1);
}

#[test]
fn report_renders_problem_paths_as_json() {
    let root: Instance = manifest("report", vec![widget(false, 7)]);
    let encoded =
        block_on(encode_graph(model::bindings(), session(), &root)).expect("encode succeeds");

    let json = encoded.problem_report().to_json().expect("report renders");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(parsed["problem_count"], 1);
    assert_eq!(
        parsed["problems"][0]["path"],
        "record Manifest / field entries / element 0 / record Widget / field payload"
    );
    assert_eq!(
        parsed["problems"][0]["message"],
        "widget payload cannot be serialized"
    );
}

#[test]
fn bindings_reject_unknown_tags() {
    // A stream written with a richer binding set than the reader knows.
    let rich = model::bindings();
    let poor: Rc<Bindings> = Rc::new(Bindings::new());

    let value: Instance = Rc::new(42u64);
    let mut write = WriteContext::new(rich, session(), Rc::new(ProblemCollector::new()));
    block_on(write.write_value(&value)).expect("write");

    let mut read = ReadContext::new(
        poor,
        session(),
        write.into_bytes(),
        &Limits::default(),
        Rc::new(ProblemCollector::new()),
    );
    let err = block_on(read.read_value()).expect_err("tag is not bound");
    assert!(matches!(err, CodecError::UnknownTag { .. }));
}
