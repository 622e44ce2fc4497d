//! Query compilation: wire payloads, run options and validation

use proptest::prelude::*;
use reql_client::query::{Durability, Query, QueryCompiler, ReadMode};
use reql_client::reql::{func, func2, Args, Format, QueryType, TermType};
use reql_client::{r, Error, RunOptions, Term};
use serde_json::{json, Value};

#[test]
fn test_insert_payload() {
    let term = r::table("Test").insert(json!({"id": "123"}));
    let query = QueryCompiler::compile(&term, &RunOptions::new())
        .unwrap()
        .with_token(1);

    let bytes = query.encode().unwrap();
    let payload: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload, json!([1, [56, [[15, ["Test"]], {"id": "123"}]], {}]));
}

#[test]
fn test_compile_is_deterministic() {
    let term = r::db("shop")
        .table("orders")
        .filter(func(|o| o.get_field("total").gt(100)))
        .eq_join("customer_id", r::db("shop").table("customers"))
        .zip()
        .order_by(vec![r::desc("total")])
        .limit(10);
    let options = RunOptions::new()
        .read_mode(ReadMode::Outdated)
        .durability(Durability::Soft)
        .profile(true);

    let first = QueryCompiler::compile(&term, &options).unwrap().encode().unwrap();
    let second = QueryCompiler::compile(&term, &options).unwrap().encode().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_run_options_become_global_optargs() {
    let options = RunOptions {
        time_format: Some(Format::Raw),
        ..RunOptions::new()
            .db("blog")
            .read_mode(ReadMode::Majority)
            .profile(true)
    };
    let query = QueryCompiler::compile(&r::table("posts"), &options).unwrap();

    assert_eq!(
        query.payload()[2],
        json!({"db": [14, ["blog"]], "read_mode": "majority", "profile": true})
    );
}

#[test]
fn test_reduce_with_two_params() {
    let sum = func2(|acc, x| acc.add(x));
    let params = sum.params();
    let wire = QueryCompiler::serialize(&r::expr(vec![1, 2, 3]).reduce(sum)).unwrap();
    assert_eq!(
        wire,
        json!([37, [
            [2, [1, 2, 3]],
            [69, [[2, params], [24, [[10, [params[0]]], [10, [params[1]]]]]]]
        ]])
    );
}

#[test]
fn test_wrong_arity_is_a_compile_error() {
    let term = r::call(TermType::Between, Args::new().value(r::table("t")));
    match QueryCompiler::compile(&term, &RunOptions::new()) {
        Err(Error::Compile(message)) => assert!(message.contains("BETWEEN")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_decoded_control_queries() {
    for (kind, code) in [
        (QueryType::Continue, 2),
        (QueryType::Stop, 3),
        (QueryType::NoreplyWait, 4),
        (QueryType::ServerInfo, 5),
    ] {
        let query = Query::decode(9, &json!([code])).unwrap();
        assert_eq!(query.kind(), kind);
        assert!(query.term().is_none());
    }
    assert!(Query::decode(9, &json!([42])).is_err());
}

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000_000i64..1_000_000).prop_map(|n| json!(n)),
        "[a-z ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn prop_wire_decode_reproduces_payload(doc in arb_json(), name in "[a-z]{1,8}") {
        let term: Term = r::table(name).insert(doc);
        let wire = QueryCompiler::serialize(&term).unwrap();
        let decoded = QueryCompiler::decode(&wire).unwrap();
        prop_assert_eq!(QueryCompiler::serialize(&decoded).unwrap(), wire);
    }
}
