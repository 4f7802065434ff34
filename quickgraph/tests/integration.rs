//! End-to-end tests driving `Engine`/`GraphEngine` through the public API
//! exactly as an application would: register resolvers, `finish()`, send a
//! request string, assert on the parsed JSON response.

use std::sync::Arc;
use std::time::Duration;

use quickgraph::{Engine, GraphQLObject, NoContext, RequestContext};
use serde::Serialize;

#[derive(Clone, Serialize, GraphQLObject)]
struct Course {
    title: String,
    instructor: String,
}

#[derive(Clone, Serialize, GraphQLObject)]
struct Video {
    title: String,
    minutes: i32,
}

fn courses_fixture() -> Vec<Course> {
    vec![
        Course { title: "Rust Fundamentals".into(), instructor: "Amy".into() },
        Course { title: "Async in Depth".into(), instructor: "Ben".into() },
    ]
}

#[tokio::test]
async fn aliased_list_query_with_variables() {
    let mut engine: Engine<NoContext> = Engine::default();
    engine.register_query1("courses", Some(["instructor"]), |_ctx, instructor: Option<String>| async move {
        let all = courses_fixture();
        let filtered: Vec<Course> = match instructor {
            Some(name) => all.into_iter().filter(|c| c.instructor == name).collect(),
            None => all,
        };
        Ok::<_, String>(filtered)
    });
    let engine = engine.finish();

    let query = r#"query Filtered($who: String) { list: courses(instructor: $who) { title instructor } }"#;
    let (response, first_error) = engine.process_request(Arc::new(NoContext), query, r#"{"who": "Ben"}"#).await;
    assert!(first_error.is_none());

    let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(
        parsed["data"]["list"],
        serde_json::json!([{"title": "Async in Depth", "instructor": "Ben"}])
    );
}

#[tokio::test]
async fn missing_required_argument_is_reported_with_location() {
    let mut engine: Engine<NoContext> = Engine::default();
    engine.register_query1("course", Some(["id"]), |_ctx, id: String| async move {
        Ok::<_, String>(Course { title: format!("course {id}"), instructor: "Amy".into() })
    });
    let engine = engine.finish();

    let (response, first_error) = engine.process_request(Arc::new(NoContext), "{ course { title } }", "{}").await;
    let err = first_error.expect("missing required argument must surface an error");
    assert!(err.message.contains("required argument"));
    assert!(err.message.contains("id"));

    let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert!(parsed["errors"][0]["locations"][0]["line"].is_number());
}

#[tokio::test]
async fn unknown_operation_keyword_is_rejected() {
    let mut engine: Engine<NoContext> = Engine::default();
    engine.register_query0("courses", None, |_ctx| async move { Ok::<_, String>(courses_fixture()) });
    let engine = engine.finish();

    let (_response, first_error) = engine
        .process_request(Arc::new(NoContext), "BlahBlah { courses { title } }", "{}")
        .await;
    let err = first_error.expect("an unrecognized operation keyword must be rejected");
    assert!(err.message.contains("unknown/unsupported call mode"));
}

#[tokio::test]
async fn resolver_error_inside_a_list_is_scoped_to_its_index() {
    #[derive(Clone, Serialize, serde::Deserialize, GraphQLObject)]
    struct Item {
        id: i32,
    }

    let mut engine: Engine<NoContext> = Engine::default();
    engine.register_query0("items", None, |_ctx| async move {
        Ok::<_, String>(vec![Item { id: 1 }, Item { id: 2 }, Item { id: 3 }])
    });
    engine.register_method0::<Item, _, _>("label", None, |item, _ctx| async move {
        let outcome: Result<String, String> = if item.id == 2 {
            Err("label lookup failed".to_string())
        } else {
            Ok(format!("item-{}", item.id))
        };
        outcome
    });
    let engine = engine.finish();

    let (response, first_error) = engine
        .process_request(Arc::new(NoContext), "{ items { id label } }", "{}")
        .await;
    let err = first_error.expect("the failing element must produce an error");
    assert!(err.message.contains("label lookup failed"));
    assert_eq!(err.path, vec![
        quickgraph::PathSegment::Field("items".into()),
        quickgraph::PathSegment::Field("label".into()),
    ]);

    let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
    let items = parsed["data"]["items"].as_array().unwrap();
    assert_eq!(items[0]["label"], "item-1");
    assert_eq!(items[1]["label"], serde_json::Value::Null);
    assert_eq!(items[2]["label"], "item-3");
}

#[tokio::test]
async fn parallel_queries_honor_the_request_deadline() {
    let mut engine: Engine<NoContext> = Engine::default();
    engine.register_query0("fast", None, |_ctx| async move { Ok::<_, String>("done".to_string()) });
    engine.register_query0("slow", None, |_ctx| async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, String>("too late".to_string())
    });
    let engine = engine.finish();

    let request_ctx = RequestContext::new().with_deadline(std::time::Instant::now() + Duration::from_millis(20));
    let (response, _first_error) = engine
        .process_request_with_context(Arc::new(NoContext), "{ fast slow }", "{}", &request_ctx)
        .await;

    let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["data"]["fast"], "done");
    assert_eq!(parsed["data"]["slow"], serde_json::Value::Null);
    let errors = parsed["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e["message"].as_str().unwrap().contains("context deadline exceeded")));
}

#[tokio::test]
async fn implicit_union_with_two_populated_variants_is_an_error() {
    let mut engine: Engine<NoContext> = Engine::default();
    engine.register_query0("search", None, |_ctx| async move {
        Ok::<_, String>((
            Some(Course { title: "Rust Fundamentals".into(), instructor: "Amy".into() }),
            Some(Video { title: "Rust Fundamentals".into(), minutes: 42 }),
        ))
    });
    let engine = engine.finish();

    let (_response, first_error) = engine
        .process_request(Arc::new(NoContext), "{ search { ... on Course { title } ... on Video { title } } }", "{}")
        .await;
    let err = first_error.expect("two populated union variants must be rejected");
    assert!(err.message.contains("more than one field in union type is not nil"));
}
