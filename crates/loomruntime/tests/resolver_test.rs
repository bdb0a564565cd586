use loomcore::{Edge, NodeOutput, PortValues};
use loomruntime::{resolve_inputs, OutputTable};
use serde_json::json;

fn edge(source: &str, target: &str, port: &str) -> Edge {
    Edge {
        id: format!("{}-{}-{}", source, target, port),
        source: source.to_string(),
        source_handle: "output".to_string(),
        target: target.to_string(),
        target_handle: port.to_string(),
    }
}

fn raw(value: serde_json::Value) -> NodeOutput {
    match value {
        serde_json::Value::Object(fields) => NodeOutput::RawObject { fields },
        other => panic!("expected an object, got {}", other),
    }
}

fn table(entries: Vec<(&str, NodeOutput)>) -> OutputTable {
    entries.into_iter().map(|(id, output)| (id.to_string(), output)).collect()
}

fn expect(value: serde_json::Value) -> PortValues {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_source_node_gets_no_inputs() {
    let outputs = table(vec![("a", NodeOutput::text("hi"))]);
    let edges = vec![edge("a", "b", "user_message")];

    assert!(resolve_inputs("a", &edges, &outputs).is_empty());
    assert!(resolve_inputs("z", &edges, &outputs).is_empty());
}

#[test]
fn test_system_prompt_from_text_field() {
    let outputs = table(vec![("t", raw(json!({ "text": "hello" })))]);
    let inputs = resolve_inputs("llm", &[edge("t", "llm", "system_prompt")], &outputs);

    assert_eq!(inputs, expect(json!({ "system_prompt": "hello" })));
}

#[test]
fn test_prompt_falls_back_to_output_field() {
    let outputs = table(vec![("prev", raw(json!({ "text": "", "output": "generated" })))]);
    let inputs = resolve_inputs("llm", &[edge("prev", "llm", "user_message")], &outputs);

    assert_eq!(inputs, expect(json!({ "user_message": "generated" })));
}

#[test]
fn test_text_output_feeds_any_port() {
    let outputs = table(vec![("t", NodeOutput::text("hi"))]);
    let edges = vec![edge("t", "llm", "user_message"), edge("t", "crop", "x_percent")];

    assert_eq!(resolve_inputs("llm", &edges, &outputs), expect(json!({ "user_message": "hi" })));
    assert_eq!(resolve_inputs("crop", &edges, &outputs), expect(json!({ "x_percent": "hi" })));
}

#[test]
fn test_media_refs_map_to_matching_ports() {
    let outputs = table(vec![
        ("img", NodeOutput::image("/uploads/a.jpg")),
        ("vid", NodeOutput::video("/uploads/b.mp4")),
    ]);
    let edges = vec![
        edge("img", "crop", "image_url"),
        edge("vid", "frame", "video_url"),
        edge("img", "frame2", "video_url"),
        edge("img", "llm", "user_message"),
    ];

    assert_eq!(resolve_inputs("crop", &edges, &outputs), expect(json!({ "image_url": "/uploads/a.jpg" })));
    assert_eq!(resolve_inputs("frame", &edges, &outputs), expect(json!({ "video_url": "/uploads/b.mp4" })));
    // A kind mismatch hands over the whole object.
    assert_eq!(
        resolve_inputs("frame2", &edges, &outputs),
        expect(json!({ "video_url": { "imageUrl": "/uploads/a.jpg" } }))
    );
    // Media carries nothing for prompt ports.
    assert!(resolve_inputs("llm", &edges, &outputs).is_empty());
}

#[test]
fn test_raw_object_fields_and_fallback() {
    let outputs = table(vec![
        ("upload", raw(json!({ "imageUrl": "/uploads/c.png", "label": "Photo" }))),
        ("other", raw(json!({ "label": "no url" }))),
    ]);
    let edges = vec![
        edge("upload", "crop", "image_url"),
        edge("other", "crop2", "image_url"),
        edge("upload", "custom", "anything"),
    ];

    assert_eq!(resolve_inputs("crop", &edges, &outputs), expect(json!({ "image_url": "/uploads/c.png" })));
    assert_eq!(
        resolve_inputs("crop2", &edges, &outputs),
        expect(json!({ "image_url": { "label": "no url" } }))
    );
    assert_eq!(
        resolve_inputs("custom", &edges, &outputs),
        expect(json!({ "anything": { "imageUrl": "/uploads/c.png", "label": "Photo" } }))
    );
}

#[test]
fn test_images_port_accumulates_in_edge_order() {
    let outputs = table(vec![
        ("crop1", NodeOutput::image("/processed/1.jpg")),
        ("crop2", NodeOutput::image("/processed/2.jpg")),
        ("upload", raw(json!({ "imageUrl": "/uploads/3.jpg" }))),
    ]);
    let edges = vec![
        edge("crop2", "llm", "images"),
        edge("upload", "llm", "images"),
        edge("crop1", "llm", "images"),
    ];

    assert_eq!(
        resolve_inputs("llm", &edges, &outputs),
        expect(json!({ "images": ["/processed/2.jpg", "/uploads/3.jpg", "/processed/1.jpg"] }))
    );
}

#[test]
fn test_last_edge_wins_for_shared_port() {
    let outputs = table(vec![("a", NodeOutput::text("first")), ("b", NodeOutput::text("second"))]);

    let edges = vec![edge("a", "llm", "user_message"), edge("b", "llm", "user_message")];
    assert_eq!(resolve_inputs("llm", &edges, &outputs), expect(json!({ "user_message": "second" })));

    let edges = vec![edge("b", "llm", "user_message"), edge("a", "llm", "user_message")];
    assert_eq!(resolve_inputs("llm", &edges, &outputs), expect(json!({ "user_message": "first" })));
}

#[test]
fn test_missing_upstream_and_unnamed_ports_are_skipped() {
    let outputs = table(vec![("a", NodeOutput::text("hi"))]);
    let edges = vec![edge("pending", "llm", "system_prompt"), edge("a", "llm", "")];

    assert!(resolve_inputs("llm", &edges, &outputs).is_empty());
}
