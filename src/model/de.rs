//! # Deserialization helpers
//!
//! The editing surface hands us documents that went through a CRDT layer. On
//! that way text leaves can lose their `type` field and fragments may arrive as
//! bare arrays. [`normalize`] repairs both before anything is deserialized.
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

pub(crate) const EMPTY_DOC: &str = r#"{"type":"doc","content":[]}"#;

pub(crate) fn empty_doc() -> Value {
    let mut doc = Map::new();
    doc.insert(String::from("type"), Value::from("doc"));
    doc.insert(String::from("content"), Value::Array(Vec::new()));
    Value::Object(doc)
}

/// Deserialize `null` as the default value
pub fn deserialize_or_default<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: Default + Deserialize<'de>,
    D: Deserializer<'de>,
{
    let opt: Option<T> = Deserialize::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Normalize a raw document
///
/// - a root array is wrapped into a `doc` node
/// - an untyped root object with `content` becomes a `doc` node
/// - an object with a string `text` but no `type` becomes a `text` node
/// - any other object without a `type` is dropped, children included
/// - values that are not objects are dropped from fragments
///
/// Returns `None` if nothing of the document survives. Running this twice
/// yields the same result as running it once.
pub fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Array(content) => {
            let mut doc = Map::new();
            doc.insert(String::from("type"), Value::from("doc"));
            doc.insert(String::from("content"), normalize_fragment(content));
            Some(Value::Object(doc))
        }
        Value::Object(mut node)
            if !has_string(&node, "type")
                && !has_string(&node, "text")
                && node.contains_key("content") =>
        {
            node.insert(String::from("type"), Value::from("doc"));
            normalize_node(Value::Object(node))
        }
        other => normalize_node(other),
    }
}

fn has_string(node: &Map<String, Value>, key: &str) -> bool {
    matches!(node.get(key), Some(Value::String(_)))
}

fn normalize_fragment(content: Vec<Value>) -> Value {
    Value::Array(content.into_iter().filter_map(normalize_node).collect())
}

fn normalize_node(value: Value) -> Option<Value> {
    let mut node = match value {
        Value::Object(node) => node,
        _ => return None,
    };

    if !has_string(&node, "type") {
        if !has_string(&node, "text") {
            return None;
        }
        node.insert(String::from("type"), Value::from("text"));
    }

    if let Some(content) = node.remove("content") {
        let content = match content {
            Value::Array(items) => normalize_fragment(items),
            Value::Null => Value::Array(Vec::new()),
            other => other,
        };
        node.insert(String::from("content"), content);
    }

    Some(Value::Object(node))
}

#[cfg(test)]
mod tests {
    use super::normalize;
    use serde_json::json;

    #[test]
    fn test_untyped_text_becomes_text() {
        let raw = json!({ "type": "paragraph", "content": [{ "text": "a" }, { "type": "text", "text": "b" }] });
        assert_eq!(
            normalize(raw),
            Some(json!({ "type": "paragraph", "content": [
                { "text": "a", "type": "text" },
                { "type": "text", "text": "b" }
            ]}))
        );
    }

    #[test]
    fn test_garbage_is_dropped() {
        let raw = json!({ "type": "doc", "content": [{}, 42, { "attrs": {} }, { "type": "paragraph" }] });
        assert_eq!(
            normalize(raw),
            Some(json!({ "type": "doc", "content": [{ "type": "paragraph" }] }))
        );
        assert_eq!(normalize(json!({})), None);
    }

    #[test]
    fn test_untyped_container_is_dropped() {
        let raw = json!({ "type": "doc", "content": [
            { "type": "paragraph", "content": [{ "text": "kept" }] },
            { "content": [{ "type": "paragraph", "content": [{ "text": "lost" }] }] },
            { "content": [] }
        ]});
        assert_eq!(
            normalize(raw),
            Some(json!({ "type": "doc", "content": [
                { "type": "paragraph", "content": [{ "text": "kept", "type": "text" }] }
            ]}))
        );
    }

    #[test]
    fn test_untyped_root_becomes_doc() {
        let raw = json!({ "content": [{ "type": "paragraph" }] });
        assert_eq!(
            normalize(raw),
            Some(json!({ "type": "doc", "content": [{ "type": "paragraph" }] }))
        );
    }

    #[test]
    fn test_root_array_is_wrapped() {
        let raw = json!([{ "type": "paragraph", "content": [{ "text": "x" }] }]);
        assert_eq!(
            normalize(raw),
            Some(json!({ "type": "doc", "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "x" }] }
            ]}))
        );
    }

    #[test]
    fn test_idempotent() {
        let raw = json!([
            { "type": "paragraph", "content": [{ "text": "a" }, null, { "marks": [] }] },
            { "content": [{ "text": "orphan" }] },
            { "type": "heading", "attrs": { "level": 1 }, "content": null }
        ]);
        let once = normalize(raw).unwrap();
        let twice = normalize(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
