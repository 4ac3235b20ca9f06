//! Structural JSON merge

use serde_json::Value;

/// Merge `source` into `target`. Objects merge key by key and arrays index
/// by index, recursively; any other pair of values is resolved in favour of
/// `source`. Elements past the end of the shorter array are kept as they are.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Array(target), Value::Array(source)) => {
            for (index, value) in source.into_iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => deep_merge(existing, value),
                    None => target.push(value),
                }
            }
        }
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_nested_objects_merge() {
        let mut target = json!({"header": {"title": "Home", "links": 2}});
        deep_merge(&mut target, json!({"header": {"links": 3}, "footer": {"year": 2024}}));

        assert_eq!(
            target,
            json!({"header": {"title": "Home", "links": 3}, "footer": {"year": 2024}})
        );
    }

    #[test]
    fn test_last_value_wins_on_conflict() {
        let mut target = json!({"x": 1, "list": [1, 2], "name": "a"});
        deep_merge(&mut target, json!({"x": {"nested": true}, "list": "none", "name": [1]}));

        assert_eq!(target, json!({"x": {"nested": true}, "list": "none", "name": [1]}));
    }

    #[test]
    fn test_arrays_merge_by_index() {
        let mut target = json!({"nav": {"items": ["home", "about"]}});
        deep_merge(&mut target, json!({"nav": {"items": ["start"]}}));
        assert_eq!(target, json!({"nav": {"items": ["start", "about"]}}));

        let mut target = json!({"links": [{"href": "/", "label": "Home"}]});
        deep_merge(
            &mut target,
            json!({"links": [{"label": "Start"}, {"href": "/blog", "label": "Blog"}]}),
        );
        assert_eq!(
            target,
            json!({"links": [
                {"href": "/", "label": "Start"},
                {"href": "/blog", "label": "Blog"}
            ]})
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let fragment = json!({"a": {"b": [1], "c": "d"}});
        let mut once = json!({});
        deep_merge(&mut once, fragment.clone());
        let mut twice = once.clone();
        deep_merge(&mut twice, fragment);

        assert_eq!(once, twice);
    }
}
