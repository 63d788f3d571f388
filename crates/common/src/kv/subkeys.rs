use serde_json::{Map, Value};

/// Replace every leaf of `data` with `null`, keeping only its key structure
///
/// Objects are walked recursively. With a non-zero `depth`, every value at
///  that level becomes `null` even if it is an object; `depth = 1` keeps only
///  the top-level keys.
pub fn subkeys(data: &Map<String, Value>, depth: u32) -> Map<String, Value> {
    strip(data, 1, depth)
}

fn strip(data: &Map<String, Value>, level: u32, depth: u32) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| {
            let stripped = match value {
                Value::Object(inner) if depth == 0 || level < depth => {
                    Value::Object(strip(inner, level + 1, depth))
                }
                _ => Value::Null,
            };
            (key.clone(), stripped)
        })
        .collect()
}
