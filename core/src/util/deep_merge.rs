use serde_json::Value;

/// Merge `source` into `target`. Objects are merged recursively and arrays
/// are concatenated. Any other value in `source` overwrites the one in
/// `target`.
pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(t), Value::Object(s)) => {
            for (k, v) in s {
                match t.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        t.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (Value::Array(t), Value::Array(s)) => t.extend(s.iter().cloned()),
        (t, s) => *t = s.clone(),
    }
}
