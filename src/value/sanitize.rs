use super::{Dictionary, Value};

/// Copy of `root` with every data field removed.
///
/// Collections are cleaned recursively. A collection that ends up empty,
/// or was empty to begin with, is dropped from its parent.
pub fn remove_data_fields(root: &Dictionary) -> Dictionary {
    root.iter()
        .filter_map(|(key, value)| clean(value).map(|v| (key.clone(), v)))
        .collect()
}

/// List counterpart of [`remove_data_fields`].
pub fn remove_data_fields_list(items: &[Value]) -> Vec<Value> {
    items.iter().filter_map(clean).collect()
}

fn clean(value: &Value) -> Option<Value> {
    match value {
        Value::Data(_) => None,
        Value::Array(items) => {
            let items = remove_data_fields_list(items);
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Dictionary(dict) => {
            let dict = remove_data_fields(dict);
            (!dict.is_empty()).then_some(Value::Dictionary(dict))
        }
        other => Some(other.clone()),
    }
}
