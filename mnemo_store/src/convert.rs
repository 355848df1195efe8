//! JSON <-> embedding conversion. Every embedding column is stored as a JSON
//! array of floats at the user's padded `D_pad` width (§4.2, §9).

use sea_orm::JsonValue;

#[must_use]
pub fn embedding_to_json(emb: &[f32]) -> JsonValue {
    JsonValue::Array(emb.iter().map(|f| JsonValue::from(f64::from(*f))).collect())
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn json_to_embedding(val: &JsonValue) -> Option<Vec<f32>> {
    let arr = val.as_array()?;
    Some(
        arr.iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect(),
    )
}

#[must_use]
pub fn strings_to_json(items: &[String]) -> JsonValue {
    JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
}

#[must_use]
pub fn json_to_strings(val: &JsonValue) -> Vec<String> {
    val.as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_round_trips() {
        let v = vec![0.5_f32, -1.25, 3.0];
        let json = embedding_to_json(&v);
        let back = json_to_embedding(&json).unwrap();
        assert!((back[0] - v[0]).abs() < 1e-6);
        assert!((back[1] - v[1]).abs() < 1e-6);
        assert!((back[2] - v[2]).abs() < 1e-6);
    }

    #[test]
    fn strings_round_trip() {
        let v = vec!["a".to_string(), "b".to_string()];
        let json = strings_to_json(&v);
        assert_eq!(json_to_strings(&json), v);
    }
}
