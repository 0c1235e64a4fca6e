//! JSON decoding with enough context to debug upstream schema drift.

use crate::cache::UpstreamError;

/// Deserialize `body`, reporting the serde path, a readable type mismatch, and a
/// snippet of the offending line on failure.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, UpstreamError> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(jd).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let path = err.path().to_string();

        let msg = inner.to_string();
        let loc = format!(" at line {line} column {column}");
        let msg = msg.strip_suffix(&loc).unwrap_or(&msg);

        let mut out = String::new();
        if !path.is_empty() && path != "." {
            out.push_str(&format!("at path '{path}': "));
        }
        out.push_str(&format!(
            "{} (line {line} col {column})\n{}",
            describe_mismatch(msg),
            snippet(body, line, column, 20)
        ));
        UpstreamError::malformed(out)
    })
}

/// Turn "invalid type: null, expected a string" into "expected a string, got null".
fn describe_mismatch(msg: &str) -> String {
    if let Some(rest) = msg.strip_prefix("invalid type: ")
        && let Some((actual, expected)) = rest.split_once(", expected ")
    {
        return format!("expected {expected}, got {actual}");
    }
    msg.to_owned()
}

fn snippet(body: &str, line: usize, column: usize, width: usize) -> String {
    let target: Vec<char> = body
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .chars()
        .collect();
    if target.is_empty() {
        return "(empty line)".to_owned();
    }

    let idx = column.saturating_sub(1).min(target.len() - 1);
    let start = idx.saturating_sub(width / 2);
    let end = (idx + width / 2).min(target.len());
    let slice: String = target[start..end].iter().collect();
    let indicator = " ".repeat(idx - start) + "^";

    format!("...{slice}...\n   {indicator}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn describes_type_mismatch() {
        assert_eq!(
            describe_mismatch("invalid type: null, expected a string"),
            "expected a string, got null"
        );
        assert_eq!(describe_mismatch("expected value"), "expected value");
    }

    #[test]
    fn reports_nested_path() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Row {
            guid: String,
            data: Data,
        }

        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Data {
            #[serde(rename = "itemName")]
            item_name: String,
        }

        let body = r#"[{"guid": "a1", "data": {"itemName": null}}]"#;
        let err = parse_json_with_context::<Vec<Row>>(body).unwrap_err();
        let msg = err.to_string();

        assert!(msg.contains("[0].data.itemName"), "{msg}");
        assert!(msg.contains("expected") && msg.contains("got null"), "{msg}");
        assert_eq!(err.status, None);
    }

    #[test]
    fn snippet_handles_multibyte_lines() {
        let body = r#"{"name": "Épée de fer", "value": oops}"#;
        let err = parse_json_with_context::<serde_json::Value>(body).unwrap_err();
        assert!(err.message.contains('^'));
    }
}
