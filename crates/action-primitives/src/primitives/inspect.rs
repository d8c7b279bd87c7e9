//! Read-only page inspection through remote evaluation

use crate::{errors::ActionError, primitives::DefaultActionPrimitives};
use serde_json::Value;
use tracing::trace;

pub async fn page_title(primitives: &DefaultActionPrimitives) -> Result<String, ActionError> {
    primitives
        .adapter()
        .page_title(primitives.page())
        .await
        .map_err(|err| ActionError::from_adapter(err, None))
}

pub async fn count(
    primitives: &DefaultActionPrimitives,
    selector: &str,
) -> Result<usize, ActionError> {
    primitives
        .adapter()
        .query_count(primitives.page(), selector)
        .await
        .map_err(|err| ActionError::from_adapter(err, Some(selector)))
}

pub async fn text_fields(
    primitives: &DefaultActionPrimitives,
    container: &str,
    fields: &[&str],
) -> Result<Vec<Vec<Option<String>>>, ActionError> {
    let script = text_fields_script(container, fields)?;
    let value = evaluate(primitives, &script, container).await?;
    let rows = value.as_array().ok_or_else(|| {
        ActionError::Internal(format!("text projection for '{}' returned {}", container, value))
    })?;

    let projected: Vec<Vec<Option<String>>> = rows
        .iter()
        .map(|row| {
            let cells = row.as_array().map(Vec::as_slice).unwrap_or_default();
            (0..fields.len())
                .map(|idx| {
                    cells
                        .get(idx)
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|text| !text.is_empty())
                        .map(str::to_string)
                })
                .collect()
        })
        .collect();
    trace!(container = %container, rows = projected.len(), "text fields projected");
    Ok(projected)
}

pub async fn interactable(
    primitives: &DefaultActionPrimitives,
    selector: &str,
) -> Result<Option<bool>, ActionError> {
    let literal = js_string(selector)?;
    let script = format!(
        "(() => {{\n    const el = document.querySelector({literal});\n    if (!el) {{ return null; }}\n    const style = window.getComputedStyle(el);\n    return style.opacity !== '0' && !el.disabled;\n}})()"
    );
    match evaluate(primitives, &script, selector).await? {
        Value::Null => Ok(None),
        Value::Bool(flag) => Ok(Some(flag)),
        other => Err(ActionError::Internal(format!(
            "interactable probe for '{}' returned {}",
            selector, other
        ))),
    }
}

async fn evaluate(
    primitives: &DefaultActionPrimitives,
    script: &str,
    selector: &str,
) -> Result<Value, ActionError> {
    primitives
        .adapter()
        .evaluate_script(primitives.page(), script)
        .await
        .map_err(|err| ActionError::from_adapter(err, Some(selector)))
}

fn text_fields_script(container: &str, fields: &[&str]) -> Result<String, ActionError> {
    let container = js_string(container)?;
    let fields = serde_json::to_string(fields)
        .map_err(|err| ActionError::Internal(format!("failed to encode field selectors: {}", err)))?;
    Ok(format!(
        "(() => {{\n    const fields = {fields};\n    return Array.from(document.querySelectorAll({container})).map((node) =>\n        fields.map((sel) => {{\n            const el = node.querySelector(sel);\n            if (!el) {{ return null; }}\n            const text = (el.innerText ?? el.textContent ?? '').trim();\n            return text.length ? text : null;\n        }})\n    );\n}})()"
    ))
}

fn js_string(raw: &str) -> Result<String, ActionError> {
    serde_json::to_string(raw)
        .map_err(|err| ActionError::Internal(format!("failed to encode selector: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_script_embeds_escaped_selectors() {
        let script = text_fields_script(
            "[data-testid=\"product-card\"]",
            &["[data-testid=\"product-card-name\"]", "h4"],
        )
        .unwrap();
        assert!(script.contains(r#"document.querySelectorAll("[data-testid=\"product-card\"]")"#));
        assert!(script.contains(r#"const fields = ["[data-testid=\"product-card-name\"]","h4"];"#));
    }
}
