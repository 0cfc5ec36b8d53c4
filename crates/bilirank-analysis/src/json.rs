/// Strips markdown code fences and surrounding prose from a model reply so
/// the JSON object inside can be parsed.
#[must_use]
pub fn clean_json_response(response: &str) -> &str {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text = text.trim();

    // Prose may lead or trail the object; keep the outermost braces.
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            return &text[start..=end];
        }
    }
    text
}
