//! Template interpolation: `{{name}}` tokens resolved against a typed
//! variable context.
//!
//! Pure and synchronous, no I/O. Interpolation never fails -- callers
//! always get back a best-effort resolved string alongside diagnostics in
//! [`InterpolationResult`]. Missing required variables and undefined
//! tokens are reported in `errors` and left unresolved in the output so
//! the problem is visible in the prompt itself.

use crate::template::{VariableContext, VariableDefinition, VariableType};
use serde_json::Value;

/// Outcome of resolving one template against one context.
///
/// Derived, never stored; recomputed on every execution.
#[derive(Debug, Clone, Default)]
pub struct InterpolationResult {
    /// The template with every resolvable token substituted.
    pub resolved_prompt: String,
    /// Names of variables that were substituted (including defaults).
    pub used_variables: Vec<String>,
    /// Required variables absent from the context.
    pub missing_variables: Vec<String>,
    /// Fatal diagnostics. Non-empty means the prompt must not be executed.
    pub errors: Vec<String>,
    /// Non-fatal diagnostics (e.g. URL shape check failures).
    pub warnings: Vec<String>,
}

impl InterpolationResult {
    /// True when no fatal diagnostics were recorded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Nesting depth beyond which array/object rendering gives up.
const MAX_RENDER_DEPTH: usize = 64;

/// Resolve a template string against a variable context.
pub fn interpolate(template: &str, ctx: &VariableContext) -> InterpolationResult {
    let mut result = InterpolationResult::default();
    let tokens = scan_tokens(template);

    // Definition-driven pass: missing required variables are errors even
    // when the template never references them -- the authored contract is
    // the definition list, not the template text.
    for def in &ctx.definitions {
        if ctx.values.contains_key(&def.name) {
            continue;
        }
        if def.required {
            result.missing_variables.push(def.name.clone());
            result
                .errors
                .push(format!("Required variable '{}' is missing", def.name));
        }
    }

    // Token-driven pass: substitute back-to-front so byte offsets stay valid.
    let mut resolved = template.to_string();
    let mut substituted: Vec<String> = Vec::new();
    for token in tokens.iter().rev() {
        let Some(def) = ctx.definition(&token.name) else {
            // Leave the token literally in the output.
            if !result
                .errors
                .iter()
                .any(|e| e.contains(&format!("'{}'", token.name)))
            {
                result.errors.push(format!(
                    "Variable '{}' found in template but not defined",
                    token.name
                ));
            }
            continue;
        };

        let value = match ctx.values.get(&token.name) {
            Some(v) => v.clone(),
            None => match &def.default_value {
                Some(d) if !def.required => d.clone(),
                // Required-and-absent: already reported, token stays.
                _ => continue,
            },
        };

        let rendered = render_value(def, &value, &mut result.warnings);
        resolved.replace_range(token.start..token.end, &rendered);
        if !substituted.contains(&token.name) {
            substituted.push(token.name.clone());
        }
    }
    // Substitution walked backwards; report names in first-use order.
    for token in &tokens {
        if substituted.contains(&token.name) && !result.used_variables.contains(&token.name) {
            result.used_variables.push(token.name.clone());
        }
    }

    result.resolved_prompt = resolved;
    result
}

/// Return the ordered, de-duplicated list of well-formed token names.
///
/// Idempotent; used for authoring-time validation.
pub fn extract_variable_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    for token in scan_tokens(template) {
        if !names.contains(&token.name) {
            names.push(token.name);
        }
    }
    names
}

/// Static template lint: report tokens used in the template that have no
/// matching definition. Needs no value context.
pub fn validate_template(template: &str, defs: &[VariableDefinition]) -> Vec<String> {
    extract_variable_names(template)
        .into_iter()
        .filter(|name| !defs.iter().any(|d| &d.name == name))
        .map(|name| format!("Variable '{}' found in template but not defined", name))
        .collect()
}

/// A well-formed `{{name}}` span located in the template.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    name: String,
    /// Byte offset of the opening `{{`.
    start: usize,
    /// Byte offset one past the closing `}}`.
    end: usize,
}

/// Scan for well-formed, non-nested `{{name}}` spans.
///
/// A span is well-formed when the text between `{{` and the next `}}`
/// contains no brace and is non-empty after trimming. Malformed spans
/// (unbalanced braces, nested braces) are skipped and left untouched in
/// the output.
fn scan_tokens(template: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let bytes = template.as_bytes();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            let inner_start = i + 2;
            match template[inner_start..].find("}}") {
                Some(rel_close) => {
                    let inner = &template[inner_start..inner_start + rel_close];
                    let name = inner.trim();
                    if !name.is_empty() && !inner.contains('{') && !inner.contains('}') {
                        tokens.push(Token {
                            name: name.to_string(),
                            start: i,
                            end: inner_start + rel_close + 2,
                        });
                        i = inner_start + rel_close + 2;
                        continue;
                    }
                    // Malformed span: step past the opening braces only, so
                    // an inner `{{` can still start a valid token.
                    i += 1;
                }
                None => break,
            }
        } else {
            i += 1;
        }
    }

    tokens
}

/// Render a value according to its declared type.
fn render_value(def: &VariableDefinition, value: &Value, warnings: &mut Vec<String>) -> String {
    match def.var_type {
        VariableType::Boolean => match value {
            Value::Bool(b) => b.to_string(),
            other => other.to_string().trim_matches('"').to_string(),
        },
        VariableType::Number => match value {
            Value::Number(n) => n.to_string(),
            other => other.to_string().trim_matches('"').to_string(),
        },
        VariableType::Array | VariableType::Object | VariableType::Json => {
            if value_depth(value) > MAX_RENDER_DEPTH {
                warnings.push(format!(
                    "Variable '{}' exceeds maximum nesting depth, rendered as placeholder",
                    def.name
                ));
                return "[unrenderable value]".to_string();
            }
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "[unrenderable value]".into())
        }
        VariableType::Url => {
            let text = as_literal(value);
            if !looks_like_url(&text) {
                warnings.push(format!(
                    "Variable '{}' does not look like a URL: {}",
                    def.name, text
                ));
            }
            text
        }
        VariableType::String | VariableType::Text => as_literal(value),
    }
}

/// String values render without surrounding quotes; everything else falls
/// back to compact JSON.
fn as_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Basic URL shape check: a scheme separator, no whitespace, non-empty host.
fn looks_like_url(text: &str) -> bool {
    let Some((scheme, rest)) = text.split_once("://") else {
        return false;
    };
    !scheme.is_empty()
        && !rest.is_empty()
        && !text.chars().any(char::is_whitespace)
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

fn value_depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(value_depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(value_depth).max().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::VariableContext;
    use serde_json::json;

    fn string_def(name: &str, required: bool) -> VariableDefinition {
        VariableDefinition::new(name, VariableType::String, required)
    }

    #[test]
    fn test_hello_john() {
        let ctx = VariableContext::new(vec![string_def("name", true)]).insert("name", json!("John"));
        let result = interpolate("Hello {{name}}", &ctx);
        assert_eq!(result.resolved_prompt, "Hello John");
        assert!(result.errors.is_empty());
        assert_eq!(result.used_variables, vec!["name"]);
    }

    #[test]
    fn test_fully_defined_leaves_no_tokens() {
        let ctx = VariableContext::new(vec![
            string_def("a", true),
            string_def("b", true),
        ])
        .insert("a", json!("x"))
        .insert("b", json!("y"));
        let result = interpolate("{{a}} and {{b}} and {{a}}", &ctx);
        assert!(result.errors.is_empty());
        assert!(!result.resolved_prompt.contains("{{"));
        assert_eq!(result.resolved_prompt, "x and y and x");
    }

    #[test]
    fn test_missing_required_keeps_token_and_reports() {
        let ctx = VariableContext::new(vec![string_def("name", true)]);
        let result = interpolate("Hello {{name}}", &ctx);
        assert_eq!(result.resolved_prompt, "Hello {{name}}");
        assert_eq!(result.missing_variables, vec!["name"]);
        assert!(result
            .errors
            .iter()
            .any(|e| e == "Required variable 'name' is missing"));
    }

    #[test]
    fn test_missing_required_reported_even_when_unreferenced() {
        let ctx = VariableContext::new(vec![string_def("unused", true)]);
        let result = interpolate("no tokens here", &ctx);
        assert_eq!(result.missing_variables, vec!["unused"]);
        assert!(!result.is_ok());
    }

    #[test]
    fn test_optional_substitutes_default() {
        let def = string_def("tone", false).with_default(json!("neutral"));
        let ctx = VariableContext::new(vec![def]);
        let result = interpolate("Tone: {{tone}}", &ctx);
        assert_eq!(result.resolved_prompt, "Tone: neutral");
        assert!(result.errors.is_empty());
        assert_eq!(result.used_variables, vec!["tone"]);
    }

    #[test]
    fn test_undefined_token_left_literal() {
        let ctx = VariableContext::default();
        let result = interpolate("See {{mystery}}", &ctx);
        assert_eq!(result.resolved_prompt, "See {{mystery}}");
        assert!(result
            .errors
            .iter()
            .any(|e| e == "Variable 'mystery' found in template but not defined"));
    }

    #[test]
    fn test_boolean_and_number_rendering() {
        let ctx = VariableContext::new(vec![
            VariableDefinition::new("flag", VariableType::Boolean, true),
            VariableDefinition::new("count", VariableType::Number, true),
        ])
        .insert("flag", json!(true))
        .insert("count", json!(42.5));
        let result = interpolate("{{flag}} {{count}}", &ctx);
        assert_eq!(result.resolved_prompt, "true 42.5");
    }

    #[test]
    fn test_object_rendered_pretty() {
        let ctx = VariableContext::new(vec![VariableDefinition::new(
            "meta",
            VariableType::Object,
            true,
        )])
        .insert("meta", json!({"genre": "noir"}));
        let result = interpolate("{{meta}}", &ctx);
        assert!(result.resolved_prompt.contains("\"genre\": \"noir\""));
        assert!(result.resolved_prompt.contains('\n'));
    }

    #[test]
    fn test_bad_url_warns_but_resolves() {
        let ctx = VariableContext::new(vec![VariableDefinition::new(
            "link",
            VariableType::Url,
            true,
        )])
        .insert("link", json!("not a url"));
        let result = interpolate("Go to {{link}}", &ctx);
        assert_eq!(result.resolved_prompt, "Go to not a url");
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_good_url_no_warning() {
        let ctx = VariableContext::new(vec![VariableDefinition::new(
            "link",
            VariableType::Url,
            true,
        )])
        .insert("link", json!("https://example.com/path"));
        let result = interpolate("{{link}}", &ctx);
        assert!(result.warnings.is_empty());
        assert_eq!(result.resolved_prompt, "https://example.com/path");
    }

    #[test]
    fn test_malformed_spans_untouched() {
        let ctx = VariableContext::new(vec![string_def("a", true)]).insert("a", json!("ok"));
        // Unbalanced and brace-containing spans are not tokens.
        let result = interpolate("{{a}} {{bad {nest}} {{unclosed", &ctx);
        assert!(result.resolved_prompt.starts_with("ok "));
        assert!(result.resolved_prompt.contains("{{bad {nest}}"));
        assert!(result.resolved_prompt.contains("{{unclosed"));
    }

    #[test]
    fn test_extract_variable_names_ordered_deduped() {
        let names = extract_variable_names("{{b}} {{a}} {{b}} {{c}}");
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_extract_variable_names_idempotent() {
        let template = "{{x}} and {{ y }} and {{x}}";
        assert_eq!(
            extract_variable_names(template),
            extract_variable_names(template)
        );
        assert_eq!(extract_variable_names(template), vec!["x", "y"]);
    }

    #[test]
    fn test_validate_template_only_undefined_class() {
        let defs = vec![string_def("known", true)];
        let errors = validate_template("{{known}} {{unknown}}", &defs);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'unknown'"));
    }

    #[test]
    fn test_deep_nesting_renders_placeholder() {
        let mut value = json!(1);
        for _ in 0..80 {
            value = json!([value]);
        }
        let ctx = VariableContext::new(vec![VariableDefinition::new(
            "deep",
            VariableType::Array,
            true,
        )])
        .insert("deep", value);
        let result = interpolate("{{deep}}", &ctx);
        assert_eq!(result.resolved_prompt, "[unrenderable value]");
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_whitespace_inside_token_trimmed() {
        let ctx = VariableContext::new(vec![string_def("name", true)]).insert("name", json!("Ada"));
        let result = interpolate("Hi {{ name }}", &ctx);
        assert_eq!(result.resolved_prompt, "Hi Ada");
    }
}
