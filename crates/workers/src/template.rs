use std::collections::HashMap;
use std::sync::Mutex;

use minijinja::value::Value;
use minijinja::{context, Environment, ErrorKind};

use warden_common::records::SearchRule;

/// Renders action message templates. The environment keeps every template it
/// has compiled, keyed by source text, so a rule evaluated each tick pays the
/// parse cost once.
///
/// Templates see `object` (the rule record), `value` (the observation) and
/// `aggregations` (the raw aggregations subtree, or none). A `printf` filter
/// covers %-style formatting, e.g. `{{ value | printf("%.2f") }}`.
pub struct TemplateRenderer {
    inner: Mutex<Inner>,
}

struct Inner {
    env: Environment<'static>,
    names: HashMap<String, String>,
}

#[derive(Debug)]
pub enum TemplateError {
    Syntax(String),
    Render(String),
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax(e) => write!(f, "template syntax: {e}"),
            Self::Render(e) => write!(f, "template render: {e}"),
        }
    }
}

impl std::error::Error for TemplateError {}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        match err.kind() {
            ErrorKind::SyntaxError => Self::Syntax(err.to_string()),
            _ => Self::Render(err.to_string()),
        }
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_filter("printf", printf);
        Self {
            inner: Mutex::new(Inner {
                env,
                names: HashMap::new(),
            }),
        }
    }

    pub fn render(
        &self,
        source: &str,
        object: &SearchRule,
        value: f64,
        aggregations: Option<&serde_json::Value>,
    ) -> Result<String, TemplateError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let name = match inner.names.get(source) {
            Some(name) => name.clone(),
            None => {
                let name = format!("inline-{}", inner.names.len());
                inner
                    .env
                    .add_template_owned(name.clone(), source.to_string())?;
                inner.names.insert(source.to_string(), name.clone());
                name
            }
        };

        let template = inner.env.get_template(&name)?;
        let rendered = template.render(context! {
            object => object,
            value => value,
            aggregations => aggregations,
        })?;
        Ok(rendered)
    }
}

/// Minimal %-formatter: exactly one directive of `%s`, `%d`, `%f`, `%.<n>f`
/// or `%v`, plus `%%` escapes.
fn printf(value: Value, spec: String) -> Result<String, minijinja::Error> {
    let mut out = String::with_capacity(spec.len());
    let mut chars = spec.chars().peekable();
    let mut substituted = false;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        if substituted {
            return Err(minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("printf spec {spec:?} has more than one directive"),
            ));
        }

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                digits.push(chars.next().unwrap());
            }
            precision = digits.parse::<usize>().ok();
        }

        let verb = chars.next().ok_or_else(|| {
            minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("printf spec {spec:?} ends inside a directive"),
            )
        })?;

        out.push_str(&format_verb(&value, verb, precision, &spec)?);
        substituted = true;
    }

    if !substituted {
        return Err(minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("printf spec {spec:?} has no directive"),
        ));
    }
    Ok(out)
}

fn format_verb(
    value: &Value,
    verb: char,
    precision: Option<usize>,
    spec: &str,
) -> Result<String, minijinja::Error> {
    let bad_operand = |expected: &str| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("printf %{verb} expects {expected}, got {value}"),
        )
    };

    match verb {
        's' | 'v' => Ok(match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        }),
        'd' => i64::try_from(value.clone())
            .map(|n| n.to_string())
            .map_err(|_| bad_operand("an integer")),
        'f' => {
            let n = f64::try_from(value.clone()).map_err(|_| bad_operand("a number"))?;
            Ok(format!("{:.*}", precision.unwrap_or(6), n))
        }
        other => Err(minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("printf spec {spec:?} has unsupported verb %{other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::records::{
        ActionRef, ElasticsearchOptions, Metadata, NameRef, Operator, RuleCondition,
        SearchRuleSpec,
    };

    fn rule() -> SearchRule {
        SearchRule {
            metadata: Metadata {
                name: "high-errors".into(),
                namespace: "monitoring".into(),
                finalizers: Vec::new(),
            },
            spec: SearchRuleSpec {
                description: "too many 5xx".into(),
                query_connector_ref: NameRef { name: "es".into() },
                check_interval: "10s".into(),
                elasticsearch: ElasticsearchOptions {
                    index: "logs-*".into(),
                    query: None,
                    query_json: r#"{"query":{"match_all":{}}}"#.into(),
                    condition_field: "hits.total.value".into(),
                },
                condition: RuleCondition {
                    operator: Operator::GreaterThan,
                    threshold: "100".into(),
                    r#for: "30s".into(),
                },
                action_ref: ActionRef {
                    name: "notify-ops".into(),
                    data: String::new(),
                },
            },
        }
    }

    #[test]
    fn renders_object_fields_and_value() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render(
                "{{ object.metadata.name }}: {{ object.spec.description }} ({{ value }})",
                &rule(),
                150.0,
                None,
            )
            .unwrap();
        assert_eq!(out, "high-errors: too many 5xx (150.0)");
    }

    #[test]
    fn rendering_is_deterministic() {
        let renderer = TemplateRenderer::new();
        let source = "{% if value > 100 %}firing {{ value }}{% else %}ok{% endif %}";
        let first = renderer.render(source, &rule(), 150.0, None).unwrap();
        let second = renderer.render(source, &rule(), 150.0, None).unwrap();
        assert_eq!(first, "firing 150.0");
        assert_eq!(first, second);
    }

    #[test]
    fn conditionals_and_loops() {
        let renderer = TemplateRenderer::new();
        let aggs = serde_json::json!({
            "by_service": {
                "buckets": [
                    {"key": "api", "doc_count": 12},
                    {"key": "web", "doc_count": 3}
                ]
            }
        });
        let out = renderer
            .render(
                "{% for b in aggregations.by_service.buckets %}{{ b.key }}={{ b.doc_count }} {% endfor %}",
                &rule(),
                15.0,
                Some(&aggs),
            )
            .unwrap();
        assert_eq!(out, "api=12 web=3 ");
    }

    #[test]
    fn missing_aggregations_renders_as_none() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render(
                "{% if aggregations %}has{% else %}none{% endif %}",
                &rule(),
                1.0,
                None,
            )
            .unwrap();
        assert_eq!(out, "none");
    }

    #[test]
    fn printf_filter_formats_floats() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render("{{ value | printf(\"%.2f\") }}", &rule(), 150.456, None)
            .unwrap();
        assert_eq!(out, "150.46");
    }

    #[test]
    fn printf_filter_escapes_percent() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render("{{ value | printf(\"%.0f%%\") }}", &rule(), 93.0, None)
            .unwrap();
        assert_eq!(out, "93%");
    }

    #[test]
    fn syntax_error_is_reported() {
        let renderer = TemplateRenderer::new();
        let err = renderer
            .render("{% if %}", &rule(), 1.0, None)
            .unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
    }

    #[test]
    fn unknown_field_is_a_render_error() {
        let renderer = TemplateRenderer::new();
        // Calling into a missing map key is an invalid operation at render
        // time, not a parse failure.
        let err = renderer
            .render("{{ object.nope.deeper }}", &rule(), 1.0, None)
            .unwrap_err();
        assert!(matches!(err, TemplateError::Render(_)));
    }
}
