//! JEXL expression evaluation for expression converters and transformers.
//!
//! Wraps `jexl_eval::Evaluator` with pre-registered standard transforms.
//! Payloads and headers are always passed as context objects, never
//! interpolated into expression strings.

use serde_json::{Value, json};
use switchyard_types::MessagingError;

/// Evaluates an expression against a JSON context object.
pub trait ExpressionEvaluationService: Send + Sync {
    /// Fails with [`MessagingError::Expression`] on syntax or runtime errors.
    fn evaluate(&self, expression: &str, context: &Value) -> Result<Value, MessagingError>;
}

// ---------------------------------------------------------------------------
// JexlExpressionEvaluator
// ---------------------------------------------------------------------------

/// JEXL evaluator with string, boolean and length transforms registered.
///
/// Contexts built by the converters look like
/// `{ "payload": ..., "headers": {...}, "value": ... }`, so expressions read
/// e.g. `payload.amount * 2` or `value|upper`.
pub struct JexlExpressionEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl JexlExpressionEvaluator {
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("trim", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.trim()))
            })
            .with_transform("split", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
                let parts: Vec<&str> = s.split(delimiter).collect();
                Ok(json!(parts))
            })
            .with_transform("concat", |args: &[Value]| {
                let joined: String = args.iter().map(render).collect();
                Ok(json!(joined))
            })
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(!is_truthy(&val)))
            })
            .with_transform("contains", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let search = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.contains(search)))
            })
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.len(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            });

        Self { evaluator }
    }
}

impl ExpressionEvaluationService for JexlExpressionEvaluator {
    fn evaluate(&self, expression: &str, context: &Value) -> Result<Value, MessagingError> {
        if !context.is_object() {
            return Err(MessagingError::Expression(
                "context must be a JSON object".to_string(),
            ));
        }

        self.evaluator
            .eval_in_context(expression, context)
            .map_err(|e| MessagingError::Expression(format!("`{expression}`: {e}")))
    }
}

impl Default for JexlExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// String form used by `concat`: strings verbatim, null as empty.
fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
