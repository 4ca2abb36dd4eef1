//! Structured result registry
//!
//! Agents that answer with JSON declare a `type`. The registry decides which
//! types are recognised and how a recognised result is shown in the chat.

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::StructuredConfig;
use crate::domain::MessageId;

/// Options passed when rendering a structured result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Show the control that applies the result to the chart
    pub can_apply: bool,

    /// Message the result belongs to, for wiring the apply control
    pub message_id: Option<MessageId>,
}

/// Knows the structured result types and how to render them
pub trait ResultRegistry: Send + Sync {
    fn is_registered_result_type(&self, result_type: &str) -> bool;

    fn render_result(&self, data: &Value, options: &ApplyOptions) -> String;
}

const RESULT_TEMPLATE_NAME: &str = "result";

const RESULT_TEMPLATE: &str = r#"<div class="structured-result" data-type="{{result_type}}"{{#if message_id}} data-message-id="{{message_id}}"{{/if}}><pre><code class="language-json">{{json}}</code></pre>{{#if can_apply}}<button class="apply-result" type="button">Apply</button>{{else}}<span class="result-applied">Applied</span>{{/if}}</div>"#;

#[derive(Serialize)]
struct ResultContext<'a> {
    result_type: &'a str,
    message_id: Option<&'a str>,
    json: String,
    can_apply: bool,
}

/// Registry of type names that renders each result as a JSON summary block
#[derive(Debug, Clone)]
pub struct StructuredTypes {
    types: Vec<String>,
    templates: Handlebars<'static>,
}

impl StructuredTypes {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: Vec<String> = types.into_iter().map(Into::into).collect();
        debug!(?types, "StructuredTypes::new: called");
        let mut templates = Handlebars::new();
        // Compile-time constant template, known to parse
        let _ = templates.register_template_string(RESULT_TEMPLATE_NAME, RESULT_TEMPLATE);
        Self { types, templates }
    }

    pub fn from_config(config: &StructuredConfig) -> Self {
        Self::new(config.types.iter().cloned())
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }
}

impl Default for StructuredTypes {
    fn default() -> Self {
        Self::from_config(&StructuredConfig::default())
    }
}

impl ResultRegistry for StructuredTypes {
    fn is_registered_result_type(&self, result_type: &str) -> bool {
        self.types.iter().any(|t| t == result_type)
    }

    fn render_result(&self, data: &Value, options: &ApplyOptions) -> String {
        let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        let ctx = ResultContext {
            result_type: data.get("type").and_then(Value::as_str).unwrap_or("unknown"),
            message_id: options.message_id.as_ref().map(MessageId::as_str),
            json,
            can_apply: options.can_apply,
        };
        match self.templates.render(RESULT_TEMPLATE_NAME, &ctx) {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "Result template failed, rendering raw JSON");
                format!("<pre>{}</pre>", handlebars::html_escape(&ctx.json))
            }
        }
    }
}
