//! Tool definitions for LLM function calling

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Definition of a tool that can be called by the LLM
///
/// The canonical layer only knows function-type tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Always `"function"`
    #[serde(rename = "type")]
    pub kind: String,

    /// The callable function
    pub function: FunctionDefinition,
}

/// Function payload of a tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name (should be unique)
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for parameters, always a `type: object` schema
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a function tool definition
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// An external skill descriptor convertible into a tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Skill ID, becomes the function name
    pub id: String,

    /// Description shown to the model
    pub description: String,

    /// Parameter name → descriptor
    #[serde(default)]
    pub parameters: BTreeMap<String, SkillParameter>,
}

/// One skill parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillParameter {
    /// JSON type ("string", "number", "integer", "boolean", ...)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Whether the parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Allowed values
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl Skill {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, param: SkillParameter) -> Self {
        self.parameters.insert(name.into(), param);
        self
    }

    /// Build the JSON-schema object for this skill's parameters
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, param) in &self.parameters {
            let mut schema = Map::new();
            schema.insert("type".to_string(), json!(param.param_type));
            if !param.description.is_empty() {
                schema.insert("description".to_string(), json!(param.description));
            }
            if let Some(default) = &param.default {
                schema.insert("default".to_string(), default.clone());
            }
            if let Some(values) = &param.enum_values {
                schema.insert("enum".to_string(), json!(values));
            }
            properties.insert(name.clone(), Value::Object(schema));

            if param.required {
                required.push(name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl SkillParameter {
    pub fn string(description: impl Into<String>, required: bool) -> Self {
        Self {
            param_type: "string".to_string(),
            description: description.into(),
            required,
            default: None,
            enum_values: None,
        }
    }

    pub fn number(description: impl Into<String>, required: bool) -> Self {
        Self {
            param_type: "number".to_string(),
            description: description.into(),
            required,
            default: None,
            enum_values: None,
        }
    }

    pub fn enumeration(
        description: impl Into<String>,
        values: Vec<&str>,
        required: bool,
    ) -> Self {
        Self {
            param_type: "string".to_string(),
            description: description.into(),
            required,
            default: None,
            enum_values: Some(values.into_iter().map(String::from).collect()),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_type_is_fixed() {
        let tool = ToolDefinition::function("calc", "adds numbers", json!({"type": "object"}));
        assert_eq!(tool.kind, "function");
        assert_eq!(tool.name(), "calc");
    }

    #[test]
    fn test_skill_schema() {
        let skill = Skill::new("fetch_ticker", "Fetch the latest ticker")
            .with_param("symbol", SkillParameter::string("Trading pair", true))
            .with_param(
                "interval",
                SkillParameter::enumeration("Candle interval", vec!["1m", "5m", "1h"], false)
                    .with_default(json!("1m")),
            );

        let schema = skill.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["symbol"]["type"], "string");
        assert_eq!(schema["properties"]["interval"]["enum"][1], "5m");
        assert_eq!(schema["properties"]["interval"]["default"], "1m");
        assert_eq!(schema["required"], json!(["symbol"]));
    }

    #[test]
    fn test_required_references_existing_properties() {
        let skill = Skill::new("s", "d")
            .with_param("a", SkillParameter::string("", true))
            .with_param("b", SkillParameter::string("", false));
        let schema = skill.parameters_schema();

        let required: Vec<String> =
            serde_json::from_value(schema["required"].clone()).unwrap();
        for name in &required {
            assert!(schema["properties"].get(name).is_some());
        }
    }
}
