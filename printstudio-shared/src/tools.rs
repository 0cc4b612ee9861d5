/// Catalog of live tools
///
/// A tool binds a public name to one provider model, one quota counter and
/// the form fields the upload endpoint expects. The catalog is static; adding
/// a tool means adding an entry to [`TOOLS`].
///
/// Tools with object-shaped provider output list the keys to look under, in
/// priority order, in `output_keys`.

use crate::models::plan::QuotaType;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Inference backend a tool runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Replicate-style asynchronous predictions
    Replicate,

    /// OpenAI image edits (synchronous)
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Replicate => "replicate",
            ProviderKind::OpenAi => "openai",
        }
    }
}

/// Static description of one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub category: &'static str,
    pub quota_type: QuotaType,
    pub provider: ProviderKind,

    /// Provider model identifier
    pub model: &'static str,

    /// Provider input field that receives the uploaded image
    pub image_field: &'static str,

    /// Form fields that must be present and non-empty
    pub required_fields: &'static [&'static str],

    /// Form fields passed through when present
    pub optional_fields: &'static [&'static str],

    /// Prompt sent to the model; `{field}` placeholders are filled from the form
    #[serde(skip)]
    pub prompt_template: Option<&'static str>,

    /// Poll budget in poll-interval units
    pub max_polls: u32,

    /// Keys tried, in order, when the provider returns an object
    pub output_keys: &'static [&'static str],
}

/// Error building provider input from form fields
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolInputError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// Upper bound for any free-text form field
pub const MAX_FIELD_CHARS: usize = 1_000;

/// All live tools
pub static TOOLS: &[ToolDefinition] = &[
    ToolDefinition {
        name: "background-removal",
        category: "image-editing",
        quota_type: QuotaType::Images,
        provider: ProviderKind::Replicate,
        model: "lucataco/remove-bg",
        image_field: "image",
        required_fields: &[],
        optional_fields: &[],
        prompt_template: None,
        max_polls: 30,
        output_keys: &["image", "output"],
    },
    ToolDefinition {
        name: "color-change",
        category: "image-editing",
        quota_type: QuotaType::Images,
        provider: ProviderKind::Replicate,
        model: "black-forest-labs/flux-kontext-pro",
        image_field: "input_image",
        required_fields: &["color"],
        optional_fields: &[],
        prompt_template: Some(
            "Change the color of the 3D printed object to {color}. Keep the shape, lighting and background unchanged.",
        ),
        max_polls: 60,
        output_keys: &["image", "output"],
    },
    ToolDefinition {
        name: "texture-change",
        category: "image-editing",
        quota_type: QuotaType::Images,
        provider: ProviderKind::Replicate,
        model: "black-forest-labs/flux-kontext-pro",
        image_field: "input_image",
        required_fields: &["texture"],
        optional_fields: &[],
        prompt_template: Some(
            "Give the surface of the 3D printed object a {texture} texture. Keep the shape and background unchanged.",
        ),
        max_polls: 60,
        output_keys: &["image", "output"],
    },
    ToolDefinition {
        name: "scene-generation",
        category: "scenes",
        quota_type: QuotaType::Scenes,
        provider: ProviderKind::Replicate,
        model: "black-forest-labs/flux-kontext-pro",
        image_field: "input_image",
        required_fields: &["description"],
        optional_fields: &["aspect_ratio"],
        prompt_template: Some(
            "Place this product in the following scene: {description}. Photorealistic product photography.",
        ),
        max_polls: 90,
        output_keys: &["image", "output"],
    },
    ToolDefinition {
        name: "image-to-3d",
        category: "3d-models",
        quota_type: QuotaType::Models3d,
        provider: ProviderKind::Replicate,
        model: "ndreca/hunyuan3d-2",
        image_field: "image",
        required_fields: &[],
        optional_fields: &["seed"],
        prompt_template: None,
        max_polls: 120,
        output_keys: &["model_file", "glb", "output_model", "mesh"],
    },
    ToolDefinition {
        name: "prompt-edit",
        category: "image-editing",
        quota_type: QuotaType::Images,
        provider: ProviderKind::OpenAi,
        model: "gpt-image-1",
        image_field: "image",
        required_fields: &["prompt"],
        optional_fields: &["size"],
        prompt_template: None,
        max_polls: 30,
        output_keys: &["image"],
    },
];

/// Looks up a tool by name
pub fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    TOOLS.iter().find(|tool| tool.name == name)
}

impl ToolDefinition {
    /// Builds provider input parameters from submitted form fields
    ///
    /// Required fields must be present and non-blank; optional fields are
    /// copied when present; everything else is ignored. When the tool has a
    /// prompt template the filled template is added as `prompt`.
    pub fn build_params(
        &self,
        fields: &HashMap<String, String>,
    ) -> Result<BTreeMap<String, String>, ToolInputError> {
        let mut params = BTreeMap::new();

        for &field in self.required_fields {
            let value = fields
                .get(field)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or(ToolInputError::MissingField(field))?;
            check_length(field, value)?;
            params.insert(field.to_string(), value.to_string());
        }

        for &field in self.optional_fields {
            if let Some(value) = fields.get(field).map(|v| v.trim()).filter(|v| !v.is_empty()) {
                check_length(field, value)?;
                params.insert(field.to_string(), value.to_string());
            }
        }

        if let Some(template) = self.prompt_template {
            let mut prompt = template.to_string();
            for (key, value) in &params {
                prompt = prompt.replace(&format!("{{{}}}", key), value);
            }
            params.insert("prompt".to_string(), prompt);
        }

        Ok(params)
    }
}

fn check_length(field: &'static str, value: &str) -> Result<(), ToolInputError> {
    if value.chars().count() > MAX_FIELD_CHARS {
        return Err(ToolInputError::TooLong {
            field,
            max: MAX_FIELD_CHARS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_tool_names_unique() {
        for (i, tool) in TOOLS.iter().enumerate() {
            assert!(
                TOOLS.iter().skip(i + 1).all(|other| other.name != tool.name),
                "duplicate tool {}",
                tool.name
            );
        }
    }

    #[test]
    fn test_find_tool() {
        let tool = find_tool("image-to-3d").unwrap();
        assert_eq!(tool.quota_type, QuotaType::Models3d);
        assert_eq!(tool.max_polls, 120);
        assert_eq!(tool.output_keys[0], "model_file");

        assert!(find_tool("teleport").is_none());
    }

    #[test]
    fn test_poll_budgets_within_bounds() {
        for tool in TOOLS {
            assert!((30..=120).contains(&tool.max_polls), "{}", tool.name);
            assert!(!tool.output_keys.is_empty(), "{}", tool.name);
        }
    }

    #[test]
    fn test_build_params_fills_prompt() {
        let tool = find_tool("color-change").unwrap();
        let params = tool.build_params(&fields(&[("color", " matte red "), ("junk", "x")])).unwrap();

        assert_eq!(params.get("color").map(String::as_str), Some("matte red"));
        assert!(params["prompt"].contains("to matte red."));
        assert!(!params.contains_key("junk"));
    }

    #[test]
    fn test_build_params_missing_required() {
        let tool = find_tool("texture-change").unwrap();
        let err = tool.build_params(&fields(&[("texture", "   ")])).unwrap_err();
        assert_eq!(err, ToolInputError::MissingField("texture"));
    }

    #[test]
    fn test_build_params_optional_passthrough() {
        let tool = find_tool("scene-generation").unwrap();
        let params = tool
            .build_params(&fields(&[("description", "a wooden desk"), ("aspect_ratio", "16:9")]))
            .unwrap();
        assert_eq!(params["aspect_ratio"], "16:9");
        assert!(params["prompt"].contains("a wooden desk"));
    }

    #[test]
    fn test_build_params_too_long() {
        let tool = find_tool("prompt-edit").unwrap();
        let long = "a".repeat(MAX_FIELD_CHARS + 1);
        let err = tool.build_params(&fields(&[("prompt", &long)])).unwrap_err();
        assert!(matches!(err, ToolInputError::TooLong { field: "prompt", .. }));
    }

    #[test]
    fn test_tool_without_template_has_no_prompt() {
        let tool = find_tool("background-removal").unwrap();
        let params = tool.build_params(&HashMap::new()).unwrap();
        assert!(params.is_empty());
    }
}
