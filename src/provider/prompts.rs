const DEFAULT_OBJECTS_PROMPT: &str = "List the main physical objects visible in this image. \
Respond with only a JSON array of short object names, for example [\"chair\",\"table\"].";

const DEFAULT_MATERIALS_TEMPLATE: &str = "For each of the following items visible in this image: {items}. \
Name the materials each item is made of. Respond with only a JSON array of objects, \
for example [{\"itemName\":\"chair\",\"materials\":[\"wood\",\"fabric\"]}].";

/// Prompt text sent with the two chat calls. Defaults are overridable via
/// `MATERIA_PROMPT_OBJECTS` / `MATERIA_PROMPT_MATERIALS`; the materials
/// template must keep the `{items}` placeholder.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    pub predict_objects: String,
    pub predict_materials_template: String,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self {
            predict_objects: String::from(DEFAULT_OBJECTS_PROMPT),
            predict_materials_template: String::from(DEFAULT_MATERIALS_TEMPLATE),
        }
    }
}

impl PromptCatalog {
    pub fn from_env() -> Self {
        let objects = std::env::var("MATERIA_PROMPT_OBJECTS").ok();
        let materials = std::env::var("MATERIA_PROMPT_MATERIALS").ok();
        select_prompts(objects.as_deref(), materials.as_deref())
    }

    pub fn render_materials_prompt(&self, items: &[String]) -> String {
        self.predict_materials_template
            .replace("{items}", items.join(", ").as_str())
    }
}

fn select_prompts(objects: Option<&str>, materials: Option<&str>) -> PromptCatalog {
    let defaults = PromptCatalog::default();
    PromptCatalog {
        predict_objects: objects
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or(defaults.predict_objects),
        predict_materials_template: materials
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or(defaults.predict_materials_template),
    }
}
