//! Prompt definition loading.
//!
//! The grounded-answer prompt ships built in. A workspace can override it (or
//! add new ones) with `.finrag/prompts/<id>.yml`.

use std::path::{Path, PathBuf};

use finrag_core::config::WORKSPACE_DIR;
use finrag_core::{AppError, AppResult};

use crate::types::PromptDefinition;

/// Identifier of the built-in grounded answer prompt.
pub const DEFAULT_PROMPT_ID: &str = "answer.grounded";

const DEFAULT_RULES: &str = "You are a financial document assistant. \
Use ONLY the provided context and macro indicators to answer. \
If the context is insufficient to answer, reply exactly: \"Insufficient context.\" \
Never invent facts or figures. \
Cite filing excerpts with their markers like [1], [2] and macro indicators with markers like [M1]. \
Only use markers that appear in the context. \
Follow the requested output formatting strictly.";

const DEFAULT_TEMPLATE: &str = "{{rules}}\n\n\
Formatting requirements: {{formatting}}\n\n\
Question:\n{{question}}\n\n\
{{#if facts}}Macro indicators:\n{{facts}}\n\n{{/if}}\
{{#if context}}Context:\n{{context}}\n\n{{/if}}\
Answer:";

/// The prompt used when the workspace does not override it.
pub fn builtin_prompt() -> PromptDefinition {
    PromptDefinition {
        id: DEFAULT_PROMPT_ID.to_string(),
        title: "Grounded answer with citations".to_string(),
        api_version: "1.0".to_string(),
        created_by: "finrag".to_string(),
        rules: DEFAULT_RULES.to_string(),
        template: DEFAULT_TEMPLATE.to_string(),
    }
}

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(WORKSPACE_DIR).join("prompts")
}

/// Load a prompt definition by ID from `.finrag/prompts/<id>.yml`.
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));
    tracing::debug!(path = ?prompt_file, "Loading prompt");

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;
    tracing::info!(id = %definition.id, title = %definition.title, "Loaded prompt");

    Ok(definition)
}

/// The workspace override for `prompt_id` if present, else the built-in
/// prompt when `prompt_id` names it.
pub fn resolve_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let override_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));
    if override_file.exists() {
        return load_prompt(workspace_path, prompt_id);
    }
    if prompt_id == DEFAULT_PROMPT_ID {
        return Ok(builtin_prompt());
    }
    Err(AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))
}

/// List prompt IDs defined in the workspace, sorted.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids: Vec<String> = walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("yml"))
        .filter_map(|e| e.path().file_stem().and_then(|s| s.to_str()).map(String::from))
        .collect();
    prompt_ids.sort();

    Ok(prompt_ids)
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }
    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }
    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }
    if !def.template.contains("{{question}}") {
        return Err(AppError::Prompt(format!(
            "Prompt {} template must reference {{{{question}}}}",
            def.id
        )));
    }
    if !def.template.contains("{{context}}") {
        return Err(AppError::Prompt(format!(
            "Prompt {} template must reference {{{{context}}}}",
            def.id
        )));
    }
    if !def.template.contains("{{facts}}") {
        return Err(AppError::Prompt(format!(
            "Prompt {} template must reference {{{{facts}}}}",
            def.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, template: &str) {
        let prompts = prompts_dir(dir);
        fs::create_dir_all(&prompts).unwrap();
        let content = format!(
            "id: {}\ntitle: \"Custom\"\napiVersion: \"1.0\"\nrules: \"Only cite context.\"\ntemplate: \"{}\"\n",
            id, template
        );
        fs::write(prompts.join(format!("{}.yml", id)), content).unwrap();
    }

    #[test]
    fn test_builtin_prompt_is_valid() {
        assert!(validate_prompt(&builtin_prompt()).is_ok());
    }

    #[test]
    fn test_resolve_falls_back_to_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let def = resolve_prompt(temp_dir.path(), DEFAULT_PROMPT_ID).unwrap();
        assert_eq!(def.id, DEFAULT_PROMPT_ID);
        assert!(def.rules.contains("Insufficient context."));
    }

    #[test]
    fn test_workspace_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            DEFAULT_PROMPT_ID,
            "{{rules}} Q: {{question}} F: {{facts}} C: {{context}}",
        );

        let def = resolve_prompt(temp_dir.path(), DEFAULT_PROMPT_ID).unwrap();
        assert_eq!(def.title, "Custom");
    }

    #[test]
    fn test_template_without_context_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "broken", "Q: {{question}}");
        assert!(load_prompt(temp_dir.path(), "broken").is_err());
    }

    #[test]
    fn test_template_without_facts_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "custom", "{{rules}} Q: {{question}} C: {{context}}");

        let err = resolve_prompt(temp_dir.path(), "custom").unwrap_err();
        assert!(matches!(err, AppError::Prompt(_)));
        assert!(err.to_string().contains("{{facts}}"));
    }

    #[test]
    fn test_unknown_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(resolve_prompt(temp_dir.path(), "nope").is_err());
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "b.prompt", "{{question}} {{facts}} {{context}}");
        write_prompt(temp_dir.path(), "a.prompt", "{{question}} {{facts}} {{context}}");

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts, vec!["a.prompt".to_string(), "b.prompt".to_string()]);
    }
}
