// src/workflow/config.rs
//! Theme, prompt and bumper definitions for the retro games workflow.
//!
//! Built once at start-up and shared read-only (`Arc<RetroGameConfig>`)
//! by every run.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{error, info};

pub const EIGHT_BIT_PROMPT: &str = "8bit_generation";
pub const CHARACTER_SHEET_PROMPT: &str = "character_sheet";
pub const SCENE_DIRECTION_PROMPT: &str = "scene_direction";

const DEFAULT_EIGHT_BIT_TEMPLATE: &str = "Transform the person in this photo into a retro 8-bit pixel-art \
video game character. {theme_prompt} Keep the likeness recognisable, use a limited colour palette and \
place the character on a plain background.";

const DEFAULT_CHARACTER_SHEET_TEMPLATE: &str = "Create a retro video game character sheet for this 8-bit \
character in the same pixel-art style, showing front, back and side views plus walking, jumping and \
attacking poses on a plain background.";

const DEFAULT_SCENE_DIRECTION_TEMPLATE: &str = "Write a scene direction for a {duration} second retro \
8-bit video game clip featuring {characters}, told in {scene_count} scene(s).{theme_context} Describe \
the action, the camera and the game's logo appearing on screen. Return only the direction.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeConfig {
    pub name: String,
    pub prompt: String,
    pub logo_uri: Option<String>,
    pub logo_8bit_uri: Option<String>,
}

#[derive(Deserialize)]
struct ThemeEntry {
    prompt: String,
    logo_uri: Option<String>,
    logo_8bit_uri: Option<String>,
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    themes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    bumper_videos: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RetroGameConfig {
    themes: Vec<ThemeConfig>,
    bumper_videos: Vec<String>,
    prompts: HashMap<String, String>,
}

impl RetroGameConfig {
    /// Loads both files. A file that cannot be read or parsed is logged and
    /// treated as empty, so this never fails.
    pub fn load(config_path: impl AsRef<Path>, prompts_path: impl AsRef<Path>) -> Self {
        let config_path = config_path.as_ref();
        let prompts_path = prompts_path.as_ref();

        let (themes, bumper_videos) = match read_json(config_path).and_then(|raw| parse_config(&raw)) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(path = %config_path.display(), "Error loading config: {}", e);
                (Vec::new(), Vec::new())
            }
        };

        let prompts = match read_json(prompts_path).and_then(|raw| parse_prompts(&raw)) {
            Ok(prompts) => prompts,
            Err(e) => {
                error!(path = %prompts_path.display(), "Error loading prompts: {}", e);
                HashMap::new()
            }
        };

        info!(
            themes = themes.len(),
            bumpers = bumper_videos.len(),
            prompts = prompts.len(),
            "Retro games config loaded"
        );
        Self {
            themes,
            bumper_videos,
            prompts,
        }
    }

    pub fn from_json_str(config_json: &str, prompts_json: &str) -> Result<Self, String> {
        let (themes, bumper_videos) = parse_config(config_json)?;
        let prompts = parse_prompts(prompts_json)?;
        Ok(Self {
            themes,
            bumper_videos,
            prompts,
        })
    }

    /// Theme names in config-file order.
    pub fn get_theme_names(&self) -> Vec<String> {
        self.themes.iter().map(|t| t.name.clone()).collect()
    }

    pub fn themes(&self) -> &[ThemeConfig] {
        &self.themes
    }

    pub fn get_theme_config(&self, theme_name: &str) -> Option<&ThemeConfig> {
        self.themes.iter().find(|t| t.name == theme_name)
    }

    pub fn get_theme_prompt(&self, theme_name: &str) -> Option<&str> {
        self.get_theme_config(theme_name)
            .map(|t| t.prompt.as_str())
            .filter(|p| !p.is_empty())
    }

    pub fn get_theme_logo(&self, theme_name: &str) -> Option<&str> {
        self.get_theme_config(theme_name).and_then(|t| t.logo_uri.as_deref())
    }

    pub fn get_theme_8bit_logo(&self, theme_name: &str) -> Option<&str> {
        self.get_theme_config(theme_name).and_then(|t| t.logo_8bit_uri.as_deref())
    }

    /// Named prompt template, falling back to the built-in wording.
    pub fn get_prompt(&self, key: &str) -> &str {
        if let Some(template) = self.prompts.get(key).filter(|t| !t.is_empty()) {
            return template;
        }
        match key {
            EIGHT_BIT_PROMPT => DEFAULT_EIGHT_BIT_TEMPLATE,
            CHARACTER_SHEET_PROMPT => DEFAULT_CHARACTER_SHEET_TEMPLATE,
            SCENE_DIRECTION_PROMPT => DEFAULT_SCENE_DIRECTION_TEMPLATE,
            _ => "",
        }
    }

    pub fn get_random_bumper(&self) -> Option<&str> {
        self.bumper_videos
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}

fn read_json(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| e.to_string())
}

fn parse_config(raw: &str) -> Result<(Vec<ThemeConfig>, Vec<String>), String> {
    let file: ConfigFile = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let mut themes = Vec::with_capacity(file.themes.len());
    for (name, value) in file.themes {
        let entry: ThemeEntry =
            serde_json::from_value(value).map_err(|e| format!("theme '{}': {}", name, e))?;
        themes.push(ThemeConfig {
            name,
            prompt: entry.prompt,
            logo_uri: entry.logo_uri,
            logo_8bit_uri: entry.logo_8bit_uri,
        });
    }
    Ok((themes, file.bumper_videos))
}

fn parse_prompts(raw: &str) -> Result<HashMap<String, String>, String> {
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

/// Fills `{name}` placeholders. Unknown placeholders are left as they are.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}
