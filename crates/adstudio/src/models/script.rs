use serde::{Deserialize, Serialize};

/// Input for one advertisement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub product_name: String,
    pub specifications: String,
    pub image_url: String,
    #[serde(default = "default_scene_count")]
    pub scene_count: u32,
    #[serde(default = "default_ad_tone")]
    pub ad_tone: String,
    #[serde(default = "default_max_dialogue_words")]
    pub max_dialogue_words_per_scene: u32,
    #[serde(default)]
    pub custom_instructions: String,
}

fn default_scene_count() -> u32 {
    3
}

fn default_ad_tone() -> String {
    "energetic".to_string()
}

fn default_max_dialogue_words() -> u32 {
    25
}

impl ScriptRequest {
    pub fn new(product_name: &str, specifications: &str, image_url: &str) -> Self {
        Self {
            product_name: product_name.to_string(),
            specifications: specifications.to_string(),
            image_url: image_url.to_string(),
            scene_count: default_scene_count(),
            ad_tone: default_ad_tone(),
            max_dialogue_words_per_scene: default_max_dialogue_words(),
            custom_instructions: String::new(),
        }
    }

    /// Checks field ranges. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.product_name.trim().is_empty() {
            return Err("product_name must not be empty".to_string());
        }
        if !(2..=6).contains(&self.scene_count) {
            return Err(format!(
                "scene_count must be within 2-6, got {}",
                self.scene_count
            ));
        }
        if !(10..=50).contains(&self.max_dialogue_words_per_scene) {
            return Err(format!(
                "max_dialogue_words_per_scene must be within 10-50, got {}",
                self.max_dialogue_words_per_scene
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarProfile {
    pub gender: String,
    pub age_range: String,
    pub attire: String,
    pub tone_of_voice: String,
    pub visual_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    pub duration_seconds: u32,
    pub scene_type: String,
    pub shot_type: String,
    pub camera_movement: String,
    pub lighting: String,
    pub visual_background: String,
    pub avatar_action: String,
    pub avatar_emotion: String,
    pub product_visual_integration: String,
    pub script_dialogue: String,
    pub transition_to_next: String,
    pub sound_design: String,
    #[serde(default = "default_transition_type")]
    pub transition_type: String,
    /// Seconds, 0.0 to 2.0.
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,
    #[serde(default)]
    pub audio_continuity: String,
}

fn default_transition_type() -> String {
    "cut".to_string()
}

fn default_transition_duration() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoScript {
    pub video_title: String,
    #[serde(default = "default_total_duration")]
    pub total_duration: u32,
    pub avatar_profile: AvatarProfile,
    pub scenes: Vec<Scene>,
}

fn default_total_duration() -> u32 {
    30
}

impl VideoScript {
    /// Looks up a scene by its ordinal.
    pub fn scene(&self, scene_number: u32) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.scene_number == scene_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: ScriptRequest = serde_json::from_str(
            r#"{"product_name": "Lamp", "specifications": "LED", "image_url": "/img.png"}"#,
        )
        .unwrap();
        assert_eq!(req.scene_count, 3);
        assert_eq!(req.ad_tone, "energetic");
        assert_eq!(req.max_dialogue_words_per_scene, 25);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_scene_count_range() {
        let mut req = ScriptRequest::new("Lamp", "LED", "/img.png");
        req.scene_count = 7;
        assert!(req.validate().is_err());
        req.scene_count = 1;
        assert!(req.validate().is_err());
        req.scene_count = 6;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_scene_transition_defaults() {
        let scene: Scene = serde_json::from_value(serde_json::json!({
            "scene_number": 1,
            "duration_seconds": 8,
            "scene_type": "hook",
            "shot_type": "close-up",
            "camera_movement": "slow push-in",
            "lighting": "soft key",
            "visual_background": "kitchen",
            "avatar_action": "holds the lamp",
            "avatar_emotion": "curious",
            "product_visual_integration": "lamp in hand",
            "script_dialogue": "Meet the lamp.",
            "transition_to_next": "match cut",
            "sound_design": "ambient hum"
        }))
        .unwrap();
        assert_eq!(scene.transition_type, "cut");
        assert_eq!(scene.transition_duration, 0.5);
        assert!(scene.audio_continuity.is_empty());
    }
}
