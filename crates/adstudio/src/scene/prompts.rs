//! Prompt builders for the generation stages.

use crate::models::{AvatarProfile, Scene};

pub fn avatar_prompt(profile: &AvatarProfile) -> String {
    format!(
        "Photorealistic studio portrait of a {} presenter, age {}. {}. \
         Wearing {}. Medium shot with head and shoulders in frame, 85mm lens at f/2.8 \
         with shallow depth of field. Three-point studio lighting on a seamless white \
         backdrop. Confident, approachable expression with direct eye contact and \
         natural skin texture. Photograph only: no illustration, cartoon or 3D render.",
        profile.gender, profile.age_range, profile.visual_description, profile.attire
    )
}

/// `index` is one-based.
pub fn storyboard_prompt(scene: &Scene, index: usize, total: usize, aspect_ratio: &str) -> String {
    format!(
        "Photorealistic advertising still for scene {index} of a {total}-scene product \
         commercial. A {shot} at the peak of a {camera}. Setting: {background}, lit with \
         {lighting}.\n\n\
         The presenter is exactly the person in the first reference image, keeping face \
         shape, skin tone, eyes, hair and proportions unchanged. The presenter {action}, \
         expression conveying {emotion}.\n\n\
         The product is identical to the second reference image, keeping its colors, \
         logos, text and proportions. {integration}.\n\n\
         Cinema camera, 85mm lens, {aspect_ratio} frame, cinematic grading, subject and \
         product in sharp focus.",
        shot = scene.shot_type,
        camera = scene.camera_movement,
        background = scene.visual_background,
        lighting = scene.lighting,
        action = scene.avatar_action,
        emotion = scene.avatar_emotion,
        integration = scene.product_visual_integration,
    )
}

/// Motion-only prompt; the storyboard frame already fixes the composition.
pub fn video_prompt(scene: &Scene, profile: &AvatarProfile) -> String {
    format!(
        "The subject {action}, expression conveying {emotion}. {camera}. {integration}.\n\n\
         The subject speaks in a {voice} voice, saying: {dialogue}\n\n\
         {sound}. Smooth, natural motion with broadcast-quality cinematography.",
        action = scene.avatar_action,
        emotion = scene.avatar_emotion,
        camera = scene.camera_movement,
        integration = scene.product_visual_integration,
        voice = profile.tone_of_voice,
        dialogue = scene.script_dialogue,
        sound = scene.sound_design,
    )
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{AvatarProfile, Scene};

    pub fn profile() -> AvatarProfile {
        AvatarProfile {
            gender: "female".to_string(),
            age_range: "25-35".to_string(),
            attire: "a linen shirt".to_string(),
            tone_of_voice: "warm".to_string(),
            visual_description: "Short dark hair".to_string(),
        }
    }

    pub fn scene(scene_number: u32) -> Scene {
        Scene {
            scene_number,
            duration_seconds: 8,
            scene_type: "hook".to_string(),
            shot_type: "close-up".to_string(),
            camera_movement: "slow push-in".to_string(),
            lighting: "soft window light".to_string(),
            visual_background: "a sunlit kitchen".to_string(),
            avatar_action: "lifts the bottle".to_string(),
            avatar_emotion: "delight".to_string(),
            product_visual_integration: "Bottle held at chest height".to_string(),
            script_dialogue: "Hydration, upgraded.".to_string(),
            transition_to_next: "dissolve".to_string(),
            sound_design: "Gentle pour".to_string(),
            transition_type: "cut".to_string(),
            transition_duration: 0.5,
            audio_continuity: String::new(),
        }
    }
}
