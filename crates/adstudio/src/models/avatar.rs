use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarVariant {
    pub index: u32,
    pub image_path: String,
}
