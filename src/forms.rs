use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::media::{self, ImageFormat};
use crate::storage::Storage;

/// Field name → message, rendered back into the form on failure.
pub type FormErrors = BTreeMap<String, String>;

pub const REQUIRED_MSG: &str = "This field is required.";
pub const UNKNOWN_GROUP_MSG: &str = "Select an existing group.";
pub const BAD_IMAGE_MSG: &str = "Upload a valid image.";

/// Raw post submission as bound from the request body. The optional image
/// travels as a base64 field; empty strings mean the field was left blank.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// A validated post ready to persist once the caller attaches the author.
#[derive(Debug)]
pub struct PostDraft {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<(Vec<u8>, ImageFormat)>,
}

impl PostForm {
    /// Checks the submission against the Post shape. Does not persist;
    /// group existence is the only storage read.
    pub async fn validate(&self, storage: &Storage) -> anyhow::Result<Result<PostDraft, FormErrors>> {
        let mut errors = FormErrors::new();

        let text = self.text.trim().to_string();
        if text.is_empty() {
            errors.insert("text".to_string(), REQUIRED_MSG.to_string());
        }

        let mut group_id = None;
        if let Some(slug) = self.group.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            match storage.get_group_by_slug(slug).await? {
                Some(group) => group_id = Some(group.id),
                None => {
                    errors.insert("group".to_string(), UNKNOWN_GROUP_MSG.to_string());
                }
            }
        }

        let mut image = None;
        if let Some(payload) = self.image.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            match BASE64.decode(payload) {
                Ok(bytes) => match media::sniff(&bytes) {
                    Some(format) => image = Some((bytes, format)),
                    None => {
                        errors.insert("image".to_string(), BAD_IMAGE_MSG.to_string());
                    }
                },
                Err(_) => {
                    errors.insert("image".to_string(), BAD_IMAGE_MSG.to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(Ok(PostDraft {
                text,
                group_id,
                image,
            }))
        } else {
            Ok(Err(errors))
        }
    }

    pub fn to_context(&self, errors: &FormErrors) -> Value {
        json!({
            "values": {
                "text": self.text,
                "group": self.group,
            },
            "errors": errors,
        })
    }

    pub fn empty_context() -> Value {
        json!({ "values": { "text": "", "group": null }, "errors": {} })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<String, FormErrors> {
        let text = self.text.trim().to_string();
        if text.is_empty() {
            let mut errors = FormErrors::new();
            errors.insert("text".to_string(), REQUIRED_MSG.to_string());
            return Err(errors);
        }
        Ok(text)
    }

    pub fn to_context(&self, errors: &FormErrors) -> Value {
        json!({
            "values": { "text": self.text },
            "errors": errors,
        })
    }

    pub fn empty_context() -> Value {
        json!({ "values": { "text": "" }, "errors": {} })
    }
}
