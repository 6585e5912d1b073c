use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{deserialize_id, Entity};

/// A blog article. `content` is markdown produced by the admin editor and is
/// passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    #[serde(
        default,
        alias = "_id",
        deserialize_with = "deserialize_id",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BlogPost {
    /// `excerpt`, or the first `max_chars` characters of the content.
    pub fn summary(&self, max_chars: usize) -> String {
        if let Some(excerpt) = self.excerpt.as_deref().filter(|text| !text.is_empty()) {
            return excerpt.to_string();
        }
        let mut summary: String = self.content.chars().take(max_chars).collect();
        if self.content.chars().count() > max_chars {
            summary.push('…');
        }
        summary
    }
}

impl Entity for BlogPost {
    const COLLECTION: &'static str = "/blogs/";
    const SLUG: &'static str = "blog";
    const LABEL: &'static str = "Blog post";

    fn id(&self) -> &str {
        &self.id
    }
}
