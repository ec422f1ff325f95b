use std::collections::HashMap;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::config::TourConfig;

pub struct EmbeddedFile {
    pub content: &'static str,
    pub content_type: &'static str,
}

/// Mount point of the embedded scripts under the static prefix.
pub const ASSET_SCOPE: &str = "ai-tour";

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    format!("{}.js", &format!("{:x}", result)[..12])
}

static SCRIPTS: &[(&str, &str)] = &[("tour-client.js", include_str!("./scripts/tour-client.js"))];

pub static EMBEDDED_FILES: Lazy<HashMap<String, EmbeddedFile>> = Lazy::new(|| {
    SCRIPTS
        .iter()
        .map(|&(_name, content)| {
            (
                hash_content(content),
                EmbeddedFile {
                    content,
                    content_type: "application/javascript",
                },
            )
        })
        .collect()
});

/// The tag a host page includes to take part in the tour. The file name
/// changes whenever the script does, so it can be cached forever.
pub fn get_script_tags(prefix: &str, tour: &TourConfig) -> String {
    SCRIPTS
        .iter()
        .map(|&(_name, content)| {
            format!(
                "<script defer src=\"{}/{}/{}\" data-tour-attribute=\"{}\"></script>\n",
                prefix.trim_end_matches('/'),
                ASSET_SCOPE,
                hash_content(content),
                tour.tour_attribute
            )
        })
        .collect()
}
