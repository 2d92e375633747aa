use std::{collections::HashMap, fs::File, future::Future, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::MintPoolError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifierError {
    #[error("Social post lookup failed: {0}")]
    LookupFailed(String),
}

/// Looks up a user's recent posts and checks them for the required tags.
pub trait SocialPostVerifier: Send + Sync {
    /// True if at least one post by `handle` carries every tag in `tags`.
    fn check_hashtags_and_mentions(
        &self,
        handle: &str,
        tags: &[String],
    ) -> impl Future<Output = Result<bool, VerifierError>> + Send;
}

/// Case-insensitive "all required tags present" check for one post.
pub fn post_has_all_tags(post_tags: &[String], required: &[String]) -> bool {
    let post_tags: Vec<String> = post_tags.iter().map(|t| t.to_lowercase()).collect();
    required
        .iter()
        .all(|tag| post_tags.contains(&tag.to_lowercase()))
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

/// Verifier over posts whose tags were already extracted, keyed by handle.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPostVerifier {
    posts: HashMap<String, Vec<Vec<String>>>,
}

impl StaticPostVerifier {
    pub fn new_from_file(path: &Path) -> Result<Self, MintPoolError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let posts: HashMap<String, Vec<Vec<String>>> = serde_json::from_reader(reader)?;

        let mut verifier = Self::default();
        for (handle, handle_posts) in posts {
            for tags in handle_posts {
                verifier.add_post(&handle, tags);
            }
        }
        Ok(verifier)
    }

    pub fn add_post(&mut self, handle: &str, tags: Vec<String>) {
        self.posts
            .entry(normalize_handle(handle))
            .or_default()
            .push(tags);
    }
}

impl SocialPostVerifier for StaticPostVerifier {
    async fn check_hashtags_and_mentions(
        &self,
        handle: &str,
        tags: &[String],
    ) -> Result<bool, VerifierError> {
        let Some(posts) = self.posts.get(&normalize_handle(handle)) else {
            debug!("no posts known for {}", handle);
            return Ok(false);
        };
        Ok(posts.iter().any(|post| post_has_all_tags(post, tags)))
    }
}
