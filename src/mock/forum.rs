//! In-memory forum

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::failure::{FailureConfig, FailureInjector, Op};
use super::lock;
use crate::clients::{ClientError, Comment, ForumClient, PostRef, PostSnapshot};

/// A post held by [`MockForum`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPost {
    pub subreddit: String,
    pub title: String,
    pub body: String,
    pub removed: bool,
    pub comments: Vec<Comment>,
    /// Number of edits since submission
    pub edits: u32,
}

#[derive(Debug, Default)]
struct ForumState {
    posts: BTreeMap<String, MockPost>,
    next_id: u64,
}

/// Forum backed by memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockForum {
    state: Arc<Mutex<ForumState>>,
    failures: Arc<Mutex<FailureInjector>>,
}

impl MockForum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live post that was created outside this forum instance.
    pub fn seed_post(&self, id: &str, body: &str) {
        lock(&self.state).posts.insert(
            id.to_string(),
            MockPost {
                subreddit: String::new(),
                title: String::new(),
                body: body.to_string(),
                removed: false,
                comments: Vec::new(),
                edits: 0,
            },
        );
    }

    /// Simulate moderator removal.
    pub fn remove_post(&self, id: &str) {
        if let Some(post) = lock(&self.state).posts.get_mut(id) {
            post.removed = true;
        }
    }

    /// Simulate the author deleting the post.
    pub fn delete_post(&self, id: &str) {
        lock(&self.state).posts.remove(id);
    }

    pub fn add_comment(&self, post_id: &str, author: &str, body: &str) {
        let mut state = lock(&self.state);
        if let Some(post) = state.posts.get_mut(post_id) {
            let id = format!("c{}", post.comments.len() + 1);
            post.comments.push(Comment {
                id,
                author: author.to_string(),
                body: body.to_string(),
            });
        }
    }

    pub fn post(&self, id: &str) -> Option<MockPost> {
        lock(&self.state).posts.get(id).cloned()
    }

    pub fn post_count(&self) -> usize {
        lock(&self.state).posts.len()
    }

    pub fn inject_failure(&self, op: Op, config: FailureConfig) {
        lock(&self.failures).inject(op, config);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    pub fn calls(&self, op: Op) -> u32 {
        lock(&self.failures).calls(op)
    }

    fn check(&self, op: Op) -> Result<(), ClientError> {
        match lock(&self.failures).check(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ForumClient for MockForum {
    fn submit_post(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
    ) -> Result<PostRef, ClientError> {
        self.check(Op::SubmitPost)?;
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = format!("p{}", state.next_id);
        state.posts.insert(
            id.clone(),
            MockPost {
                subreddit: subreddit.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                removed: false,
                comments: Vec::new(),
                edits: 0,
            },
        );
        Ok(PostRef {
            url: format!("https://www.reddit.com/r/{}/comments/{}/", subreddit, id),
            id,
        })
    }

    fn edit_post(&self, post_id: &str, body: &str) -> Result<(), ClientError> {
        self.check(Op::EditPost)?;
        match lock(&self.state).posts.get_mut(post_id) {
            Some(post) => {
                post.body = body.to_string();
                post.edits += 1;
                Ok(())
            }
            None => Err(ClientError::NotFound(format!("post {}", post_id))),
        }
    }

    fn get_post(&self, post_id: &str) -> Result<PostSnapshot, ClientError> {
        self.check(Op::GetPost)?;
        Ok(match lock(&self.state).posts.get(post_id) {
            Some(post) => PostSnapshot {
                exists: true,
                removed: post.removed,
                body: post.body.clone(),
            },
            None => PostSnapshot::missing(),
        })
    }

    fn get_comments(&self, post_id: &str) -> Result<Vec<Comment>, ClientError> {
        self.check(Op::GetComments)?;
        lock(&self.state)
            .posts
            .get(post_id)
            .map(|p| p.comments.clone())
            .ok_or_else(|| ClientError::NotFound(format!("post {}", post_id)))
    }
}
