//! Reader engagement: comments, likes and reading history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const COMMENT_MIN_LENGTH: usize = 5;
pub const COMMENT_MAX_LENGTH: usize = 5000;

/// Comment on an article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub article_id: i64,
    pub author_id: i64,
    pub author_username: String,
    /// Parent comment for replies
    pub parent_id: Option<i64>,
    pub content: String,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Top-level comment with its replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

/// Input for creating a comment
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

impl CreateCommentInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            parent_id: None,
        }
    }

    pub fn reply_to(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Group a flat, oldest-first comment list into threads. Replies whose parent
/// is missing from the list are dropped.
pub fn build_threads(comments: Vec<Comment>) -> Vec<CommentThread> {
    let (roots, replies): (Vec<Comment>, Vec<Comment>) =
        comments.into_iter().partition(|c| c.parent_id.is_none());

    let mut threads: Vec<CommentThread> = roots
        .into_iter()
        .map(|comment| CommentThread {
            comment,
            replies: Vec::new(),
        })
        .collect();

    for reply in replies {
        if let Some(thread) = threads
            .iter_mut()
            .find(|t| Some(t.comment.id) == reply.parent_id)
        {
            thread.replies.push(reply);
        }
    }

    threads
}

/// Result of toggling a like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeResult {
    pub liked: bool,
    pub like_count: i64,
}

/// A reader's visit to an article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingHistoryEntry {
    pub user_id: i64,
    pub article_id: i64,
    pub article_title: String,
    pub article_slug: String,
    pub read_at: DateTime<Utc>,
    /// Seconds spent reading
    pub read_duration: i64,
    /// 0.0 ..= 100.0
    pub read_percentage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: i64, parent_id: Option<i64>) -> Comment {
        let now = Utc::now();
        Comment {
            id,
            article_id: 1,
            author_id: 1,
            author_username: "reader".to_string(),
            parent_id,
            content: format!("comment {}", id),
            is_approved: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_build_threads_groups_replies() {
        let threads = build_threads(vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, None),
            comment(4, Some(1)),
            comment(5, Some(99)),
        ]);

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.id, 1);
        assert_eq!(
            threads[0].replies.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert!(threads[1].replies.is_empty());
    }
}
