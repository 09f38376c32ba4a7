//! Reader engagement: comments, likes and reading history

use crate::db::repositories::{ArticleRepository, EngagementRepository};
use crate::models::{
    build_threads, Article, Comment, CommentThread, CreateCommentInput, LikeResult,
    ReadingHistoryEntry, User, COMMENT_MAX_LENGTH, COMMENT_MIN_LENGTH,
};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EngagementServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct EngagementService {
    article_repo: Arc<dyn ArticleRepository>,
    repo: Arc<dyn EngagementRepository>,
}

impl EngagementService {
    pub fn new(article_repo: Arc<dyn ArticleRepository>, repo: Arc<dyn EngagementRepository>) -> Self {
        Self { article_repo, repo }
    }

    /// Comment on a published article.
    ///
    /// Replies always hang off the top-level comment of their thread, so a
    /// reply to a reply is attached to the reply's parent.
    pub async fn add_comment(
        &self,
        author: &User,
        slug: &str,
        input: CreateCommentInput,
    ) -> Result<Comment, EngagementServiceError> {
        let article = self.published_article(slug).await?;
        if !article.allow_comments {
            return Err(EngagementServiceError::Forbidden(
                "Comments are disabled for this article".to_string(),
            ));
        }

        let content = input.content.trim();
        let len = content.chars().count();
        if !(COMMENT_MIN_LENGTH..=COMMENT_MAX_LENGTH).contains(&len) {
            return Err(EngagementServiceError::ValidationError(format!(
                "Comment must be between {} and {} characters",
                COMMENT_MIN_LENGTH, COMMENT_MAX_LENGTH
            )));
        }

        let parent_id = match input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .repo
                    .get_comment(parent_id)
                    .await
                    .context("Failed to get parent comment")?
                    .filter(|c| c.article_id == article.id)
                    .ok_or_else(|| {
                        EngagementServiceError::ValidationError(
                            "Parent comment does not belong to this article".to_string(),
                        )
                    })?;
                Some(parent.parent_id.unwrap_or(parent.id))
            }
            None => None,
        };

        let comment = self
            .repo
            .create_comment(article.id, author.id, parent_id, content)
            .await
            .context("Failed to create comment")?;
        self.article_repo
            .adjust_comment_count(article.id, 1)
            .await
            .context("Failed to update comment count")?;
        Ok(comment)
    }

    /// Approved comment threads of a published article, oldest first
    pub async fn list_comments(&self, slug: &str) -> Result<Vec<CommentThread>, EngagementServiceError> {
        let article = self.published_article(slug).await?;
        let comments = self
            .repo
            .list_comments(article.id)
            .await
            .context("Failed to list comments")?;
        Ok(build_threads(comments))
    }

    /// Delete a comment with its replies. Allowed for the comment's author
    /// and for editors and admins.
    pub async fn delete_comment(&self, actor: &User, id: i64) -> Result<(), EngagementServiceError> {
        let comment = self
            .repo
            .get_comment(id)
            .await
            .context("Failed to get comment")?
            .ok_or_else(|| EngagementServiceError::NotFound("Comment not found".to_string()))?;

        if comment.author_id != actor.id && !actor.can_review() {
            return Err(EngagementServiceError::Forbidden(
                "You cannot delete this comment".to_string(),
            ));
        }

        let removed = self
            .repo
            .delete_comment(id)
            .await
            .context("Failed to delete comment")?;
        self.article_repo
            .adjust_comment_count(comment.article_id, -(removed as i64))
            .await
            .context("Failed to update comment count")?;
        Ok(())
    }

    /// Like the article, or take the like back
    pub async fn toggle_like(&self, user: &User, slug: &str) -> Result<LikeResult, EngagementServiceError> {
        let article = self.published_article(slug).await?;

        let already_liked = self
            .repo
            .has_liked(article.id, user.id)
            .await
            .context("Failed to check like")?;

        let (liked, delta) = if already_liked {
            let removed = self
                .repo
                .remove_like(article.id, user.id)
                .await
                .context("Failed to remove like")?;
            (false, if removed { -1 } else { 0 })
        } else {
            let added = self
                .repo
                .add_like(article.id, user.id)
                .await
                .context("Failed to add like")?;
            (true, if added { 1 } else { 0 })
        };

        let like_count = self
            .article_repo
            .adjust_like_count(article.id, delta)
            .await
            .context("Failed to update like count")?;
        Ok(LikeResult { liked, like_count })
    }

    /// Most recently read articles first
    pub async fn history(
        &self,
        user: &User,
        limit: i64,
    ) -> Result<Vec<ReadingHistoryEntry>, EngagementServiceError> {
        let entries = self
            .repo
            .list_history(user.id, limit)
            .await
            .context("Failed to load reading history")?;
        Ok(entries)
    }

    async fn published_article(&self, slug: &str) -> Result<Article, EngagementServiceError> {
        self.article_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get article")?
            .filter(Article::is_published)
            .ok_or_else(|| EngagementServiceError::NotFound("Article not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxArticleRepository, SqlxEngagementRepository};
    use crate::models::{UpdateArticleInput, UserRole, WorkflowAction};
    use crate::services::article::tests::article_service;
    use crate::services::article::ArticleService;
    use crate::services::notification::tests::{service_with, RecordingMailer};
    use crate::services::test_support::{article_body, create_user, test_pool};
    use crate::models::CreateArticleInput;

    struct Fixture {
        service: EngagementService,
        articles: ArticleService,
        journalist: User,
        reader: User,
        other_reader: User,
        editor: User,
        article: Article,
    }

    async fn setup() -> Fixture {
        let pool = test_pool().await;
        let articles = article_service(
            &pool,
            Arc::new(service_with(&pool, Arc::new(RecordingMailer::default()))),
        );
        let journalist = create_user(&pool, "jane", UserRole::Journalist).await;
        let reader = create_user(&pool, "rita", UserRole::Reader).await;
        let other_reader = create_user(&pool, "otto", UserRole::Reader).await;
        let editor = create_user(&pool, "ed", UserRole::Editor).await;

        let draft = articles
            .create(&journalist, CreateArticleInput::new("Open Thread", article_body("threads")))
            .await
            .unwrap();
        articles
            .transition(&journalist, draft.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        let article = articles
            .transition(&editor, draft.id, WorkflowAction::Approve, None)
            .await
            .unwrap();

        Fixture {
            service: EngagementService::new(
                SqlxArticleRepository::boxed(pool.clone()),
                SqlxEngagementRepository::boxed(pool),
            ),
            articles,
            journalist,
            reader,
            other_reader,
            editor,
            article,
        }
    }

    #[tokio::test]
    async fn test_comment_threads() {
        let fx = setup().await;
        let slug = fx.article.slug.as_str();

        let root = fx
            .service
            .add_comment(&fx.reader, slug, CreateCommentInput::new("First thoughts here"))
            .await
            .unwrap();
        let reply = fx
            .service
            .add_comment(&fx.other_reader, slug, CreateCommentInput::new("I disagree").reply_to(root.id))
            .await
            .unwrap();
        let nested = fx
            .service
            .add_comment(&fx.reader, slug, CreateCommentInput::new("Fair enough").reply_to(reply.id))
            .await
            .unwrap();
        assert_eq!(reply.parent_id, Some(root.id));
        assert_eq!(nested.parent_id, Some(root.id));

        let threads = fx.service.list_comments(slug).await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].replies.len(), 2);

        let article = fx.articles.get_by_id(fx.article.id).await.unwrap();
        assert_eq!(article.comment_count, 3);
    }

    #[tokio::test]
    async fn test_comment_validation() {
        let fx = setup().await;
        let slug = fx.article.slug.as_str();

        assert!(matches!(
            fx.service.add_comment(&fx.reader, slug, CreateCommentInput::new("hi")).await,
            Err(EngagementServiceError::ValidationError(_))
        ));
        assert!(matches!(
            fx.service
                .add_comment(&fx.reader, slug, CreateCommentInput::new("Reply to nothing").reply_to(999))
                .await,
            Err(EngagementServiceError::ValidationError(_))
        ));
        assert!(matches!(
            fx.service
                .add_comment(&fx.reader, "no-such-article", CreateCommentInput::new("Hello there"))
                .await,
            Err(EngagementServiceError::NotFound(_))
        ));

        fx.articles
            .update(
                &fx.editor,
                fx.article.id,
                UpdateArticleInput {
                    allow_comments: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            fx.service
                .add_comment(&fx.reader, slug, CreateCommentInput::new("Closed now?"))
                .await,
            Err(EngagementServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_comment_removes_replies() {
        let fx = setup().await;
        let slug = fx.article.slug.as_str();
        let root = fx
            .service
            .add_comment(&fx.reader, slug, CreateCommentInput::new("Root comment"))
            .await
            .unwrap();
        fx.service
            .add_comment(&fx.other_reader, slug, CreateCommentInput::new("A reply").reply_to(root.id))
            .await
            .unwrap();

        assert!(matches!(
            fx.service.delete_comment(&fx.other_reader, root.id).await,
            Err(EngagementServiceError::Forbidden(_))
        ));
        fx.service.delete_comment(&fx.editor, root.id).await.unwrap();

        assert!(fx.service.list_comments(slug).await.unwrap().is_empty());
        let article = fx.articles.get_by_id(fx.article.id).await.unwrap();
        assert_eq!(article.comment_count, 0);
    }

    #[tokio::test]
    async fn test_toggle_like() {
        let fx = setup().await;
        let slug = fx.article.slug.as_str();

        let liked = fx.service.toggle_like(&fx.reader, slug).await.unwrap();
        assert_eq!(liked, LikeResult { liked: true, like_count: 1 });
        let other = fx.service.toggle_like(&fx.other_reader, slug).await.unwrap();
        assert_eq!(other.like_count, 2);

        let unliked = fx.service.toggle_like(&fx.reader, slug).await.unwrap();
        assert_eq!(unliked, LikeResult { liked: false, like_count: 1 });
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let fx = setup().await;
        fx.articles
            .get_by_slug(Some(&fx.reader), &fx.article.slug)
            .await
            .unwrap();
        fx.articles
            .get_by_slug(Some(&fx.reader), &fx.article.slug)
            .await
            .unwrap();

        let history = fx.service.history(&fx.reader, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].article_slug, fx.article.slug);
        assert!(fx.service.history(&fx.journalist, 10).await.unwrap().is_empty());
    }
}
