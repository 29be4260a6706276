//! Denormalized views of articles and comments.
//!
//! Each view is one row per aggregate id, written field by field as events
//! are dispatched. Register the projections on a repository with
//! [`Repository::with_projection`](moderation_core::repository::Repository::with_projection):
//!
//! ```ignore
//! let articles = ArticleViews::new();
//! let repo = Repository::new(store).with_projection(ArticleProjection, articles.clone());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use moderation_core::{
    event::EventMetadata,
    projection::{Patch, Projection, Upsert, inmemory},
};

use crate::{
    ActorId,
    article::{Article, ArticleEvent, ArticleState},
    comment::{Comment, CommentEvent, CommentState},
};

/// In-memory article rows keyed by article id.
pub type ArticleViews = inmemory::Store<Uuid, ArticleView>;

/// In-memory comment rows keyed by comment id.
pub type CommentViews = inmemory::Store<Uuid, CommentView>;

// =============================================================================
// Articles
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleView {
    pub state: ArticleState,
    pub title: String,
    pub content: String,
    pub author_id: ActorId,
    pub feedback: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written by one article event. `None` leaves a field as it is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArticlePatch {
    updated_at: DateTime<Utc>,
    state: Option<ArticleState>,
    text: Option<(String, String)>,
    feedback: Option<Option<String>>,
}

impl ArticlePatch {
    const fn at(updated_at: DateTime<Utc>) -> Self {
        Self {
            updated_at,
            state: None,
            text: None,
            feedback: None,
        }
    }

    const fn state(mut self, state: ArticleState) -> Self {
        self.state = Some(state);
        self
    }

    fn text(mut self, title: &str, content: &str) -> Self {
        self.text = Some((title.to_string(), content.to_string()));
        self
    }

    fn feedback(mut self, feedback: Option<&str>) -> Self {
        self.feedback = Some(feedback.map(str::to_string));
        self
    }
}

impl Patch<ArticleView> for ArticlePatch {
    fn apply_to(self, row: &mut ArticleView) {
        row.updated_at = self.updated_at;
        if let Some(state) = self.state {
            row.state = state;
        }
        if let Some((title, content)) = self.text {
            row.title = title;
            row.content = content;
        }
        if let Some(feedback) = self.feedback {
            row.feedback = feedback;
        }
    }
}

/// Maintains [`ArticleView`] rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArticleProjection;

impl Projection for ArticleProjection {
    type Aggregate = Article;
    type Patch = ArticlePatch;
    type Row = ArticleView;

    const NAME: &'static str = "article-view";

    fn project(
        _id: &Uuid,
        event: &ArticleEvent,
        metadata: &EventMetadata,
    ) -> Upsert<ArticleView, ArticlePatch> {
        let patch = ArticlePatch::at(metadata.occurred_at);
        let patch = match event {
            ArticleEvent::Created(e) => {
                return Upsert::Insert(ArticleView {
                    state: ArticleState::Draft,
                    title: e.title.clone(),
                    content: e.content.clone(),
                    author_id: e.author_id,
                    feedback: None,
                    updated_at: metadata.occurred_at,
                });
            }
            ArticleEvent::Updated(e) => patch.text(&e.title, &e.content),
            ArticleEvent::Submitted(_) => patch.state(ArticleState::Review).feedback(None),
            ArticleEvent::Rejected(e) => patch
                .state(ArticleState::Rejected)
                .feedback(Some(&e.feedback)),
            ArticleEvent::ApprovedPrivate(_) => patch.state(ArticleState::Privated),
            ArticleEvent::Published(_) => patch.state(ArticleState::Published),
            ArticleEvent::Archived(_) => patch.state(ArticleState::Archived),
        };
        Upsert::Update(patch)
    }
}

// =============================================================================
// Comments
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub state: CommentState,
    pub article_id: Uuid,
    pub text: String,
    pub author_id: ActorId,
    pub feedback: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written by one comment event. `None` leaves a field as it is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentPatch {
    updated_at: DateTime<Utc>,
    state: Option<CommentState>,
    text: Option<String>,
    feedback: Option<Option<String>>,
}

impl CommentPatch {
    const fn at(updated_at: DateTime<Utc>) -> Self {
        Self {
            updated_at,
            state: None,
            text: None,
            feedback: None,
        }
    }

    const fn state(mut self, state: CommentState) -> Self {
        self.state = Some(state);
        self
    }

    fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    fn feedback(mut self, feedback: Option<&str>) -> Self {
        self.feedback = Some(feedback.map(str::to_string));
        self
    }
}

impl Patch<CommentView> for CommentPatch {
    fn apply_to(self, row: &mut CommentView) {
        row.updated_at = self.updated_at;
        if let Some(state) = self.state {
            row.state = state;
        }
        if let Some(text) = self.text {
            row.text = text;
        }
        if let Some(feedback) = self.feedback {
            row.feedback = feedback;
        }
    }
}

/// Maintains [`CommentView`] rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommentProjection;

impl Projection for CommentProjection {
    type Aggregate = Comment;
    type Patch = CommentPatch;
    type Row = CommentView;

    const NAME: &'static str = "comment-view";

    fn project(
        _id: &Uuid,
        event: &CommentEvent,
        metadata: &EventMetadata,
    ) -> Upsert<CommentView, CommentPatch> {
        let patch = CommentPatch::at(metadata.occurred_at);
        let patch = match event {
            CommentEvent::Created(e) => {
                return Upsert::Insert(CommentView {
                    state: CommentState::Pending,
                    article_id: e.article_id,
                    text: e.text.clone(),
                    author_id: e.author_id,
                    feedback: None,
                    updated_at: metadata.occurred_at,
                });
            }
            CommentEvent::Approved(_) => patch.state(CommentState::Approved),
            CommentEvent::Rejected(e) => patch
                .state(CommentState::Rejected)
                .feedback(Some(&e.feedback)),
            CommentEvent::Deleted(_) => patch.state(CommentState::Deleted),
            CommentEvent::Restored(_) => patch.state(CommentState::Pending).feedback(None),
            CommentEvent::Updated(e) => patch
                .state(CommentState::Pending)
                .text(&e.text)
                .feedback(None),
        };
        Upsert::Update(patch)
    }
}

#[cfg(test)]
mod tests {
    use moderation_core::projection::{Applied, Versioned, fold};

    use super::*;
    use crate::article::{ArticleCreated, ArticleRejected, ArticleUpdated};

    fn metadata() -> EventMetadata {
        EventMetadata::now()
    }

    fn created() -> ArticleEvent {
        ArticleCreated {
            title: "T1".to_string(),
            content: "C1".to_string(),
            author_id: Uuid::nil(),
        }
        .into()
    }

    #[test]
    fn update_writes_only_text_fields() {
        let id = Uuid::new_v4();
        let mut slot = None;
        fold(&mut slot, 1, ArticleProjection::project(&id, &created(), &metadata())).unwrap();
        let rejected = ArticleRejected {
            feedback: "F".to_string(),
            actor_id: Uuid::nil(),
        };
        fold(
            &mut slot,
            2,
            ArticleProjection::project(&id, &rejected.into(), &metadata()),
        )
        .unwrap();

        let updated = ArticleUpdated {
            title: "T2".to_string(),
            content: "C2".to_string(),
            actor_id: Uuid::nil(),
        };
        fold(
            &mut slot,
            3,
            ArticleProjection::project(&id, &updated.into(), &metadata()),
        )
        .unwrap();

        let Some(Versioned { version, row }) = slot else {
            panic!("row should exist");
        };
        assert_eq!(version, 3);
        assert_eq!(row.title, "T2");
        assert_eq!(row.state, ArticleState::Rejected);
        assert_eq!(row.feedback.as_deref(), Some("F"));
    }

    #[test]
    fn created_twice_is_a_duplicate() {
        let id = Uuid::new_v4();
        let mut slot = None;
        let first = fold(&mut slot, 1, ArticleProjection::project(&id, &created(), &metadata()));
        let once = slot.clone();
        let second = fold(&mut slot, 1, ArticleProjection::project(&id, &created(), &metadata()));

        assert_eq!(first, Ok(Applied::Inserted));
        assert_eq!(second, Ok(Applied::Duplicate));
        assert_eq!(slot, once);
    }
}
