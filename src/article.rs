//! The article moderation workflow.
//!
//! An article is written as a draft, submitted for review and then rejected,
//! published or approved for private access. Rejected articles can be edited
//! and resubmitted. Rejected, published and private articles can be archived,
//! which ends the workflow.
//!
//! | command           | from                              | to          |
//! |-------------------|-----------------------------------|-------------|
//! | `create`          | unknown                           | draft       |
//! | `update`          | draft, rejected                   | unchanged   |
//! | `submit`          | draft, rejected                   | review      |
//! | `reject`          | review                            | rejected    |
//! | `approve_private` | review                            | privated    |
//! | `publish`         | review                            | published   |
//! | `archive`         | rejected, published, privated     | archived    |
//!
//! Each command is a plain struct handled by [`Article`] through
//! [`Handle`]; the allowed source states of each command are declared with
//! [`Transition`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use moderation_core::{
    aggregate::{Apply, GuardViolation, Handle, Transition, guard},
    event::DomainEvent,
};

use crate::{
    ActorId,
    validation::{self, MAX_FEEDBACK_CHARS, MAX_TITLE_CHARS, ValidationError},
};

/// Where an article is in its review cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleState {
    /// No events yet.
    #[default]
    Unknown,
    Draft,
    Review,
    Rejected,
    Privated,
    Published,
    Archived,
}

impl ArticleState {
    pub const ALL: [Self; 7] = [
        Self::Unknown,
        Self::Draft,
        Self::Review,
        Self::Rejected,
        Self::Privated,
        Self::Published,
        Self::Archived,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Draft => "draft",
            Self::Review => "review",
            Self::Rejected => "rejected",
            Self::Privated => "privated",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ArticleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an article command was refused.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ArticleError {
    #[error(transparent)]
    Guard(#[from] GuardViolation<ArticleState>),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Events
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCreated {
    pub title: String,
    pub content: String,
    pub author_id: ActorId,
}

impl DomainEvent for ArticleCreated {
    const KIND: &'static str = "article.created";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleUpdated {
    pub title: String,
    pub content: String,
    pub actor_id: ActorId,
}

impl DomainEvent for ArticleUpdated {
    const KIND: &'static str = "article.updated";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSubmitted {
    pub actor_id: ActorId,
}

impl DomainEvent for ArticleSubmitted {
    const KIND: &'static str = "article.submitted";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRejected {
    pub feedback: String,
    pub actor_id: ActorId,
}

impl DomainEvent for ArticleRejected {
    const KIND: &'static str = "article.rejected";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleApprovedPrivate {
    pub actor_id: ActorId,
}

impl DomainEvent for ArticleApprovedPrivate {
    const KIND: &'static str = "article.approved-private";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticlePublished {
    pub actor_id: ActorId,
}

impl DomainEvent for ArticlePublished {
    const KIND: &'static str = "article.published";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleArchived {
    pub actor_id: ActorId,
}

impl DomainEvent for ArticleArchived {
    const KIND: &'static str = "article.archived";
}

// =============================================================================
// Aggregate
// =============================================================================

/// Article state rebuilt from its stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Article {
    state: ArticleState,
    title: String,
    content: String,
    author_id: Option<ActorId>,
    rejection_feedback: Option<String>,
}

impl Article {
    #[must_use]
    pub const fn state(&self) -> ArticleState {
        self.state
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn author_id(&self) -> Option<ActorId> {
        self.author_id
    }

    /// Feedback from the last rejection, cleared on resubmission.
    #[must_use]
    pub fn rejection_feedback(&self) -> Option<&str> {
        self.rejection_feedback.as_deref()
    }
}

moderation_core::impl_aggregate! {
    Article {
        kind: "article",
        id: Uuid,
        error: ArticleError,
        event:
            #[derive(Clone, Debug, PartialEq, Eq)]
            pub enum ArticleEvent {
                Created(ArticleCreated),
                Updated(ArticleUpdated),
                Submitted(ArticleSubmitted),
                Rejected(ArticleRejected),
                ApprovedPrivate(ArticleApprovedPrivate),
                Published(ArticlePublished),
                Archived(ArticleArchived),
            }
    }
}

impl Apply<ArticleCreated> for Article {
    fn apply(&mut self, event: &ArticleCreated) {
        self.state = ArticleState::Draft;
        self.title.clone_from(&event.title);
        self.content.clone_from(&event.content);
        self.author_id = Some(event.author_id);
    }
}

impl Apply<ArticleUpdated> for Article {
    fn apply(&mut self, event: &ArticleUpdated) {
        self.title.clone_from(&event.title);
        self.content.clone_from(&event.content);
    }
}

impl Apply<ArticleSubmitted> for Article {
    fn apply(&mut self, _: &ArticleSubmitted) {
        self.state = ArticleState::Review;
        self.rejection_feedback = None;
    }
}

impl Apply<ArticleRejected> for Article {
    fn apply(&mut self, event: &ArticleRejected) {
        self.state = ArticleState::Rejected;
        self.rejection_feedback = Some(event.feedback.clone());
    }
}

impl Apply<ArticleApprovedPrivate> for Article {
    fn apply(&mut self, _: &ArticleApprovedPrivate) {
        self.state = ArticleState::Privated;
    }
}

impl Apply<ArticlePublished> for Article {
    fn apply(&mut self, _: &ArticlePublished) {
        self.state = ArticleState::Published;
    }
}

impl Apply<ArticleArchived> for Article {
    fn apply(&mut self, _: &ArticleArchived) {
        self.state = ArticleState::Archived;
    }
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Clone, Debug)]
pub struct CreateArticle {
    pub title: String,
    pub content: String,
    pub author_id: ActorId,
}

/// Replace title and content of a draft or rejected article.
#[derive(Clone, Debug)]
pub struct UpdateArticle {
    pub title: String,
    pub content: String,
    pub actor_id: ActorId,
}

#[derive(Clone, Debug)]
pub struct SubmitArticle {
    pub actor_id: ActorId,
}

#[derive(Clone, Debug)]
pub struct RejectArticle {
    pub feedback: String,
    pub actor_id: ActorId,
}

/// Accept an article under review for private access only.
#[derive(Clone, Debug)]
pub struct ApprovePrivate {
    pub actor_id: ActorId,
}

#[derive(Clone, Debug)]
pub struct PublishArticle {
    pub actor_id: ActorId,
}

#[derive(Clone, Debug)]
pub struct ArchiveArticle {
    pub actor_id: ActorId,
}

impl Transition<ArticleState> for CreateArticle {
    const FROM: &'static [ArticleState] = &[ArticleState::Unknown];
    const NAME: &'static str = "create";
}

impl Transition<ArticleState> for UpdateArticle {
    const FROM: &'static [ArticleState] = &[ArticleState::Draft, ArticleState::Rejected];
    const NAME: &'static str = "update";
}

impl Transition<ArticleState> for SubmitArticle {
    const FROM: &'static [ArticleState] = &[ArticleState::Draft, ArticleState::Rejected];
    const NAME: &'static str = "submit";
}

impl Transition<ArticleState> for RejectArticle {
    const FROM: &'static [ArticleState] = &[ArticleState::Review];
    const NAME: &'static str = "reject";
}

impl Transition<ArticleState> for ApprovePrivate {
    const FROM: &'static [ArticleState] = &[ArticleState::Review];
    const NAME: &'static str = "approve_private";
}

impl Transition<ArticleState> for PublishArticle {
    const FROM: &'static [ArticleState] = &[ArticleState::Review];
    const NAME: &'static str = "publish";
}

impl Transition<ArticleState> for ArchiveArticle {
    const FROM: &'static [ArticleState] = &[
        ArticleState::Rejected,
        ArticleState::Published,
        ArticleState::Privated,
    ];
    const NAME: &'static str = "archive";
}

fn check_text(title: &str, content: &str) -> Result<(), ValidationError> {
    validation::bounded("title", title, MAX_TITLE_CHARS)?;
    validation::required("content", content)
}

impl Handle<CreateArticle> for Article {
    fn handle(&self, command: &CreateArticle) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<CreateArticle, _>(self.state)?;
        check_text(&command.title, &command.content)?;
        Ok(vec![
            ArticleCreated {
                title: command.title.clone(),
                content: command.content.clone(),
                author_id: command.author_id,
            }
            .into(),
        ])
    }
}

impl Handle<UpdateArticle> for Article {
    fn handle(&self, command: &UpdateArticle) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<UpdateArticle, _>(self.state)?;
        check_text(&command.title, &command.content)?;
        Ok(vec![
            ArticleUpdated {
                title: command.title.clone(),
                content: command.content.clone(),
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}

impl Handle<SubmitArticle> for Article {
    fn handle(&self, command: &SubmitArticle) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<SubmitArticle, _>(self.state)?;
        Ok(vec![
            ArticleSubmitted {
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}

impl Handle<RejectArticle> for Article {
    fn handle(&self, command: &RejectArticle) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<RejectArticle, _>(self.state)?;
        validation::bounded("feedback", &command.feedback, MAX_FEEDBACK_CHARS)?;
        Ok(vec![
            ArticleRejected {
                feedback: command.feedback.clone(),
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}

impl Handle<ApprovePrivate> for Article {
    fn handle(&self, command: &ApprovePrivate) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<ApprovePrivate, _>(self.state)?;
        Ok(vec![
            ArticleApprovedPrivate {
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}

impl Handle<PublishArticle> for Article {
    fn handle(&self, command: &PublishArticle) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<PublishArticle, _>(self.state)?;
        Ok(vec![
            ArticlePublished {
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}

impl Handle<ArchiveArticle> for Article {
    fn handle(&self, command: &ArchiveArticle) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<ArchiveArticle, _>(self.state)?;
        Ok(vec![
            ArticleArchived {
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}
