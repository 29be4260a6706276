//! The comment moderation workflow.
//!
//! | command   | from                       | to       |
//! |-----------|----------------------------|----------|
//! | `create`  | unknown                    | pending  |
//! | `approve` | pending                    | approved |
//! | `reject`  | pending                    | rejected |
//! | `delete`  | pending, approved, rejected| deleted  |
//! | `restore` | deleted                    | pending  |
//! | `update`  | rejected                   | pending  |
//!
//! Editing a rejected comment sends it back to moderation with the feedback
//! cleared, as does restoring a deleted one.

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
    validation::{self, MAX_COMMENT_CHARS, MAX_FEEDBACK_CHARS, ValidationError},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentState {
    #[default]
    Unknown,
    Pending,
    Approved,
    Rejected,
    Deleted,
}

impl CommentState {
    pub const ALL: [Self; 5] = [
        Self::Unknown,
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Deleted,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for CommentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommentError {
    #[error(transparent)]
    Guard(#[from] GuardViolation<CommentState>),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Events
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentCreated {
    pub article_id: Uuid,
    pub text: String,
    pub author_id: ActorId,
}

impl DomainEvent for CommentCreated {
    const KIND: &'static str = "comment.created";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentApproved {
    pub actor_id: ActorId,
}

impl DomainEvent for CommentApproved {
    const KIND: &'static str = "comment.approved";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRejected {
    pub feedback: String,
    pub actor_id: ActorId,
}

impl DomainEvent for CommentRejected {
    const KIND: &'static str = "comment.rejected";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDeleted {
    pub actor_id: ActorId,
}

impl DomainEvent for CommentDeleted {
    const KIND: &'static str = "comment.deleted";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRestored {
    pub actor_id: ActorId,
}

impl DomainEvent for CommentRestored {
    const KIND: &'static str = "comment.restored";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentUpdated {
    pub text: String,
    pub actor_id: ActorId,
}

impl DomainEvent for CommentUpdated {
    const KIND: &'static str = "comment.updated";
}

// =============================================================================
// Aggregate
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Comment {
    state: CommentState,
    article_id: Option<Uuid>,
    text: String,
    author_id: Option<ActorId>,
    rejection_feedback: Option<String>,
}

impl Comment {
    #[must_use]
    pub const fn state(&self) -> CommentState {
        self.state
    }

    /// The article this comment was left on.
    #[must_use]
    pub const fn article_id(&self) -> Option<Uuid> {
        self.article_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn author_id(&self) -> Option<ActorId> {
        self.author_id
    }

    #[must_use]
    pub fn rejection_feedback(&self) -> Option<&str> {
        self.rejection_feedback.as_deref()
    }
}

moderation_core::impl_aggregate! {
    Comment {
        kind: "comment",
        id: Uuid,
        error: CommentError,
        event:
            #[derive(Clone, Debug, PartialEq, Eq)]
            pub enum CommentEvent {
                Created(CommentCreated),
                Approved(CommentApproved),
                Rejected(CommentRejected),
                Deleted(CommentDeleted),
                Restored(CommentRestored),
                Updated(CommentUpdated),
            }
    }
}

impl Apply<CommentCreated> for Comment {
    fn apply(&mut self, event: &CommentCreated) {
        self.state = CommentState::Pending;
        self.article_id = Some(event.article_id);
        self.text.clone_from(&event.text);
        self.author_id = Some(event.author_id);
    }
}

impl Apply<CommentApproved> for Comment {
    fn apply(&mut self, _: &CommentApproved) {
        self.state = CommentState::Approved;
    }
}

impl Apply<CommentRejected> for Comment {
    fn apply(&mut self, event: &CommentRejected) {
        self.state = CommentState::Rejected;
        self.rejection_feedback = Some(event.feedback.clone());
    }
}

impl Apply<CommentDeleted> for Comment {
    fn apply(&mut self, _: &CommentDeleted) {
        self.state = CommentState::Deleted;
    }
}

impl Apply<CommentRestored> for Comment {
    fn apply(&mut self, _: &CommentRestored) {
        self.state = CommentState::Pending;
        self.rejection_feedback = None;
    }
}

impl Apply<CommentUpdated> for Comment {
    fn apply(&mut self, event: &CommentUpdated) {
        self.state = CommentState::Pending;
        self.text.clone_from(&event.text);
        self.rejection_feedback = None;
    }
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Clone, Debug)]
pub struct CreateComment {
    pub article_id: Uuid,
    pub text: String,
    pub author_id: ActorId,
}

#[derive(Clone, Debug)]
pub struct ApproveComment {
    pub actor_id: ActorId,
}

#[derive(Clone, Debug)]
pub struct RejectComment {
    pub feedback: String,
    pub actor_id: ActorId,
}

#[derive(Clone, Debug)]
pub struct DeleteComment {
    pub actor_id: ActorId,
}

#[derive(Clone, Debug)]
pub struct RestoreComment {
    pub actor_id: ActorId,
}

/// Rewrite a rejected comment and send it back to moderation.
#[derive(Clone, Debug)]
pub struct UpdateComment {
    pub text: String,
    pub actor_id: ActorId,
}

impl Transition<CommentState> for CreateComment {
    const FROM: &'static [CommentState] = &[CommentState::Unknown];
    const NAME: &'static str = "create";
}

impl Transition<CommentState> for ApproveComment {
    const FROM: &'static [CommentState] = &[CommentState::Pending];
    const NAME: &'static str = "approve";
}

impl Transition<CommentState> for RejectComment {
    const FROM: &'static [CommentState] = &[CommentState::Pending];
    const NAME: &'static str = "reject";
}

impl Transition<CommentState> for DeleteComment {
    const FROM: &'static [CommentState] = &[
        CommentState::Pending,
        CommentState::Approved,
        CommentState::Rejected,
    ];
    const NAME: &'static str = "delete";
}

impl Transition<CommentState> for RestoreComment {
    const FROM: &'static [CommentState] = &[CommentState::Deleted];
    const NAME: &'static str = "restore";
}

impl Transition<CommentState> for UpdateComment {
    const FROM: &'static [CommentState] = &[CommentState::Rejected];
    const NAME: &'static str = "update";
}

impl Handle<CreateComment> for Comment {
    fn handle(&self, command: &CreateComment) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<CreateComment, _>(self.state)?;
        validation::bounded("text", &command.text, MAX_COMMENT_CHARS)?;
        Ok(vec![
            CommentCreated {
                article_id: command.article_id,
                text: command.text.clone(),
                author_id: command.author_id,
            }
            .into(),
        ])
    }
}

impl Handle<ApproveComment> for Comment {
    fn handle(&self, command: &ApproveComment) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<ApproveComment, _>(self.state)?;
        Ok(vec![
            CommentApproved {
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}

impl Handle<RejectComment> for Comment {
    fn handle(&self, command: &RejectComment) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<RejectComment, _>(self.state)?;
        validation::bounded("feedback", &command.feedback, MAX_FEEDBACK_CHARS)?;
        Ok(vec![
            CommentRejected {
                feedback: command.feedback.clone(),
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}

impl Handle<DeleteComment> for Comment {
    fn handle(&self, command: &DeleteComment) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<DeleteComment, _>(self.state)?;
        Ok(vec![
            CommentDeleted {
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}

impl Handle<RestoreComment> for Comment {
    fn handle(&self, command: &RestoreComment) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<RestoreComment, _>(self.state)?;
        Ok(vec![
            CommentRestored {
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}

impl Handle<UpdateComment> for Comment {
    fn handle(&self, command: &UpdateComment) -> Result<Vec<Self::Event>, Self::Error> {
        guard::<UpdateComment, _>(self.state)?;
        validation::bounded("text", &command.text, MAX_COMMENT_CHARS)?;
        Ok(vec![
            CommentUpdated {
                text: command.text.clone(),
                actor_id: command.actor_id,
            }
            .into(),
        ])
    }
}
