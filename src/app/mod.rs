//! Journal client controller
//!
//! [`JournalApp`] owns everything the journal screen shows: the session, the
//! post list, the open comment modal, a pending delete confirmation and the
//! notice tray. Every mutation goes through it, and so does realtime
//! reconciliation: a change event on any table reloads the post list, and a
//! comment change also reloads the open modal.
//!
//! The controller is single-owner. Methods take `&mut self` and are meant to
//! be driven from one task that selects over user input and
//! [`JournalApp::next_change`].

pub mod merge;
pub mod render;

use chrono::{DateTime, Utc};
use futures_util::future::select_all;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{AuthError, CredentialTable, LoginForm, Session};
use crate::feed::{ChangeEvent, ChangeKind, Subscription, Table};
use crate::storage::{
    Comment, CommentId, JournalStore, Post, PostId, StorageError, StoreKind,
};
use merge::{append_unique, prepend_unique, remove_by_key};

/// Errors surfaced by the controller
#[derive(Debug, Error)]
pub enum AppError {
    /// Input rejected before anything was attempted
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("not logged in")]
    NotAuthenticated,

    #[error("no post is open")]
    NoOpenPost,

    #[error("nothing to confirm")]
    NothingToConfirm,
}

pub type AppResult<T> = Result<T, AppError>;

/// What the screen currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    /// Initial post-list fetch in flight
    Loading,
    List,
    Comments,
}

/// Comment thread of one post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentModal {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// A destructive action waiting for a yes/no answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    DeletePost { id: PostId },
    DeleteComment { id: CommentId, post_id: PostId },
}

impl Confirmation {
    pub fn prompt(&self) -> &'static str {
        match self {
            Confirmation::DeletePost { .. } => {
                "Delete this post? Its comments will be deleted too."
            }
            Confirmation::DeleteComment { .. } => "Delete this comment?",
        }
    }
}

/// Dismissible, non-blocking message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Journal client state and operations
pub struct JournalApp {
    store: Arc<dyn JournalStore>,
    credentials: CredentialTable,
    form: LoginForm,
    session: Option<Session>,
    loading: bool,
    posts: Vec<Post>,
    modal: Option<CommentModal>,
    pending: Option<Confirmation>,
    notices: Vec<Notice>,
    subscriptions: Vec<Subscription>,
}

impl JournalApp {
    pub fn new(store: Arc<dyn JournalStore>, credentials: CredentialTable) -> Self {
        Self {
            store,
            credentials,
            form: LoginForm::default(),
            session: None,
            loading: false,
            posts: Vec::new(),
            modal: None,
            pending: None,
            notices: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn store_kind(&self) -> StoreKind {
        self.store.kind()
    }

    pub fn screen(&self) -> Screen {
        if self.session.is_none() {
            Screen::Login
        } else if self.loading {
            Screen::Loading
        } else if self.modal.is_some() {
            Screen::Comments
        } else {
            Screen::List
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn login_form(&self) -> &LoginForm {
        &self.form
    }

    pub fn login_form_mut(&mut self) -> &mut LoginForm {
        &mut self.form
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn modal(&self) -> Option<&CommentModal> {
        self.modal.as_ref()
    }

    pub fn pending_confirmation(&self) -> Option<&Confirmation> {
        self.pending.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn dismiss_notice(&mut self, index: usize) -> Option<Notice> {
        (index < self.notices.len()).then(|| self.notices.remove(index))
    }

    pub fn clear_notices(&mut self) {
        self.notices.clear();
    }

    /// Whether any realtime subscription is open
    pub fn is_live(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Resolve `#n` (1-based list position) or a full id to a listed post
    pub fn find_post(&self, reference: &str) -> Option<PostId> {
        let reference = reference.trim();
        match reference.strip_prefix('#') {
            Some(index) => {
                let index: usize = index.parse().ok()?;
                self.posts.get(index.checked_sub(1)?).map(|p| p.id.clone())
            }
            None => self
                .posts
                .iter()
                .find(|p| p.id.as_str() == reference)
                .map(|p| p.id.clone()),
        }
    }

    /// Resolve `#n` or a full id to a comment of the open post
    pub fn find_comment(&self, reference: &str) -> Option<CommentId> {
        let comments = &self.modal.as_ref()?.comments;
        let reference = reference.trim();
        match reference.strip_prefix('#') {
            Some(index) => {
                let index: usize = index.parse().ok()?;
                comments.get(index.checked_sub(1)?).map(|c| c.id.clone())
            }
            None => comments
                .iter()
                .find(|c| c.id.as_str() == reference)
                .map(|c| c.id.clone()),
        }
    }

    /// Whether post/comment deletion is offered
    pub fn can_delete(&self) -> bool {
        self.store.supports_delete()
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.notices.push(Notice {
            message: message.into(),
            at: Utc::now(),
        });
    }

    /// Record `err` as a notice and hand it back
    fn fail(&mut self, err: impl Into<AppError>) -> AppError {
        let err = err.into();
        if matches!(err, AppError::Storage(_)) {
            tracing::warn!(error = %err, "Journal operation failed");
        }
        self.notify(err.to_string());
        err
    }

    fn author(&self) -> AppResult<String> {
        self.session
            .as_ref()
            .map(|s| s.display_name.clone())
            .ok_or(AppError::NotAuthenticated)
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Fill the login form and submit it
    pub async fn login(&mut self, name: &str, code: &str) -> AppResult<()> {
        self.form.name = name.to_string();
        self.form.code = code.to_string();
        self.submit_login().await
    }

    /// Submit the login form as currently filled
    ///
    /// On success opens the realtime subscriptions and loads the post list.
    /// A failed initial load leaves the session open with a notice.
    pub async fn submit_login(&mut self) -> AppResult<()> {
        let session = match self.form.submit(&self.credentials) {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };
        self.session = Some(session);

        self.open_subscriptions().await;

        self.loading = true;
        let result = self.load_posts().await;
        self.loading = false;

        if let Err(e) = result {
            tracing::debug!(error = %e, "Initial load failed");
        }
        Ok(())
    }

    async fn open_subscriptions(&mut self) {
        self.subscriptions.clear();
        for table in Table::all() {
            match self.store.subscribe(*table).await {
                Ok(Some(subscription)) => self.subscriptions.push(subscription),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(table = %table, error = %e, "Realtime subscription failed");
                    self.notify(format!("Live updates for {} are unavailable: {}", table, e));
                }
            }
        }
    }

    /// Drop the session and everything loaded under it
    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(user = %session.display_name, "Logged out");
        }
        self.subscriptions.clear();
        self.posts.clear();
        self.modal = None;
        self.pending = None;
        self.notices.clear();
        self.form.clear();
        self.loading = false;
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    /// Replace the post list with the store's
    ///
    /// Closes the comment modal when its post is gone and refreshes its
    /// header otherwise.
    pub async fn load_posts(&mut self) -> AppResult<()> {
        if self.session.is_none() {
            return Err(AppError::NotAuthenticated);
        }

        let posts = match self.store.list_posts().await {
            Ok(posts) => posts,
            Err(e) => return Err(self.fail(e)),
        };
        self.posts = posts;

        let open_id = self.modal.as_ref().map(|m| m.post.id.clone());
        if let Some(open_id) = open_id {
            match self.posts.iter().find(|p| p.id == open_id).cloned() {
                Some(post) => {
                    if let Some(modal) = &mut self.modal {
                        modal.post = post;
                    }
                }
                None => {
                    tracing::debug!(post_id = %open_id, "Open post disappeared");
                    self.modal = None;
                }
            }
        }

        Ok(())
    }

    /// Publish a post as the logged-in user
    pub async fn create_post(&mut self, content: &str) -> AppResult<Post> {
        let author = self.author()?;
        if content.trim().is_empty() {
            return Err(self.fail(AppError::Validation(
                "Please write something first.".to_string(),
            )));
        }

        let post = match self.store.create_post(&author, content).await {
            Ok(post) => post,
            Err(e) => return Err(self.fail(e)),
        };
        prepend_unique(&mut self.posts, post.clone());

        Ok(post)
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    /// Open the comment thread of a listed post
    pub async fn open_comments(&mut self, post_id: &PostId) -> AppResult<()> {
        if self.session.is_none() {
            return Err(AppError::NotAuthenticated);
        }
        let Some(post) = self.posts.iter().find(|p| &p.id == post_id).cloned() else {
            return Err(self.fail(AppError::Validation(format!(
                "No post with id {}",
                post_id
            ))));
        };

        let comments = match self.store.list_comments(post_id).await {
            Ok(comments) => comments,
            Err(e) => return Err(self.fail(e)),
        };
        self.modal = Some(CommentModal { post, comments });

        Ok(())
    }

    pub fn close_comments(&mut self) {
        self.modal = None;
    }

    /// Re-fetch the open thread
    pub async fn reload_comments(&mut self) -> AppResult<()> {
        let post_id = match &self.modal {
            Some(modal) => modal.post.id.clone(),
            None => return Err(AppError::NoOpenPost),
        };

        let comments = match self.store.list_comments(&post_id).await {
            Ok(comments) => comments,
            Err(StorageError::NotFound(_)) => {
                self.modal = None;
                return Ok(());
            }
            Err(e) => return Err(self.fail(e)),
        };

        if let Some(modal) = &mut self.modal {
            if modal.post.id == post_id {
                modal.comments = comments;
            }
        }
        Ok(())
    }

    /// Comment on the open post as the logged-in user
    pub async fn add_comment(&mut self, content: &str) -> AppResult<Comment> {
        let author = self.author()?;
        let Some(post_id) = self.modal.as_ref().map(|m| m.post.id.clone()) else {
            return Err(self.fail(AppError::NoOpenPost));
        };
        if content.trim().is_empty() {
            return Err(self.fail(AppError::Validation(
                "Please write a comment first.".to_string(),
            )));
        }

        let comment = match self.store.add_comment(&post_id, &author, content).await {
            Ok(comment) => comment,
            Err(e) => return Err(self.fail(e)),
        };

        let inserted = match &mut self.modal {
            Some(modal) if modal.post.id == post_id => {
                append_unique(&mut modal.comments, comment.clone())
            }
            _ => true,
        };
        if inserted {
            self.adjust_comment_count(&post_id, 1);
        }

        Ok(comment)
    }

    /// Shift the tracked comment count of a post, never below zero
    fn adjust_comment_count(&mut self, post_id: &PostId, delta: isize) {
        let apply = |post: &mut Post| {
            post.comment_count = post.comment_count.saturating_add_signed(delta);
        };
        if let Some(post) = self.posts.iter_mut().find(|p| &p.id == post_id) {
            apply(post);
        }
        if let Some(modal) = &mut self.modal {
            if &modal.post.id == post_id {
                apply(&mut modal.post);
            }
        }
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    fn ensure_deletable(&mut self) -> AppResult<()> {
        if self.session.is_none() {
            return Err(AppError::NotAuthenticated);
        }
        if !self.store.supports_delete() {
            return Err(self.fail(AppError::Validation(format!(
                "Deleting is not available with the {} backend.",
                self.store.kind()
            ))));
        }
        Ok(())
    }

    /// Ask to delete a listed post; returns the confirmation prompt
    pub fn request_delete_post(&mut self, id: &PostId) -> AppResult<&'static str> {
        self.ensure_deletable()?;
        if !self.posts.iter().any(|p| &p.id == id) {
            return Err(self.fail(AppError::Validation(format!("No post with id {}", id))));
        }

        let confirmation = Confirmation::DeletePost { id: id.clone() };
        let prompt = confirmation.prompt();
        self.pending = Some(confirmation);
        Ok(prompt)
    }

    /// Ask to delete a comment of the open post
    pub fn request_delete_comment(&mut self, id: &CommentId) -> AppResult<&'static str> {
        self.ensure_deletable()?;
        let lookup = self
            .modal
            .as_ref()
            .map(|m| (m.post.id.clone(), m.comments.iter().any(|c| &c.id == id)));
        let post_id = match lookup {
            Some((post_id, true)) => post_id,
            Some((_, false)) => {
                return Err(self.fail(AppError::Validation(format!(
                    "No comment with id {}",
                    id
                ))))
            }
            None => return Err(self.fail(AppError::NoOpenPost)),
        };

        let confirmation = Confirmation::DeleteComment {
            id: id.clone(),
            post_id,
        };
        let prompt = confirmation.prompt();
        self.pending = Some(confirmation);
        Ok(prompt)
    }

    /// Answer the pending confirmation
    ///
    /// Returns whether a deletion was carried out. A row the backend no
    /// longer has counts as deleted; the list is then reloaded.
    pub async fn resolve_confirmation(&mut self, confirmed: bool) -> AppResult<bool> {
        let Some(confirmation) = self.pending.take() else {
            return Err(AppError::NothingToConfirm);
        };
        if !confirmed {
            return Ok(false);
        }

        let result = match &confirmation {
            Confirmation::DeletePost { id } => self.store.delete_post(id).await,
            Confirmation::DeleteComment { id, .. } => self.store.delete_comment(id).await,
        };

        let already_gone = match result {
            Ok(()) => false,
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "Row already deleted");
                true
            }
            Err(e) => return Err(self.fail(e)),
        };

        match confirmation {
            Confirmation::DeletePost { id } => {
                remove_by_key(&mut self.posts, id.as_str());
                if self.modal.as_ref().is_some_and(|m| m.post.id == id) {
                    self.modal = None;
                }
            }
            Confirmation::DeleteComment { id, post_id } => {
                let removed = match &mut self.modal {
                    Some(modal) => remove_by_key(&mut modal.comments, id.as_str()).is_some(),
                    None => false,
                };
                if removed || !already_gone {
                    self.adjust_comment_count(&post_id, -1);
                }
            }
        }

        // The delete itself is done; a failed refresh only leaves a notice.
        if already_gone {
            if let Err(e) = self.load_posts().await {
                tracing::warn!(error = %e, "Refresh after delete failed");
            } else if self.modal.is_some() {
                if let Err(e) = self.reload_comments().await {
                    tracing::warn!(error = %e, "Refresh after delete failed");
                }
            }
        }

        Ok(true)
    }

    // ------------------------------------------------------------------
    // Realtime
    // ------------------------------------------------------------------

    /// Wait for the next change on any open subscription
    ///
    /// Closed subscriptions are dropped. Returns `None` once none are left.
    pub async fn next_change(&mut self) -> Option<ChangeEvent> {
        loop {
            if self.subscriptions.is_empty() {
                return None;
            }

            let (event, index) = {
                let receivers = self
                    .subscriptions
                    .iter_mut()
                    .map(|subscription| Box::pin(subscription.recv()));
                let (event, index, _rest) = select_all(receivers).await;
                (event, index)
            };

            match event {
                Some(event) => return Some(event),
                None => {
                    let closed = self.subscriptions.remove(index);
                    tracing::warn!(table = ?closed.table(), "Change subscription closed");
                    self.notify("Live updates stopped; use reload to refresh.");
                }
            }
        }
    }

    /// Reconcile with the store after a change notification
    pub async fn handle_change(&mut self, event: &ChangeEvent) -> AppResult<()> {
        if self.session.is_none() {
            return Ok(());
        }

        tracing::debug!(table = %event.table, kind = ?event.kind, id = %event.id, "Reloading after change");

        self.load_posts().await?;

        let touches_comments =
            event.table == Table::Comments || event.kind == ChangeKind::Resync;
        if touches_comments && self.modal.is_some() {
            self.reload_comments().await?;
        }

        Ok(())
    }
}
