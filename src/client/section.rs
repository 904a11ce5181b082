use crate::composer::{COMPLETION_DELAY, Composer, ComposerError, ReplyTarget};
use crate::models::{Comment, CommentNode};
use crate::moderation::{DeleteConfirmation, ModerationAction};
use crate::thread::{RenderOptions, SectionContent, ThreadRenderer, ThreadState, render_section};
use crate::tree::{count_comments, depth_of, find_node};

use super::CommentApi;

pub const LOAD_FAILURE: &str = "Comments could not be loaded.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionState {
    Loading,
    Ready(Vec<CommentNode>),
    /// Initial fetch failed; the error panel replaces the whole section.
    Failed(String),
}

/// Blocking alert shown to the admin after a failed moderation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationAlert {
    pub comment_id: i64,
    pub message: String,
}

/// Client-side owner of one article's comment tree.
///
/// Writes never patch the cached tree: every successful write is followed by
/// one full fetch, and a failed write leaves the cache exactly as it was.
pub struct CommentSection<A> {
    api: A,
    article_id: i64,
    options: RenderOptions,
    state: SectionState,
    thread: ThreadState,
    composer: Composer,
    reply_composer: Option<Composer>,
    notice: Option<String>,
}

impl<A: CommentApi> CommentSection<A> {
    pub fn new(api: A, article_id: i64, options: RenderOptions) -> Self {
        Self {
            api,
            article_id,
            options,
            state: SectionState::Loading,
            thread: ThreadState::new(),
            composer: Composer::new(article_id),
            reply_composer: None,
            notice: None,
        }
    }

    pub fn state(&self) -> &SectionState {
        &self.state
    }

    pub fn roots(&self) -> Option<&[CommentNode]> {
        match &self.state {
            SectionState::Ready(roots) => Some(roots),
            _ => None,
        }
    }

    /// Hidden while loading or after a failed initial load.
    pub fn total_comments(&self) -> Option<usize> {
        self.roots().map(count_comments)
    }

    pub fn thread(&self) -> &ThreadState {
        &self.thread
    }

    /// Page-level error from a failed refresh; the cached tree stays visible.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn composer(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn reply_composer(&mut self) -> Option<&mut Composer> {
        self.reply_composer.as_mut()
    }

    /// Fetches a fresh snapshot of the whole tree.
    pub async fn refresh(&mut self) {
        match self.api.fetch_thread(self.article_id, self.options.admin).await {
            Ok(roots) => {
                self.notice = None;
                self.state = SectionState::Ready(roots);
            }
            Err(err) => {
                tracing::warn!(article_id = self.article_id, error = %err, "Failed to fetch comments");
                if matches!(self.state, SectionState::Ready(_)) {
                    self.notice = Some(err.alert_message());
                } else {
                    self.state = SectionState::Failed(LOAD_FAILURE.to_string());
                }
            }
        }
    }

    /// Toggles the reply composer on `comment_id`. Opening it discards any
    /// other open reply. Nodes at the depth limit cannot be replied to.
    pub fn toggle_reply(&mut self, comment_id: i64) -> bool {
        let Some(roots) = self.roots() else {
            return false;
        };
        let Some(depth) = depth_of(roots, comment_id) else {
            return false;
        };
        if !crate::thread::can_reply(depth, self.options.max_depth) {
            return false;
        }
        let author_name = find_node(roots, comment_id)
            .map(crate::thread::display_name)
            .unwrap_or_default();

        self.reply_composer = None;
        if self.thread.toggle_reply(comment_id) {
            self.reply_composer = Some(Composer::reply(
                self.article_id,
                ReplyTarget {
                    comment_id,
                    author_name,
                },
            ));
            true
        } else {
            false
        }
    }

    pub fn cancel_reply(&mut self) {
        self.thread.close_reply();
        self.reply_composer = None;
    }

    pub fn toggle_replies(&mut self, comment_id: i64) -> bool {
        self.thread.toggle_replies(comment_id)
    }

    /// Submits the top-level composer, then refreshes after the
    /// confirmation delay.
    pub async fn submit_comment(&mut self) -> Result<Comment, ComposerError> {
        let comment = self.composer.submit(&self.api).await?;
        tokio::time::sleep(COMPLETION_DELAY).await;
        self.composer = Composer::new(self.article_id);
        self.refresh().await;
        Ok(comment)
    }

    /// Submits the open reply; on success the reply form closes after the
    /// confirmation delay and the tree is refreshed.
    pub async fn submit_reply(&mut self) -> Result<Option<Comment>, ComposerError> {
        let Some(composer) = self.reply_composer.as_mut() else {
            return Ok(None);
        };
        let comment = composer.submit(&self.api).await?;
        tokio::time::sleep(COMPLETION_DELAY).await;
        self.cancel_reply();
        self.refresh().await;
        Ok(Some(comment))
    }

    pub async fn moderate(
        &mut self,
        comment_id: i64,
        action: ModerationAction,
    ) -> Result<(), ModerationAlert> {
        if let Err(err) = self.api.moderate(comment_id, action).await {
            tracing::warn!(comment_id, action = action.as_str(), error = %err, "Moderation failed");
            return Err(ModerationAlert {
                comment_id,
                message: err.alert_message(),
            });
        }
        self.refresh().await;
        Ok(())
    }

    /// Deletes one comment once the admin confirmed. Replies are untouched.
    pub async fn delete(
        &mut self,
        comment_id: i64,
        confirmation: DeleteConfirmation,
    ) -> Result<bool, ModerationAlert> {
        if confirmation == DeleteConfirmation::Declined {
            return Ok(false);
        }
        if let Err(err) = self.api.delete_comment(comment_id).await {
            tracing::warn!(comment_id, error = %err, "Delete failed");
            return Err(ModerationAlert {
                comment_id,
                message: err.alert_message(),
            });
        }
        if self.thread.is_replying_to(comment_id) {
            self.cancel_reply();
        }
        self.refresh().await;
        Ok(true)
    }

    pub fn render(&self) -> Result<String, askama::Error> {
        let renderer = ThreadRenderer {
            article_id: self.article_id,
            state: &self.thread,
            options: &self.options,
            reply_composer: self.reply_composer.as_ref(),
        };
        let content = match &self.state {
            SectionState::Ready(roots) => SectionContent::Thread {
                roots,
                composer: &self.composer,
                notice: self.notice.as_deref(),
            },
            SectionState::Failed(message) => SectionContent::Failed(message),
            SectionState::Loading => SectionContent::Thread {
                roots: &[],
                composer: &self.composer,
                notice: None,
            },
        };
        render_section(&renderer, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::client::fake::{FakeApi, comment};

    fn admin() -> RenderOptions {
        RenderOptions {
            admin: true,
            ..RenderOptions::default()
        }
    }

    async fn loaded(api: FakeApi, options: RenderOptions) -> CommentSection<FakeApi> {
        let mut section = CommentSection::new(api, 1, options);
        section.refresh().await;
        section
    }

    #[tokio::test]
    async fn initial_load_builds_the_tree() {
        let api = FakeApi::with_comments(vec![
            comment(1, None, true),
            comment(2, Some(1), true),
            comment(3, Some(2), true),
            comment(4, None, false),
        ]);
        let section = loaded(api, RenderOptions::default()).await;
        assert_eq!(section.total_comments(), Some(3));
        assert_eq!(section.roots().unwrap()[0].replies[0].replies[0].id(), 3);
    }

    #[tokio::test]
    async fn failed_initial_load_hides_count_and_form() {
        let api = FakeApi::default();
        *api.fail_fetch.lock().unwrap() = true;
        let section = loaded(api, RenderOptions::default()).await;

        assert_eq!(section.state(), &SectionState::Failed(LOAD_FAILURE.to_string()));
        assert_eq!(section.total_comments(), None);
        let html = section.render().unwrap();
        assert!(html.contains(LOAD_FAILURE));
        assert!(!html.contains("<form"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_cached_tree() {
        let api = FakeApi::with_comments(vec![comment(1, None, true)]);
        let mut section = loaded(api, RenderOptions::default()).await;
        *section.api.fail_fetch.lock().unwrap() = true;

        section.refresh().await;
        assert_eq!(section.total_comments(), Some(1));
        assert_eq!(section.notice(), Some("Database unavailable"));
    }

    #[tokio::test]
    async fn forbidden_approve_alerts_and_keeps_cache() {
        let api = FakeApi::with_comments(vec![comment(42, None, false)]);
        let mut section = loaded(api, admin()).await;
        let before = section.state().clone();
        section
            .api
            .fail_next(ClientError::server(403, "Admin access required"));

        let alert = section
            .moderate(42, ModerationAction::Approve)
            .await
            .unwrap_err();
        assert_eq!(alert.comment_id, 42);
        assert_eq!(alert.message, "Admin access required");
        assert_eq!(section.state(), &before);
        assert_eq!(section.api.calls(), vec!["fetch 1", "approve 42"]);
    }

    #[tokio::test]
    async fn successful_moderation_refetches() {
        let api = FakeApi::with_comments(vec![comment(7, None, false)]);
        let mut section = loaded(api, admin()).await;

        section.moderate(7, ModerationAction::Approve).await.unwrap();
        assert_eq!(section.api.calls(), vec!["fetch 1", "approve 7", "fetch 1"]);
        assert!(section.roots().unwrap()[0].comment.approved);

        section.moderate(7, ModerationAction::Approve).await.unwrap();
        assert!(section.roots().unwrap()[0].comment.approved);
    }

    #[tokio::test]
    async fn declined_delete_sends_nothing() {
        let api = FakeApi::with_comments(vec![comment(1, None, true)]);
        let mut section = loaded(api, admin()).await;

        let deleted = section.delete(1, DeleteConfirmation::Declined).await.unwrap();
        assert!(!deleted);
        assert_eq!(section.api.calls(), vec!["fetch 1"]);
    }

    #[tokio::test]
    async fn deleting_a_parent_promotes_its_replies() {
        let api = FakeApi::with_comments(vec![comment(1, None, true), comment(2, Some(1), true)]);
        let mut section = loaded(api, admin()).await;

        assert!(section.delete(1, DeleteConfirmation::Confirmed).await.unwrap());
        let roots = section.roots().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id(), 2);
    }

    #[tokio::test]
    async fn only_one_reply_composer_is_open() {
        let api = FakeApi::with_comments(vec![comment(1, None, true), comment(2, None, true)]);
        let mut section = loaded(api, RenderOptions::default()).await;

        assert!(section.toggle_reply(1));
        section.reply_composer().unwrap().draft.content = "draft for 1".to_string();
        assert!(section.toggle_reply(2));

        assert!(!section.thread().is_replying_to(1));
        assert!(section.thread().is_replying_to(2));
        let composer = section.reply_composer().unwrap();
        assert_eq!(composer.target().unwrap().comment_id, 2);
        assert!(composer.draft.content.is_empty());

        assert!(!section.toggle_reply(2));
        assert!(section.reply_composer().is_none());
    }

    #[tokio::test]
    async fn reply_is_refused_at_the_depth_limit() {
        let rows = (1..=5)
            .map(|id| comment(id, if id == 1 { None } else { Some(id - 1) }, true))
            .collect();
        let mut section = loaded(FakeApi::with_comments(rows), RenderOptions::default()).await;

        assert!(section.toggle_reply(4));
        assert!(!section.toggle_reply(5));
        assert_eq!(section.thread().active_reply(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_closes_and_refreshes_after_the_delay() {
        let api = FakeApi::with_comments(vec![comment(1, None, true)]);
        let mut section = loaded(api, RenderOptions::default()).await;
        section.toggle_reply(1);
        section.reply_composer().unwrap().draft.content = "Nice one".to_string();

        let started = tokio::time::Instant::now();
        let created = section.submit_reply().await.unwrap().unwrap();
        assert!(started.elapsed() >= COMPLETION_DELAY);

        assert_eq!(created.parent_id, Some(1));
        assert!(section.reply_composer().is_none());
        assert_eq!(section.thread().active_reply(), None);
        assert_eq!(section.total_comments(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reply_keeps_the_form_open() {
        let api = FakeApi::with_comments(vec![comment(1, None, true)]);
        let mut section = loaded(api, RenderOptions::default()).await;
        section.toggle_reply(1);
        section.reply_composer().unwrap().draft.content = "Try again".to_string();
        section.api.fail_next(ClientError::server(502, "Bad gateway"));

        assert!(section.submit_reply().await.is_err());
        let composer = section.reply_composer().unwrap();
        assert_eq!(composer.draft.content, "Try again");
        assert_eq!(composer.error(), Some("Bad gateway"));
        assert_eq!(section.total_comments(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_top_level_comment_is_not_sent() {
        let mut section = loaded(FakeApi::default(), RenderOptions::default()).await;
        section.composer().draft.content = "   ".to_string();

        assert!(matches!(
            section.submit_comment().await,
            Err(ComposerError::Invalid(_))
        ));
        assert_eq!(section.api.calls(), vec!["fetch 1"]);
    }
}
