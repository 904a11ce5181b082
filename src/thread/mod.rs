//! Per-thread UI state and the recursive comment view.
//!
//! `ThreadState` is owned by whoever renders the whole tree and passed down
//! to every node, so there is exactly one open reply composer per tree.

use std::collections::BTreeSet;

use askama::Template;

use crate::avatar::avatar_url;
use crate::composer::Composer;
use crate::models::{CommentNode, is_web_url};
use crate::moderation::DELETE_PROMPT;

pub const DEFAULT_MAX_DEPTH: usize = 4;

pub const ANONYMOUS: &str = "Anonymous";

/// Roots are depth 0. Data may nest deeper; only composition is gated.
pub fn can_reply(depth: usize, max_depth: usize) -> bool {
    depth < max_depth
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadState {
    active_reply: Option<i64>,
    expanded: BTreeSet<i64>,
}

impl ThreadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds state from the `replyTo` / `expanded` query parameters.
    pub fn from_query(reply_to: Option<i64>, expanded: Option<&str>) -> Self {
        let expanded = expanded
            .unwrap_or_default()
            .split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect();
        Self {
            active_reply: reply_to,
            expanded,
        }
    }

    pub fn active_reply(&self) -> Option<i64> {
        self.active_reply
    }

    pub fn is_replying_to(&self, comment_id: i64) -> bool {
        self.active_reply == Some(comment_id)
    }

    /// Opens the composer on `comment_id`, closing any other one. Toggling
    /// the active target again closes it. Returns whether it is now open.
    pub fn toggle_reply(&mut self, comment_id: i64) -> bool {
        if self.is_replying_to(comment_id) {
            self.active_reply = None;
            false
        } else {
            self.active_reply = Some(comment_id);
            true
        }
    }

    pub fn close_reply(&mut self) {
        self.active_reply = None;
    }

    pub fn is_expanded(&self, comment_id: i64) -> bool {
        self.expanded.contains(&comment_id)
    }

    /// Expands `comment_id` without collapsing it when already open.
    pub fn expand(&mut self, comment_id: i64) {
        self.expanded.insert(comment_id);
    }

    /// Expanded ids as the comma-separated `expanded` parameter value.
    pub fn expanded_param(&self) -> String {
        let ids: Vec<String> = self.expanded.iter().map(i64::to_string).collect();
        ids.join(",")
    }

    pub fn toggle_replies(&mut self, comment_id: i64) -> bool {
        if self.expanded.remove(&comment_id) {
            false
        } else {
            self.expanded.insert(comment_id);
            true
        }
    }

    /// Query string encoding this state, `""` when nothing is open.
    pub fn to_query(&self) -> String {
        let mut params = Vec::new();
        if let Some(reply_to) = self.active_reply {
            params.push(format!("replyTo={reply_to}"));
        }
        if !self.expanded.is_empty() {
            params.push(format!("expanded={}", self.expanded_param()));
        }
        if params.is_empty() {
            String::new()
        } else {
            format!("?{}", params.join("&"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub max_depth: usize,
    pub admin: bool,
    pub avatar_base_url: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            admin: false,
            avatar_base_url: "https://www.gravatar.com/avatar".to_string(),
        }
    }
}

/// Label of the show/hide toggle; `None` when there is nothing to show.
pub fn toggle_label(reply_count: usize, expanded: bool) -> Option<String> {
    match (reply_count, expanded) {
        (0, _) => None,
        (_, true) => Some("Hide replies".to_string()),
        (1, false) => Some("Show 1 reply".to_string()),
        (n, false) => Some(format!("Show {n} replies")),
    }
}

pub fn count_label(count: usize) -> String {
    match count {
        1 => "1 comment".to_string(),
        n => format!("{n} comments"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub id: i64,
    pub depth: usize,
    pub author: String,
    pub author_url: Option<String>,
    pub avatar_url: String,
    pub content: String,
    pub posted_at: String,
    pub created_at_iso: String,
    pub approved: bool,
    pub can_reply: bool,
    pub replying: bool,
    pub reply_count: usize,
    pub toggle_label: Option<String>,
    pub expanded: bool,
    pub show_moderation: bool,
    /// Only populated while expanded.
    pub replies: Vec<CommentView>,
}

/// Display name of a node's author, falling back to `ANONYMOUS`.
pub fn display_name(node: &CommentNode) -> String {
    node.comment
        .author_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

pub fn build_view(
    node: &CommentNode,
    depth: usize,
    state: &ThreadState,
    options: &RenderOptions,
) -> CommentView {
    let comment = &node.comment;
    let reply_count = node.reply_count();
    let expanded = reply_count > 0 && state.is_expanded(comment.id);
    let can_reply = can_reply(depth, options.max_depth);

    let replies = if expanded {
        node.replies
            .iter()
            .map(|reply| build_view(reply, depth + 1, state, options))
            .collect()
    } else {
        Vec::new()
    };

    CommentView {
        id: comment.id,
        depth,
        author: display_name(node),
        author_url: comment.author_url.clone().filter(|url| is_web_url(url)),
        avatar_url: comment.avatar_url.clone().unwrap_or_else(|| {
            avatar_url(comment.author_email.as_deref(), &options.avatar_base_url)
        }),
        content: comment.content.clone(),
        posted_at: comment.created_at.format("%b %-d, %Y %H:%M").to_string(),
        created_at_iso: comment.created_at.to_rfc3339(),
        approved: comment.approved,
        can_reply,
        replying: can_reply && state.is_replying_to(comment.id),
        reply_count,
        toggle_label: toggle_label(reply_count, expanded),
        expanded,
        show_moderation: options.admin,
        replies,
    }
}

#[derive(Template)]
#[template(path = "comment_node.html")]
struct CommentNodeTemplate<'a> {
    view: &'a CommentView,
    reply_href: String,
    toggle_href: String,
    moderate_href: String,
    reply_to: Option<i64>,
    expanded: String,
    delete_prompt: &'a str,
    composer_html: String,
    replies_html: String,
}

#[derive(Template)]
#[template(path = "composer.html")]
struct ComposerTemplate<'a> {
    article_id: i64,
    action: String,
    expanded: String,
    parent_id: Option<i64>,
    header: Option<String>,
    cancel_href: Option<String>,
    content: &'a str,
    author_name: &'a str,
    author_email: &'a str,
    author_url: &'a str,
    error: Option<&'a str>,
    confirmation: Option<&'a str>,
    busy: bool,
}

#[derive(Template)]
#[template(path = "comment_section.html")]
struct CommentSectionTemplate<'a> {
    article_id: i64,
    admin: bool,
    error: Option<&'a str>,
    notice: Option<&'a str>,
    count_label: String,
    composer_html: String,
    thread_html: String,
}

/// Renders one article's tree as HTML.
pub struct ThreadRenderer<'a> {
    pub article_id: i64,
    pub state: &'a ThreadState,
    pub options: &'a RenderOptions,
    /// Draft of the open reply, if the caller keeps one.
    pub reply_composer: Option<&'a Composer>,
}

impl ThreadRenderer<'_> {
    fn base_path(&self) -> String {
        format!("/articles/{}/comments", self.article_id)
    }

    fn href_with(&self, state: ThreadState) -> String {
        format!("{}{}", self.base_path(), state.to_query())
    }

    fn moderate_href(&self, comment_id: i64) -> String {
        format!("{}/{}/moderate", self.base_path(), comment_id)
    }

    pub fn views(&self, roots: &[CommentNode]) -> Vec<CommentView> {
        roots
            .iter()
            .map(|root| build_view(root, 0, self.state, self.options))
            .collect()
    }

    pub fn render_forest(&self, roots: &[CommentNode]) -> Result<String, askama::Error> {
        let mut html = String::new();
        for view in self.views(roots) {
            html.push_str(&self.render_view(&view)?);
        }
        Ok(html)
    }

    fn render_view(&self, view: &CommentView) -> Result<String, askama::Error> {
        let mut replies_html = String::new();
        for reply in &view.replies {
            replies_html.push_str(&self.render_view(reply)?);
        }

        let mut reply_state = self.state.clone();
        reply_state.toggle_reply(view.id);
        let mut toggle_state = self.state.clone();
        toggle_state.toggle_replies(view.id);

        let composer_html = if view.replying {
            let fallback;
            let composer = match self.reply_composer {
                Some(composer) => composer,
                None => {
                    fallback = Composer::reply(
                        self.article_id,
                        crate::composer::ReplyTarget {
                            comment_id: view.id,
                            author_name: view.author.clone(),
                        },
                    );
                    &fallback
                }
            };
            let mut closed = self.state.clone();
            closed.close_reply();
            self.render_composer(composer, Some(self.href_with(closed)))?
        } else {
            String::new()
        };

        CommentNodeTemplate {
            view,
            reply_href: self.href_with(reply_state),
            toggle_href: self.href_with(toggle_state),
            moderate_href: self.moderate_href(view.id),
            reply_to: self.state.active_reply(),
            expanded: self.state.expanded_param(),
            delete_prompt: DELETE_PROMPT,
            composer_html,
            replies_html,
        }
        .render()
    }

    pub fn render_composer(
        &self,
        composer: &Composer,
        cancel_href: Option<String>,
    ) -> Result<String, askama::Error> {
        ComposerTemplate {
            article_id: composer.article_id(),
            action: self.base_path(),
            expanded: self.state.expanded_param(),
            parent_id: composer.target().map(|target| target.comment_id),
            header: composer.header(),
            cancel_href,
            content: &composer.draft.content,
            author_name: &composer.draft.author_name,
            author_email: &composer.draft.author_email,
            author_url: &composer.draft.author_url,
            error: composer.error(),
            confirmation: composer.confirmation(),
            busy: composer.is_busy(),
        }
        .render()
    }
}

/// What the section shows: the tree, or an error panel instead of it.
pub enum SectionContent<'a> {
    Thread {
        roots: &'a [CommentNode],
        composer: &'a Composer,
        notice: Option<&'a str>,
    },
    Failed(&'a str),
}

pub fn render_section(
    renderer: &ThreadRenderer<'_>,
    content: SectionContent<'_>,
) -> Result<String, askama::Error> {
    match content {
        SectionContent::Failed(message) => CommentSectionTemplate {
            article_id: renderer.article_id,
            admin: renderer.options.admin,
            error: Some(message),
            notice: None,
            count_label: String::new(),
            composer_html: String::new(),
            thread_html: String::new(),
        }
        .render(),
        SectionContent::Thread {
            roots,
            composer,
            notice,
        } => CommentSectionTemplate {
            article_id: renderer.article_id,
            admin: renderer.options.admin,
            error: None,
            notice,
            count_label: count_label(crate::tree::count_comments(roots)),
            composer_html: renderer.render_composer(composer, None)?,
            thread_html: renderer.render_forest(roots)?,
        }
        .render(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::comment;
    use crate::tree::build_tree;

    fn chain(len: i64) -> Vec<CommentNode> {
        build_tree(
            (1..=len)
                .map(|id| comment(id, if id == 1 { None } else { Some(id - 1) }, true))
                .collect(),
        )
    }

    fn expand_all(len: i64) -> ThreadState {
        let mut state = ThreadState::new();
        for id in 1..=len {
            state.toggle_replies(id);
        }
        state
    }

    fn view_at_depth(view: &CommentView, depth: usize) -> &CommentView {
        let mut current = view;
        for _ in 0..depth {
            current = &current.replies[0];
        }
        current
    }

    #[test]
    fn reply_is_gated_at_max_depth() {
        assert!(can_reply(3, 4));
        assert!(!can_reply(4, 4));

        let roots = chain(6);
        let state = expand_all(6);
        let options = RenderOptions::default();
        let root = build_view(&roots[0], 0, &state, &options);

        assert!(view_at_depth(&root, 3).can_reply);
        assert!(!view_at_depth(&root, 4).can_reply);
        assert!(!view_at_depth(&root, 5).can_reply);
        assert_eq!(view_at_depth(&root, 5).depth, 5);
    }

    #[test]
    fn opening_a_reply_closes_the_previous_one() {
        let mut state = ThreadState::new();
        assert!(state.toggle_reply(1));
        assert!(state.toggle_reply(2));
        assert!(!state.is_replying_to(1));
        assert!(state.is_replying_to(2));

        assert!(!state.toggle_reply(2));
        assert_eq!(state.active_reply(), None);
    }

    #[test]
    fn replies_are_collapsed_by_default() {
        let roots = build_tree(vec![
            comment(1, None, true),
            comment(2, Some(1), true),
            comment(3, Some(2), true),
            comment(4, Some(1), true),
        ]);
        let options = RenderOptions::default();

        let collapsed = build_view(&roots[0], 0, &ThreadState::new(), &options);
        assert!(!collapsed.expanded);
        assert!(collapsed.replies.is_empty());
        assert_eq!(collapsed.reply_count, 3);
        assert_eq!(collapsed.toggle_label.as_deref(), Some("Show 3 replies"));

        let mut state = ThreadState::new();
        state.toggle_replies(1);
        let open = build_view(&roots[0], 0, &state, &options);
        assert_eq!(open.toggle_label.as_deref(), Some("Hide replies"));
        assert_eq!(open.replies.len(), 2);
        assert_eq!(open.replies[0].toggle_label.as_deref(), Some("Show 1 reply"));
        assert_eq!(open.replies[1].toggle_label, None);
    }

    #[test]
    fn moderation_controls_follow_admin_context() {
        let roots = chain(1);
        let state = ThreadState::new();
        let public = build_view(&roots[0], 0, &state, &RenderOptions::default());
        assert!(!public.show_moderation);

        let admin = RenderOptions {
            admin: true,
            ..RenderOptions::default()
        };
        assert!(build_view(&roots[0], 0, &state, &admin).show_moderation);
    }

    #[test]
    fn missing_author_renders_anonymous() {
        let mut row = comment(1, None, true);
        row.author_name = Some("  ".to_string());
        let node = CommentNode::leaf(row);
        assert_eq!(display_name(&node), ANONYMOUS);
    }

    #[test]
    fn query_round_trips_state() {
        let mut state = ThreadState::new();
        assert_eq!(state.to_query(), "");
        state.toggle_reply(7);
        state.toggle_replies(3);
        state.toggle_replies(1);
        assert_eq!(state.to_query(), "?replyTo=7&expanded=1,3");

        let parsed = ThreadState::from_query(Some(7), Some("1, 3,x"));
        assert_eq!(parsed, state);
    }

    #[test]
    fn rendered_thread_escapes_content_and_shows_composer() {
        let mut row = comment(1, None, false);
        row.content = "<script>alert(1)</script>".to_string();
        let roots = build_tree(vec![row]);

        let mut state = ThreadState::new();
        state.toggle_reply(1);
        let options = RenderOptions {
            admin: true,
            ..RenderOptions::default()
        };
        let renderer = ThreadRenderer {
            article_id: 1,
            state: &state,
            options: &options,
            reply_composer: None,
        };

        let html = renderer.render_forest(&roots).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Replying to fan1"));
        assert!(html.contains(r#"name="parentId" value="1""#));
        assert!(html.contains(r#"action="/articles/1/comments/1/moderate""#));
        assert!(html.contains(r#"name="action" value="approve""#));
        assert!(html.contains(r#"<input type="hidden" name="replyTo" value="1">"#));
        assert!(html.contains("Pending"));
    }

    #[test]
    fn author_links_are_limited_to_web_urls() {
        let mut hostile = comment(1, None, true);
        hostile.author_url = Some("javascript:alert(document.cookie)".to_string());
        let mut linked = comment(2, None, true);
        linked.author_url = Some("https://club.example".to_string());
        let roots = build_tree(vec![hostile, linked]);

        let state = ThreadState::new();
        let options = RenderOptions::default();
        let views: Vec<CommentView> = roots
            .iter()
            .map(|root| build_view(root, 0, &state, &options))
            .collect();
        assert_eq!(views[0].author_url, None);
        assert_eq!(views[1].author_url.as_deref(), Some("https://club.example"));

        let renderer = ThreadRenderer {
            article_id: 1,
            state: &state,
            options: &options,
            reply_composer: None,
        };
        let html = renderer.render_forest(&roots).unwrap();
        assert!(!html.contains("javascript:"));
        assert!(html.contains(r#"<span class="comment__author">fan1</span>"#));
    }

    #[test]
    fn server_avatar_wins_over_email() {
        let mut row = comment(1, None, true);
        row.author_email = None;
        row.avatar_url = Some("https://avatars.example/abc".to_string());
        let view = build_view(
            &CommentNode::leaf(row),
            0,
            &ThreadState::new(),
            &RenderOptions::default(),
        );
        assert_eq!(view.avatar_url, "https://avatars.example/abc");
    }

    #[test]
    fn composer_posts_back_to_the_page() {
        let mut state = ThreadState::new();
        state.toggle_replies(4);
        state.expand(9);
        state.expand(9);
        assert_eq!(state.expanded_param(), "4,9");

        let options = RenderOptions::default();
        let renderer = ThreadRenderer {
            article_id: 3,
            state: &state,
            options: &options,
            reply_composer: None,
        };
        let html = renderer.render_composer(&Composer::new(3), None).unwrap();
        assert!(html.contains(r#"action="/articles/3/comments""#));
        assert!(html.contains(r#"<input type="hidden" name="expanded" value="4,9">"#));
    }

    #[test]
    fn failed_section_shows_only_the_error_panel() {
        let state = ThreadState::new();
        let options = RenderOptions::default();
        let renderer = ThreadRenderer {
            article_id: 1,
            state: &state,
            options: &options,
            reply_composer: None,
        };

        let html = render_section(&renderer, SectionContent::Failed("Could not load comments"))
            .unwrap();
        assert!(html.contains("Could not load comments"));
        assert!(!html.contains("<form"));
        assert!(!html.contains("comments</h2>"));
    }

    #[test]
    fn section_shows_total_count() {
        let roots = build_tree(vec![comment(1, None, true), comment(2, Some(1), true)]);
        let state = ThreadState::new();
        let options = RenderOptions::default();
        let renderer = ThreadRenderer {
            article_id: 1,
            state: &state,
            options: &options,
            reply_composer: None,
        };
        let composer = Composer::new(1);

        let html = render_section(
            &renderer,
            SectionContent::Thread {
                roots: &roots,
                composer: &composer,
                notice: None,
            },
        )
        .unwrap();
        assert!(html.contains("2 comments"));
        assert!(html.contains("Show 1 reply"));
        assert!(html.contains(r#"href="/articles/1/comments?expanded=1""#));
    }
}
