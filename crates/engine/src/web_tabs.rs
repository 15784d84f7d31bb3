//! Browser-tab snapshots frozen into a message's context at send time.
//!
//! Tabs are deduplicated by normalized URL. At most one tab in a snapshot is
//! marked active, and only when the active tab was requested explicitly or
//! through the [`ACTIVE_WEB_TAB_MARKER`] in the message text.

use std::collections::{HashMap, HashSet};

use contextweave_core::{ActiveTabProvider, MessageContext, WebTab};
use tracing::{debug, warn};
use url::Url;

/// Placeholder that asks for the active browser tab to be attached.
pub const ACTIVE_WEB_TAB_MARKER: &str = "{activeWebTab}";

/// Normalize a URL for comparison.
///
/// Drops the fragment and any trailing slash. Scheme and host come out
/// lowercase. Strings that do not parse as URLs get the same treatment
/// textually.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let normalized = match Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => raw.split('#').next().unwrap_or(raw).to_string(),
    };
    normalized.trim_end_matches('/').to_string()
}

/// Whether the active tab should be captured for this text.
pub fn should_include_active_tab(requested: bool, text: &str) -> bool {
    requested || text.contains(ACTIVE_WEB_TAB_MARKER)
}

/// Deduplicate tabs by normalized URL and clear every active flag.
///
/// The first occurrence of each URL wins. Tabs with an empty URL are dropped.
pub fn sanitize_web_tabs(tabs: &[WebTab]) -> Vec<WebTab> {
    let mut seen = HashSet::new();
    tabs.iter()
        .filter(|tab| !tab.url.trim().is_empty())
        .filter(|tab| seen.insert(normalize_url(&tab.url)))
        .map(|tab| WebTab {
            is_active: false,
            ..tab.clone()
        })
        .collect()
}

/// Build the tab snapshot for a message about to be sent.
///
/// The active tab is skipped when any selected text came from a web page,
/// since that selection already pins the page. Provider failures are logged
/// and the sanitized list is returned unchanged.
pub async fn inject_active_tab(
    existing: &[WebTab],
    include_active: bool,
    context: &MessageContext,
    provider: &dyn ActiveTabProvider,
) -> Vec<WebTab> {
    let mut tabs = sanitize_web_tabs(existing);
    if !include_active || context.has_web_sourced_selection() {
        return tabs;
    }

    let live = match provider.active_tab().await {
        Ok(Some(tab)) if !tab.url.trim().is_empty() => tab,
        Ok(_) => return tabs,
        Err(e) => {
            warn!(error = %e, "Failed to read the active browser tab");
            return tabs;
        }
    };

    let index: HashMap<String, usize> = tabs
        .iter()
        .enumerate()
        .map(|(i, tab)| (normalize_url(&tab.url), i))
        .collect();

    match index.get(&normalize_url(&live.url)) {
        Some(&i) => {
            let tab = &mut tabs[i];
            tab.url = live.url;
            if live.title.is_some() {
                tab.title = live.title;
            }
            if live.favicon_url.is_some() {
                tab.favicon_url = live.favicon_url;
            }
            tab.is_active = true;
        }
        None => tabs.push(WebTab {
            is_active: true,
            ..live
        }),
    }

    debug!(tabs = tabs.len(), "Active tab captured");
    tabs
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use contextweave_core::{ContextError, NoActiveTab, SelectedTextContext, SelectedTextSource};

    struct FixedTab(Option<WebTab>);

    #[async_trait]
    impl ActiveTabProvider for FixedTab {
        async fn active_tab(&self) -> Result<Option<WebTab>, ContextError> {
            Ok(self.0.clone())
        }
    }

    fn active(tabs: &[WebTab]) -> Vec<&str> {
        tabs.iter()
            .filter(|t| t.is_active)
            .map(|t| t.url.as_str())
            .collect()
    }

    #[test]
    fn normalize_strips_fragment_and_trailing_slash() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/docs/#intro"),
            "https://example.com/docs"
        );
        assert_eq!(normalize_url("https://example.com/"), "https://example.com");
        assert_eq!(normalize_url("not a url/#x"), "not a url");
    }

    #[test]
    fn marker_requests_active_tab() {
        assert!(should_include_active_tab(false, "summarize {activeWebTab}"));
        assert!(should_include_active_tab(true, "plain"));
        assert!(!should_include_active_tab(false, "plain"));
    }

    #[test]
    fn sanitize_dedupes_and_clears_active() {
        let mut first = WebTab::new("https://a.com/page").with_title("A");
        first.is_active = true;
        let tabs = vec![
            first,
            WebTab::new("https://a.com/page/#section"),
            WebTab::new("  "),
            WebTab::new("https://b.com"),
        ];
        let clean = sanitize_web_tabs(&tabs);

        assert_eq!(clean.len(), 2);
        assert_eq!(clean[0].title.as_deref(), Some("A"));
        assert!(clean.iter().all(|t| !t.is_active));
    }

    #[tokio::test]
    async fn live_tab_merges_into_existing() {
        let existing = vec![WebTab::new("https://a.com/page").with_title("Old")];
        let mut live = WebTab::new("https://a.com/page#top").with_title("Fresh");
        live.favicon_url = Some("https://a.com/icon.png".into());
        let provider = FixedTab(Some(live));

        let tabs = inject_active_tab(&existing, true, &MessageContext::default(), &provider).await;

        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].url, "https://a.com/page#top");
        assert_eq!(tabs[0].title.as_deref(), Some("Fresh"));
        assert_eq!(tabs[0].favicon_url.as_deref(), Some("https://a.com/icon.png"));
        assert!(tabs[0].is_active);
    }

    #[tokio::test]
    async fn live_tab_appended_when_new() {
        let mut stale = WebTab::new("https://a.com");
        stale.is_active = true;
        let provider = FixedTab(Some(WebTab::new("https://b.com")));

        let tabs = inject_active_tab(&[stale], true, &MessageContext::default(), &provider).await;

        assert_eq!(tabs.len(), 2);
        assert_eq!(active(&tabs), ["https://b.com"]);
    }

    #[tokio::test]
    async fn not_requested_leaves_tabs_inactive() {
        let provider = FixedTab(Some(WebTab::new("https://b.com")));
        let tabs = inject_active_tab(
            &[WebTab::new("https://a.com")],
            false,
            &MessageContext::default(),
            &provider,
        )
        .await;
        assert_eq!(tabs.len(), 1);
        assert!(active(&tabs).is_empty());
    }

    #[tokio::test]
    async fn web_selection_suppresses_active_tab() {
        let context = MessageContext::default().with_selected_text(vec![SelectedTextContext {
            id: "s1".into(),
            content: "quoted".into(),
            source: SelectedTextSource::Web {
                url: "https://b.com".into(),
                title: None,
            },
        }]);
        let provider = FixedTab(Some(WebTab::new("https://b.com")));

        let tabs = inject_active_tab(&[], true, &context, &provider).await;
        assert!(tabs.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_returns_sanitized_tabs() {
        let existing = vec![WebTab::new("https://a.com"), WebTab::new("https://a.com/")];
        let tabs = inject_active_tab(&existing, true, &MessageContext::default(), &NoActiveTab).await;
        assert_eq!(tabs.len(), 1);
        assert!(active(&tabs).is_empty());
    }
}
