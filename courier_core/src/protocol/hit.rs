/*!
 * Delivery units ("hits").
 *
 * A `Hit` is one logical telemetry record. It remembers when it was created
 * so that the queue time (`qt`) reported on the wire reflects how long it sat
 * in the delivery queue, including retries.
 *
 * Serialization produces an ordered list of key/value pairs:
 *
 * ```text
 * v=1 cid=<user> qt=<ms> [ul=<lang>] t=<kind> <kind fields...> tid=<tracking id>
 * ```
 */
use std::fmt::Display;
use std::time::{Duration, Instant};

use super::constants::PROTOCOL_VERSION;

// ---------------------------------------------------------------------------
// HitKind
// ---------------------------------------------------------------------------

/**
 * Kind-specific payload of a hit.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitKind {
    /// A page view: title (`dt`), host (`dh`) and path (`dp`).
    PageView {
        title: String,
        host: String,
        path: String,
    },

    /// A generic event: category (`ec`), action (`ea`) and the optional
    /// label (`el`) and value (`ev`).
    Event {
        category: String,
        action: String,
        label: Option<String>,
        value: Option<u64>,
    },

    /// An error shown to (or hit by) the user: description (`exd`) and
    /// whether it was fatal (`exf`).
    Exception { description: String, fatal: bool },
}

impl HitKind {
    /// Value of the `t` parameter.
    pub fn hit_type(&self) -> &'static str {
        match self {
            HitKind::PageView { .. } => "pageview",
            HitKind::Event { .. } => "event",
            HitKind::Exception { .. } => "exception",
        }
    }
}

// ---------------------------------------------------------------------------
// Hit
// ---------------------------------------------------------------------------

/**
 * One delivery unit.
 *
 * Built with [`Hit::page_view`], [`Hit::event`] or [`Hit::exception`] and
 * handed to a `DeliveryQueue`. The attempt counter starts at zero and is
 * only advanced by the queue when a dispatch fails.
 */
#[derive(Debug, Clone)]
pub struct Hit {
    created: Instant,
    user_id: String,
    lang: Option<String>,
    pub(crate) attempts: u32,
    kind: HitKind,
}

impl Hit {
    fn new(user_id: impl Display, kind: HitKind) -> Self {
        Self {
            created: Instant::now(),
            user_id: user_id.to_string(),
            lang: None,
            attempts: 0,
            kind,
        }
    }

    /// Creates a page-view hit.
    pub fn page_view(
        user_id: impl Display,
        title: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::new(
            user_id,
            HitKind::PageView {
                title: title.into(),
                host: host.into(),
                path: path.into(),
            },
        )
    }

    /// Creates a generic event hit.
    pub fn event(
        user_id: impl Display,
        category: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::new(
            user_id,
            HitKind::Event {
                category: category.into(),
                action: action.into(),
                label: None,
                value: None,
            },
        )
    }

    /// Creates an exception hit.
    pub fn exception(user_id: impl Display, description: impl Into<String>, fatal: bool) -> Self {
        Self::new(
            user_id,
            HitKind::Exception {
                description: description.into(),
                fatal,
            },
        )
    }

    /// Sets the locale tag (`ul`), e.g. `"en-us"`.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Sets the event label. Ignored for non-event hits.
    pub fn with_label(mut self, new_label: impl Into<String>) -> Self {
        if let HitKind::Event { label, .. } = &mut self.kind {
            *label = Some(new_label.into());
        }
        self
    }

    /// Sets the event value. Ignored for non-event hits.
    pub fn with_value(mut self, new_value: u64) -> Self {
        if let HitKind::Event { value, .. } = &mut self.kind {
            *value = Some(new_value);
        }
        self
    }

    pub fn kind(&self) -> &HitKind {
        &self.kind
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    /// Number of failed delivery attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time elapsed since the hit was created.
    pub fn queue_time(&self) -> Duration {
        self.created.elapsed()
    }

    /**
     * Serializes the hit into wire pairs, appending `tid=<tracking_id>`.
     *
     * `qt` is computed at call time, so each retry reports the updated
     * queue time.
     */
    pub fn to_pairs(&self, tracking_id: &str) -> Vec<(String, String)> {
        self.pairs_at(tracking_id, Instant::now())
    }

    pub(crate) fn pairs_at(&self, tracking_id: &str, now: Instant) -> Vec<(String, String)> {
        let queue_ms = now.saturating_duration_since(self.created).as_millis();

        let mut pairs = vec![
            pair("v", PROTOCOL_VERSION),
            pair("cid", &self.user_id),
            pair("qt", queue_ms.to_string()),
        ];
        if let Some(lang) = &self.lang {
            pairs.push(pair("ul", lang));
        }
        pairs.push(pair("t", self.kind.hit_type()));

        match &self.kind {
            HitKind::PageView { title, host, path } => {
                pairs.push(pair("dt", title));
                pairs.push(pair("dh", host));
                pairs.push(pair("dp", path));
            }
            HitKind::Event {
                category,
                action,
                label,
                value,
            } => {
                pairs.push(pair("ec", category));
                pairs.push(pair("ea", action));
                if let Some(label) = label {
                    pairs.push(pair("el", label));
                }
                if let Some(value) = value {
                    pairs.push(pair("ev", value.to_string()));
                }
            }
            HitKind::Exception { description, fatal } => {
                pairs.push(pair("exd", description));
                pairs.push(pair("exf", if *fatal { "1" } else { "0" }));
            }
        }

        pairs.push(pair("tid", tracking_id));
        pairs
    }
}

fn pair(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(pairs: &[(String, String)]) -> Vec<&str> {
        pairs.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_page_view_pairs() {
        let hit = Hit::page_view(42, "Home", "example.com", "/");
        let pairs = hit.pairs_at("UA-1", hit.created + Duration::from_millis(1500));

        assert_eq!(
            keys(&pairs),
            ["v", "cid", "qt", "t", "dt", "dh", "dp", "tid"]
        );
        assert_eq!(pairs[1].1, "42");
        assert_eq!(pairs[2].1, "1500");
        assert_eq!(pairs[3].1, "pageview");
        assert_eq!(pairs[7].1, "UA-1");
    }

    #[test]
    fn test_event_with_lang_label_value() {
        let hit = Hit::event("u7", "video", "play")
            .with_lang("en-us")
            .with_label("intro")
            .with_value(3);
        let pairs = hit.to_pairs("UA-1");

        assert_eq!(
            keys(&pairs),
            ["v", "cid", "qt", "ul", "t", "ec", "ea", "el", "ev", "tid"]
        );
        assert_eq!(pairs[3].1, "en-us");
        assert_eq!(pairs[4].1, "event");
        assert_eq!(pairs[8].1, "3");
    }

    #[test]
    fn test_label_ignored_for_page_view() {
        let hit = Hit::page_view(1, "t", "h", "/").with_label("x").with_value(9);
        assert!(matches!(hit.kind(), HitKind::PageView { .. }));
        assert!(!keys(&hit.to_pairs("UA-1")).contains(&"el"));
    }

    #[test]
    fn test_exception_pairs() {
        let hit = Hit::exception(1, "boom", true);
        let pairs = hit.to_pairs("UA-1");
        assert!(pairs.contains(&("t".into(), "exception".into())));
        assert!(pairs.contains(&("exd".into(), "boom".into())));
        assert!(pairs.contains(&("exf".into(), "1".into())));
    }

    #[test]
    fn test_new_hit_has_no_attempts() {
        assert_eq!(Hit::event(1, "c", "a").attempts(), 0);
    }
}
