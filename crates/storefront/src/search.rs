//! Search-box autocomplete.
//!
//! Keystrokes are debounced and only the newest query's results are ever
//! returned: a slow response for an older query is dropped even if it
//! arrives after a newer one was sent.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, instrument};

use crate::catalog::{ProductFilters, Suggestion};
use crate::debounce::Debouncer;
use crate::error::Result;

/// Shorter queries show no suggestions.
pub const MIN_QUERY_CHARS: usize = 2;

/// Suggestions shown at most.
pub const MAX_SUGGESTIONS: usize = 8;

/// Where suggestions come from.
pub trait SuggestionSource: Send + Sync {
    /// `GET /api/search/autocomplete?q=`
    fn suggestions(&self, query: &str) -> impl Future<Output = Result<Vec<Suggestion>>> + Send;
}

/// What a keystroke produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutocompleteOutcome {
    /// Below the minimum length; the dropdown should close.
    TooShort,
    /// A newer keystroke took over.
    Superseded,
    Suggestions(Vec<Suggestion>),
}

/// Debounced, latest-wins autocomplete.
pub struct Autocomplete<S> {
    source: Arc<S>,
    debouncer: Debouncer<()>,
    generation: AtomicU64,
}

impl<S: SuggestionSource> Autocomplete<S> {
    pub fn new(source: Arc<S>, debounce: Duration) -> Self {
        Self {
            source,
            debouncer: Debouncer::new(debounce),
            generation: AtomicU64::new(0),
        }
    }

    /// Handle the search box's current text.
    ///
    /// # Errors
    ///
    /// Returns the backend error for the query that won the debounce.
    #[instrument(skip(self))]
    pub async fn input(&self, text: &str) -> Result<AutocompleteOutcome> {
        let query = text.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            self.debouncer.cancel(&());
            self.generation.fetch_add(1, Ordering::SeqCst);
            return Ok(AutocompleteOutcome::TooShort);
        }

        if !self.debouncer.settle(()).await {
            return Ok(AutocompleteOutcome::Superseded);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut suggestions = self.source.suggestions(query).await?;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(query, "Dropping stale suggestions");
            return Ok(AutocompleteOutcome::Superseded);
        }

        suggestions.truncate(MAX_SUGGESTIONS);
        Ok(AutocompleteOutcome::Suggestions(suggestions))
    }
}

/// Query string for the full results page of a search.
#[must_use]
pub fn results_query(text: &str) -> String {
    let filters = ProductFilters {
        search: Some(text.trim().to_string()).filter(|s| !s.is_empty()),
        ..ProductFilters::default()
    };
    filters.to_query_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use inkcartridges_core::ProductId;

    use super::*;

    /// Answers after a per-query delay and records what was asked.
    #[derive(Default)]
    struct SlowSource {
        asked: Mutex<Vec<String>>,
    }

    impl SuggestionSource for SlowSource {
        async fn suggestions(&self, query: &str) -> Result<Vec<Suggestion>> {
            self.asked.lock().unwrap().push(query.to_string());
            let delay = if query == "hp" { 1_000 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok((0..12)
                .map(|n| Suggestion {
                    id: ProductId::new(format!("{query}-{n}")),
                    name: format!("{query} {n}"),
                    sku: None,
                    image_url: None,
                    price: None,
                })
                .collect())
        }
    }

    fn autocomplete() -> (Arc<SlowSource>, Autocomplete<SlowSource>) {
        let source = Arc::new(SlowSource::default());
        let ac = Autocomplete::new(Arc::clone(&source), Duration::from_millis(300));
        (source, ac)
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_query_sends_nothing() {
        let (source, ac) = autocomplete();
        assert_eq!(ac.input(" h ").await.unwrap(), AutocompleteOutcome::TooShort);
        assert!(source.asked.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_burst_sends_last_query_only() {
        let (source, ac) = autocomplete();
        let (a, b, c) = tokio::join!(
            ac.input("hp"),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                ac.input("hp 6").await
            },
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                ac.input("hp 65").await
            },
        );
        assert_eq!(a.unwrap(), AutocompleteOutcome::Superseded);
        assert_eq!(b.unwrap(), AutocompleteOutcome::Superseded);
        match c.unwrap() {
            AutocompleteOutcome::Suggestions(s) => assert_eq!(s.len(), MAX_SUGGESTIONS),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(*source.asked.lock().unwrap(), vec!["hp 65".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_older_response_is_dropped() {
        let (_, ac) = autocomplete();
        let (slow, fast) = tokio::join!(ac.input("hp"), async {
            // After "hp" was sent, before its response arrives.
            tokio::time::sleep(Duration::from_millis(400)).await;
            ac.input("canon").await
        });
        assert_eq!(slow.unwrap(), AutocompleteOutcome::Superseded);
        assert!(matches!(fast.unwrap(), AutocompleteOutcome::Suggestions(_)));
    }

    #[test]
    fn test_results_query() {
        assert_eq!(results_query(" hp 65 "), "q=hp+65");
        assert_eq!(results_query(""), "");
    }
}
