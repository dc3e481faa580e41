//! Call targets, query parameters and URL resolution.

use std::fmt;
use std::sync::Arc;
use url::Url;

/// A value, or a producer invoked afresh for every attempt.
///
/// Producers let retries observe changing state, such as a cursor the caller
/// advances between attempts.
///
/// ```
/// use ricochet::Resolvable;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let page = Arc::new(AtomicUsize::new(1));
/// let counter = Arc::clone(&page);
/// let target: Resolvable<String> =
///     Resolvable::from_fn(move || format!("/items?page={}", counter.load(Ordering::SeqCst)));
///
/// assert_eq!(target.resolve(), "/items?page=1");
/// page.store(2, Ordering::SeqCst);
/// assert_eq!(target.resolve(), "/items?page=2");
/// ```
pub enum Resolvable<T> {
    /// A fixed value.
    Value(T),
    /// A producer called once per attempt.
    Producer(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone> Resolvable<T> {
    /// Wraps a producer.
    pub fn from_fn(f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Resolvable::Producer(Arc::new(f))
    }

    /// Returns the value, invoking the producer if there is one.
    pub fn resolve(&self) -> T {
        match self {
            Resolvable::Value(value) => value.clone(),
            Resolvable::Producer(f) => f(),
        }
    }
}

impl<T: Clone> Clone for Resolvable<T> {
    fn clone(&self) -> Self {
        match self {
            Resolvable::Value(value) => Resolvable::Value(value.clone()),
            Resolvable::Producer(f) => Resolvable::Producer(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolvable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolvable::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolvable::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

impl<T: Default> Default for Resolvable<T> {
    fn default() -> Self {
        Resolvable::Value(T::default())
    }
}

/// A call target: an absolute URL, or a path relative to the client's base URL.
pub type Target = Resolvable<String>;

impl From<&str> for Target {
    fn from(target: &str) -> Self {
        Resolvable::Value(target.to_string())
    }
}

impl From<String> for Target {
    fn from(target: String) -> Self {
        Resolvable::Value(target)
    }
}

impl From<&String> for Target {
    fn from(target: &String) -> Self {
        Resolvable::Value(target.clone())
    }
}

impl From<Url> for Target {
    fn from(url: Url) -> Self {
        Resolvable::Value(url.into())
    }
}

/// Flat query parameters. Pairs with a `None` value are omitted.
pub type Query = Vec<(String, Option<String>)>;

/// Resolves `target` against `base` and appends the query pairs in order.
///
/// An absolute `target` ignores `base`. A relative one is appended to the
/// base path, so `https://api.test/v1` + `users` gives `https://api.test/v1/users`.
///
/// ```
/// use ricochet::target::build_url;
/// use url::Url;
///
/// let base = Url::parse("https://api.test/v1").unwrap();
/// let query = vec![
///     ("page".to_string(), Some("2".to_string())),
///     ("filter".to_string(), None),
/// ];
/// let url = build_url(Some(&base), "/users", &[], &query).unwrap();
/// assert_eq!(url.as_str(), "https://api.test/v1/users?page=2");
/// ```
pub fn build_url(
    base: Option<&Url>,
    target: &str,
    base_query: &[(String, Option<String>)],
    query: &[(String, Option<String>)],
) -> Result<Url, url::ParseError> {
    let mut url = match (Url::parse(target), base) {
        (Ok(absolute), _) => absolute,
        (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => {
            let mut base = base.clone();
            if !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
            base.join(target.trim_start_matches('/'))?
        }
        (Err(e), _) => return Err(e),
    };

    let pairs: Vec<(&str, &str)> = base_query
        .iter()
        .chain(query)
        .filter_map(|(key, value)| value.as_deref().map(|v| (key.as_str(), v)))
        .collect();
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(key: &str, value: &str) -> (String, Option<String>) {
        (key.to_string(), Some(value.to_string()))
    }

    #[test]
    fn relative_targets_extend_base_path() {
        let base = Url::parse("https://api.test/v1/").unwrap();
        let url = build_url(Some(&base), "hello", &[], &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.test/v1/hello");

        let base = Url::parse("https://api.test").unwrap();
        let url = build_url(Some(&base), "/hello", &[], &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.test/hello");
    }

    #[test]
    fn absolute_targets_ignore_base() {
        let base = Url::parse("https://api.test/v1").unwrap();
        let url = build_url(Some(&base), "https://other.test/x", &[], &[]).unwrap();
        assert_eq!(url.as_str(), "https://other.test/x");
    }

    #[test]
    fn relative_target_without_base_fails() {
        assert!(build_url(None, "/hello", &[], &[]).is_err());
    }

    #[test]
    fn query_merges_and_keeps_existing() {
        let base = Url::parse("https://api.test").unwrap();
        let url = build_url(
            Some(&base),
            "/search?q=rust",
            &[pair("key", "k")],
            &[pair("page", "1"), ("skip".to_string(), None)],
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://api.test/search?q=rust&key=k&page=1");
    }

    #[test]
    fn producers_are_invoked_each_time() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let target: Target = Resolvable::from_fn(move || {
            format!("/n/{}", counter.fetch_add(1, Ordering::SeqCst))
        });
        assert_eq!(target.resolve(), "/n/0");
        assert_eq!(target.clone().resolve(), "/n/1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
