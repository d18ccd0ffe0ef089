//! Location strings to sources.
//!
//! | Location                       | Backend                              |
//! |--------------------------------|--------------------------------------|
//! | `path`, `path?filter=glob`     | [`FileSystem`]                       |
//! | `file://path?filter=glob`      | [`FileSystem`]                       |
//! | `git+http(s)://host/repo`      | [`Git`] cloned over `http(s)`        |
//! | `http(s)://host/file.fql`      | [`Http`]                             |

use std::sync::Arc;

use reqwest::Url;
use tracing::debug;

use super::aggregate::Aggregate;
use super::error::{SourceError, SourceResult};
use super::fs::FileSystem;
use super::git::Git;
use super::http::Http;
use super::noop::Noop;
use super::Source;

const FILTER_PARAM: &str = "filter";

/// Build one logical source from zero or more locations.
pub fn new<S: AsRef<str>>(locations: &[S]) -> SourceResult<Arc<dyn Source>> {
    match locations {
        [] => Ok(Arc::new(Noop)),
        [location] => create(location.as_ref()),
        many => {
            let mut aggregate = Aggregate::default();

            for location in many {
                aggregate.add(create(location.as_ref())?);
            }

            Ok(Arc::new(aggregate))
        }
    }
}

/// Build the backend for a single location.
pub fn create(location: &str) -> SourceResult<Arc<dyn Source>> {
    debug!(location, "creating source");

    if !location.contains("://") {
        let (path, filter) = split_bare_filter(location);
        return Ok(Arc::new(FileSystem::new(path, filter.as_deref())?));
    }

    let mut url = Url::parse(location).map_err(|e| SourceError::InvalidLocation {
        location: location.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "file" => {
            let filter = take_filter(&mut url);
            // `file://relative/dir` puts the first segment in the host.
            let path = match url.host_str() {
                Some(host) if !host.is_empty() => format!("{host}{}", url.path()),
                _ => url.path().to_string(),
            };
            Ok(Arc::new(FileSystem::new(path, filter.as_deref())?))
        }
        "git+http" | "git+https" => {
            let filter = take_filter(&mut url);
            let clone_url = location_without_git_prefix(&url);
            Ok(Arc::new(Git::new(clone_url, filter.as_deref())?))
        }
        "http" | "https" => Ok(Arc::new(Http::new(url)?)),
        other => Err(SourceError::UnknownScheme(other.to_string())),
    }
}

fn split_bare_filter(location: &str) -> (&str, Option<String>) {
    let Some((path, query)) = location.split_once('?') else {
        return (location, None);
    };

    let filter = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == FILTER_PARAM)
        .map(|(_, value)| value.to_string());

    (path, filter)
}

/// Remove `filter` from the query string and return its value.
fn take_filter(url: &mut Url) -> Option<String> {
    let mut filter = None;
    let rest: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, value)| {
            if key == FILTER_PARAM {
                filter = Some(value.into_owned());
                None
            } else {
                Some((key.into_owned(), value.into_owned()))
            }
        })
        .collect();

    if rest.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(rest);
    }

    filter
}

/// `git+https://host/repo` becomes `https://host/repo`.
fn location_without_git_prefix(url: &Url) -> String {
    let rendered = url.to_string();
    rendered
        .strip_prefix("git+")
        .map(str::to_string)
        .unwrap_or(rendered)
}
