//! Picks the entries of an archive worth downloading.

use std::collections::HashSet;

use super::parse::{get_header, Entry};

/// One resource to fetch, with the index of the entry it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub index: usize,
    pub url: String,
    pub cookie: Option<String>,
}

/// Every entry that looks like a real download (200/206 with a
/// `Content-Length`), first occurrence per URL. Archives without such an
/// entry yield the end of the recorded redirect chain instead.
pub fn select_resources(entries: &[Entry], with_cookies: bool) -> Vec<Resource> {
    let mut seen = HashSet::new();
    let mut picked: Vec<Resource> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| looks_like_download(e))
        .filter(|(_, e)| seen.insert(e.request.url.as_str()))
        .map(|(i, e)| resource(i, e, with_cookies))
        .collect();
    if picked.is_empty() {
        if let Some(i) = redirect_chain_end(entries) {
            picked.push(resource(i, &entries[i], with_cookies));
        }
    }
    picked
}

fn resource(index: usize, entry: &Entry, with_cookies: bool) -> Resource {
    let cookie = with_cookies
        .then(|| get_header(&entry.request.headers, "Cookie"))
        .flatten()
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Resource {
        index,
        url: entry.request.url.clone(),
        cookie,
    }
}

fn looks_like_download(entry: &Entry) -> bool {
    matches!(entry.response.status, 200 | 206)
        && get_header(&entry.response.headers, "Content-Length").is_some()
}

/// Follows recorded redirects from the first entry; returns the last entry
/// requesting the final URL, or the first entry if none does.
fn redirect_chain_end(entries: &[Entry]) -> Option<usize> {
    let first = entries.first()?;
    let mut final_url = first.request.url.as_str();
    for entry in entries {
        if !matches!(entry.response.status, 301 | 302 | 303 | 307 | 308) {
            continue;
        }
        let target = entry
            .response
            .redirect_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| get_header(&entry.response.headers, "Location"));
        if let Some(url) = target {
            final_url = url.trim();
        }
    }
    let found = entries
        .iter()
        .rposition(|e| e.request.url == final_url)
        .unwrap_or(0);
    Some(found)
}
