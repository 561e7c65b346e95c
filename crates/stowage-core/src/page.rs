//! Paginated listings and the continuation-token protocol.
//!
//! Every backend lists through [`plan_page`], which applies prefix filtering,
//! delimiter grouping, the page size, and the cursor protocol to a key
//! sequence sorted in ascending byte order. Backends only have to produce the
//! sorted keys and turn the planned keys into [`Object`] handles.
//!
//! Tokens are stateless start-after markers. A token names the last entry of
//! the page that produced it (an object key or a virtual-directory prefix);
//! the next page starts strictly after it. A token outliving the entry it
//! names still works, because the marker is compared lexicographically rather
//! than looked up.

use std::fmt;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::object::Object;

/// Default number of entries per page, matching common S3 providers.
pub const DEFAULT_MAX_KEYS: usize = 1000;

const KEY_TAG: u8 = b'k';
const PREFIX_TAG: u8 = b'p';

/// One listing response: objects, virtual directories, and the cursor.
#[derive(Clone)]
pub struct Page {
    objects: Vec<Arc<dyn Object>>,
    prefixes: Vec<String>,
    next_page: String,
}

impl Page {
    pub fn new(objects: Vec<Arc<dyn Object>>, prefixes: Vec<String>, next_page: String) -> Self {
        Self {
            objects,
            prefixes,
            next_page,
        }
    }

    /// An empty, final page.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), String::new())
    }

    /// Objects on this page, in ascending key order.
    pub fn objects(&self) -> &[Arc<dyn Object>] {
        &self.objects
    }

    /// Virtual-directory prefixes on this page, in ascending order.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Token for the following page; empty on the last page.
    pub fn next_page(&self) -> &str {
        &self.next_page
    }

    /// Returns `true` if no further pages follow.
    pub fn is_last(&self) -> bool {
        self.next_page.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Arc<dyn Object>>, Vec<String>, String) {
        (self.objects, self.prefixes, self.next_page)
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.objects.iter().map(|o| o.key()).collect();
        f.debug_struct("Page")
            .field("objects", &keys)
            .field("prefixes", &self.prefixes)
            .field("next_page", &self.next_page)
            .finish()
    }
}

/// Everything a full pagination sweep returned.
#[derive(Clone, Debug, Default)]
pub struct Listing {
    pub objects: Vec<Arc<dyn Object>>,
    pub prefixes: Vec<String>,
}

impl Listing {
    pub fn keys(&self) -> Vec<&str> {
        self.objects.iter().map(|o| o.key()).collect()
    }

    pub(crate) fn extend(&mut self, page: Page) {
        let (objects, prefixes, _) = page.into_parts();
        self.objects.extend(objects);
        self.prefixes.extend(prefixes);
    }
}

/// The arguments of a single page request.
#[derive(Clone, Copy, Debug)]
pub struct PageQuery<'a> {
    pub prefix: &'a str,
    pub delimiter: &'a str,
    pub token: &'a str,
    pub max_keys: usize,
}

impl<'a> PageQuery<'a> {
    pub fn new(prefix: &'a str, delimiter: &'a str, token: &'a str) -> Self {
        Self {
            prefix,
            delimiter,
            token,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    /// Cap the page at `max_keys` entries (at least one).
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }
}

/// What a backend should return for one page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PagePlan {
    /// Keys to materialize as objects, ascending.
    pub keys: Vec<String>,
    /// Virtual-directory prefixes, ascending.
    pub prefixes: Vec<String>,
    /// Token for the following page; empty when the sweep is complete.
    pub next_page: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Marker {
    Key(String),
    Prefix(String),
}

impl Marker {
    fn encode(&self) -> String {
        let (tag, value) = match self {
            Self::Key(key) => (KEY_TAG, key),
            Self::Prefix(prefix) => (PREFIX_TAG, prefix),
        };
        let mut raw = Vec::with_capacity(value.len() + 1);
        raw.push(tag);
        raw.extend_from_slice(value.as_bytes());
        hex::encode(raw)
    }

    fn decode(token: &str) -> StoreResult<Option<Self>> {
        if token.is_empty() {
            return Ok(None);
        }
        let invalid = || StoreError::InvalidPageToken(token.to_string());
        let raw = hex::decode(token).map_err(|_| invalid())?;
        let (tag, value) = raw.split_first().ok_or_else(invalid)?;
        let value = String::from_utf8(value.to_vec()).map_err(|_| invalid())?;
        match *tag {
            KEY_TAG => Ok(Some(Self::Key(value))),
            PREFIX_TAG => Ok(Some(Self::Prefix(value))),
            _ => Err(invalid()),
        }
    }

    /// Returns `true` if `key` was already covered by the page ending here.
    fn covers(&self, key: &str) -> bool {
        match self {
            Self::Key(last) => key <= last.as_str(),
            Self::Prefix(group) => key <= group.as_str() || key.starts_with(group.as_str()),
        }
    }
}

/// Plan one page over `keys`, which must be sorted ascending and unique.
///
/// Keys not starting with `query.prefix` are skipped. With a non-empty
/// delimiter, a key whose remainder after the prefix contains the delimiter
/// contributes `prefix + segment + delimiter` to the prefixes instead of
/// itself; each such group counts as one entry toward `max_keys`.
pub fn plan_page<'k, I>(keys: I, query: &PageQuery<'_>) -> StoreResult<PagePlan>
where
    I: IntoIterator<Item = &'k str>,
{
    let cursor = Marker::decode(query.token)?;
    let max_keys = query.max_keys.max(1);

    let mut plan = PagePlan::default();
    let mut last: Option<Marker> = None;
    let mut emitted = 0usize;
    let mut truncated = false;

    for key in keys {
        if !key.starts_with(query.prefix) {
            continue;
        }
        if cursor.as_ref().is_some_and(|c| c.covers(key)) {
            continue;
        }

        let entry = group_of(key, query.prefix, query.delimiter);
        if let (Marker::Prefix(group), Some(Marker::Prefix(prev))) = (&entry, &last) {
            if group == prev {
                continue;
            }
        }

        if emitted == max_keys {
            truncated = true;
            break;
        }

        match &entry {
            Marker::Key(k) => plan.keys.push(k.clone()),
            Marker::Prefix(p) => plan.prefixes.push(p.clone()),
        }
        emitted += 1;
        last = Some(entry);
    }

    if truncated {
        if let Some(marker) = last {
            plan.next_page = marker.encode();
        }
    }

    Ok(plan)
}

fn group_of(key: &str, prefix: &str, delimiter: &str) -> Marker {
    if !delimiter.is_empty() {
        let rest = &key[prefix.len()..];
        if let Some(pos) = rest.find(delimiter) {
            let end = prefix.len() + pos + delimiter.len();
            return Marker::Prefix(key[..end].to_string());
        }
    }
    Marker::Key(key.to_string())
}
