//! Offset pagination over list-valued loads.
//!
//! A page is requested through an [`OFFSET_PAGE`] alias chained from the paginated target key.
//! The keys a page load returned are recorded in the [`PageInfo`] of the target, which lives in
//! the metadata entry of the target's [`OFFSET_PAGE_LIST`] alias.
use crate::error::KeyError;
use crate::key::{AliasToken, ResourceAlias, ResourceKey};

/// A window `[offset, offset + limit)` over the target key.
pub const OFFSET_PAGE: AliasToken = AliasToken::new("offset-page");

/// Every key loaded so far through pages of the target key.
pub const OFFSET_PAGE_LIST: AliasToken = AliasToken::new("offset-page-list");

const OFFSET: &str = "offset";
const LIMIT: &str = "limit";

/// Creates the alias key for the page `[offset, offset + limit)` of `target`.
pub fn offset_page_key<K>(target: ResourceKey<K>, offset: usize, limit: usize) -> ResourceKey<K> {
    ResourceAlias::new(OFFSET_PAGE)
        .with_param(OFFSET, offset)
        .with_param(LIMIT, limit)
        .with_parent(target)
        .into()
}

/// Creates the alias key for all loaded pages of `target`.
pub fn offset_page_list_key<K>(target: ResourceKey<K>) -> ResourceKey<K> {
    ResourceAlias::new(OFFSET_PAGE_LIST)
        .with_parent(target)
        .into()
}

/// Returns the `(offset, limit)` of an [`OFFSET_PAGE`] alias.
pub fn page_window<K>(alias: &ResourceAlias<K>) -> Result<(usize, usize), KeyError> {
    let read = |name: &str| {
        alias
            .param(name)
            .and_then(|param| param.as_int())
            .and_then(|value| usize::try_from(value).ok())
    };
    match (read(OFFSET), read(LIMIT)) {
        (Some(offset), Some(limit)) => Ok((offset, limit)),
        _ => Err(KeyError::MalformedAlias {
            token: alias.token(),
            reason: "offset and limit must be non-negative integers",
        }),
    }
}

/// Returns the key a pagination alias is chained from.
pub fn page_target<K>(alias: &ResourceAlias<K>) -> Result<&ResourceKey<K>, KeyError> {
    alias.parent().ok_or(KeyError::MalformedAlias {
        token: alias.token(),
        reason: "pagination aliases need a target key",
    })
}

/// A loaded window of a paginated key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<K> {
    pub from: usize,
    pub to: usize,
    pub outdated: bool,
    pub items: Vec<K>,
}

/// The loaded windows of a paginated key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo<K> {
    /// Pages ordered by `from`, never overlapping.
    pages: Vec<Page<K>>,
    /// The total number of items, once a page came back short.
    end: Option<usize>,
}

impl<K> Default for PageInfo<K> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            end: None,
        }
    }
}

impl<K: Clone> PageInfo<K> {
    pub fn pages(&self) -> &[Page<K>] {
        &self.pages
    }

    pub fn end(&self) -> Option<usize> {
        self.end
    }

    /// Records the items loaded for the window `[offset, offset + limit)`.
    ///
    /// Pages overlapping the requested window are replaced. A page with fewer items than
    /// requested marks the end of the list. This does not notice items inserted or removed
    /// on the server between two page loads.
    pub fn set_page(&mut self, offset: usize, limit: usize, items: Vec<K>) {
        let to = offset + items.len();
        let window_end = offset + limit.max(items.len());

        self.pages
            .retain(|page| (page.to <= offset && page.from < offset) || page.from >= window_end);

        if items.len() < limit {
            self.end = Some(to);
            self.pages.retain(|page| page.from < to);
        } else if self.end.is_some_and(|end| end <= to) {
            self.end = None;
        }

        let index = self.pages.partition_point(|page| page.from < offset);
        self.pages.insert(
            index,
            Page {
                from: offset,
                to,
                outdated: false,
                items,
            },
        );
    }

    /// Returns the offset right after the contiguous run of pages starting at `0`.
    pub fn next_page_offset(&self) -> usize {
        let mut offset = 0;
        for page in &self.pages {
            if page.from > offset {
                break;
            }
            offset = offset.max(page.to);
        }
        offset
    }

    /// Returns `false` once the end of the list is known and loaded.
    pub fn has_next_page(&self) -> bool {
        self.end.is_none_or(|end| self.next_page_offset() < end)
    }

    /// Returns whether the window is covered by loaded pages, none of them outdated.
    pub fn is_loaded(&self, offset: usize, limit: usize) -> bool {
        let window_end = match self.end {
            Some(end) => (offset + limit).min(end),
            None => offset + limit,
        };
        let mut cursor = offset;
        for page in self.pages.iter().filter(|page| page.to > offset || page.from == offset) {
            if page.from > cursor || page.outdated {
                return false;
            }
            cursor = cursor.max(page.to);
            if cursor >= window_end {
                return true;
            }
        }
        cursor >= window_end
    }

    /// Returns the keys loaded within the window `[offset, offset + limit)`, in page order.
    pub fn items_in(&self, offset: usize, limit: usize) -> Vec<K> {
        let window_end = offset + limit;
        let mut items = Vec::new();
        for page in &self.pages {
            if page.to <= offset || page.from >= window_end {
                continue;
            }
            let skip = offset.saturating_sub(page.from);
            let take = window_end.min(page.to) - page.from.max(offset);
            items.extend(page.items.iter().skip(skip).take(take).cloned());
        }
        items
    }

    /// Returns every loaded key, in page order.
    pub fn items(&self) -> Vec<K> {
        self.pages
            .iter()
            .flat_map(|page| page.items.iter().cloned())
            .collect()
    }

    /// Marks the pages intersecting the window as outdated.
    pub fn mark_outdated_in(&mut self, offset: usize, limit: usize) {
        let window_end = offset + limit;
        for page in &mut self.pages {
            if page.from < window_end && (page.to > offset || page.from == offset) {
                page.outdated = true;
            }
        }
    }

    pub fn mark_outdated(&mut self) {
        for page in &mut self.pages {
            page.outdated = true;
        }
    }

    pub fn reset(&mut self) {
        self.pages.clear();
        self.end = None;
    }
}
