//! Search result pages.
//!
//! [`SearchPage`] is the envelope returned by `search`: the resolved documents plus the paging
//! parameters that produced them and the totals needed to navigate further.

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::query::PageDescriptor;

/// A single page of search results.
///
/// # Example
///
/// ```ignore
/// use docpipe::page::SearchPage;
/// use docpipe::query::PageDescriptor;
///
/// let page = SearchPage::builder(documents)
///     .with_descriptor(&PageDescriptor { limit: 10, ..Default::default() })
///     .with_count(25)
///     .build();
///
/// assert_eq!(page.pages, 3);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SearchPage {
    /// The documents on this page.
    pub data: Vec<Document>,
    pub skip: u64,
    /// `0` means the page was unbounded.
    pub limit: u64,
    /// The effective sort, field -> `1` / `-1`.
    pub sort: Document,
    /// Total number of matching documents across all pages.
    pub count: u64,
    /// `ceil(count / limit)`, or `0` when unbounded.
    pub pages: u64,
}

impl SearchPage {
    pub fn builder(data: Vec<Document>) -> SearchPageBuilder {
        SearchPageBuilder::new(data)
    }

    /// Whether another page follows this one.
    pub fn has_next(&self) -> bool {
        self.limit > 0 && self.skip + self.limit < self.count
    }

    /// Renders the page as a `{ data, skip, limit, sort, count, pages }` envelope.
    pub fn into_bson(self) -> Bson {
        Bson::Document(doc! {
            "data": self.data.into_iter().map(Bson::Document).collect::<Vec<_>>(),
            "skip": self.skip as i64,
            "limit": self.limit as i64,
            "sort": self.sort,
            "count": self.count as i64,
            "pages": self.pages as i64,
        })
    }
}

/// Builder for [`SearchPage`]. Computes `pages` from the count and limit.
pub struct SearchPageBuilder {
    data: Vec<Document>,
    descriptor: PageDescriptor,
    count: u64,
}

impl SearchPageBuilder {
    pub fn new(data: Vec<Document>) -> Self {
        Self {
            data,
            descriptor: PageDescriptor::default(),
            count: 0,
        }
    }

    /// Sets the sort, skip and limit the page was fetched with.
    pub fn with_descriptor(mut self, descriptor: &PageDescriptor) -> Self {
        self.descriptor = descriptor.clone();
        self
    }

    /// Sets the total count of matching documents.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn build(self) -> SearchPage {
        SearchPage {
            pages: self.descriptor.pages(self.count),
            data: self.data,
            skip: self.descriptor.skip,
            limit: self.descriptor.limit,
            sort: self.descriptor.sort,
            count: self.count,
        }
    }
}
