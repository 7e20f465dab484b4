//! Pagination types for connection queries.
//!
//! These types implement Relay-style cursor pagination. A request carries
//! a [`ConnectionDirection`] plus [`DirectionArgs`]; the result is a
//! [`Connection`] of edges with a [`PageInfo`].

use std::fmt;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Page size used when the caller does not supply a count.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Opaque cursor for pagination.
///
/// The cursor value is implementation-specific and should be treated
/// as an opaque token by clients. An empty value means "no cursor".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub value: String,
}

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Which way a page is read relative to its cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionDirection {
    /// Rows after the cursor, in sort order.
    #[default]
    Forward,
    /// Rows before the cursor; without a cursor, the last page.
    Backward,
}

impl ConnectionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// Page size and position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectionArgs {
    pub count: Option<i64>,
    pub cursor: Option<Cursor>,
}

impl DirectionArgs {
    /// The cursor, unless absent or empty.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref().filter(|c| !c.is_empty())
    }
}

/// Ordering direction for sorted queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order (smallest first).
    #[default]
    Asc,
    /// Descending order (largest first).
    Desc,
}

impl SortOrder {
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Requested sort: public field names sharing one order.
#[derive(Debug, Clone, PartialEq)]
pub struct SortRequest {
    pub fields: Vec<String>,
    pub order: SortOrder,
}

impl SortRequest {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>, order: SortOrder) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            order,
        }
    }
}

/// Everything the paginator needs besides the scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaginationArgs {
    pub direction: ConnectionDirection,
    pub direction_args: DirectionArgs,
    pub sort: Option<SortRequest>,
    /// Run the extra count query and fill `total_count`.
    pub include_total_count: bool,
}

/// Paginated result set with edges and page info.
///
/// This is the Relay connection pattern for cursor-based pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection<T> {
    /// List of edges (node + cursor pairs).
    pub edges: Vec<Edge<T>>,
    /// Information about the current page.
    pub page_info: PageInfo,
    /// Rows matching the scope and filters, ignoring the cursor.
    pub total_count: Option<u64>,
}

impl<T> Connection<T> {
    /// An empty page: both flags false, empty cursors.
    pub fn empty(total_count: Option<u64>) -> Self {
        Self {
            edges: Vec::new(),
            page_info: PageInfo::default(),
            total_count,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }

    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Connection<U>, E> {
        let edges = self
            .edges
            .into_iter()
            .map(|edge| {
                Ok(Edge {
                    node: f(edge.node)?,
                    cursor: edge.cursor,
                })
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Connection {
            edges,
            page_info: self.page_info,
            total_count: self.total_count,
        })
    }
}

/// A single item in a paginated result.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge<T> {
    /// The actual item.
    pub node: T,
    /// Cursor for this item (used for pagination).
    pub cursor: Cursor,
}

/// Information about the current page in a paginated result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageInfo {
    /// Whether there are more items after this page.
    pub has_next_page: bool,
    /// Whether there are items before this page.
    pub has_previous_page: bool,
    /// Cursor of the first item in this page, empty when there is none.
    pub start_cursor: Cursor,
    /// Cursor of the last item in this page, empty when there is none.
    pub end_cursor: Cursor,
}
