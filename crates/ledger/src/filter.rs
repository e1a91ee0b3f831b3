//! Volume list filtering and pagination.

/// Selection flags and pagination for volume list queries.
///
/// Filter names map to flags through an explicit `match`; unknown names are
/// ignored with a debug log. Pagination applies
/// `LIMIT per_page OFFSET (page - 1) * per_page` when `per_page > 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeFilter {
    pub page: i64,
    pub per_page: i64,
    pub not_deleted: bool,
    pub deleted: bool,
}

impl VolumeFilter {
    /// The default listing filter: live rows only.
    pub fn standard() -> Self {
        Self {
            not_deleted: true,
            ..Self::default()
        }
    }

    /// Parse filter names into flags.
    pub fn parse<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for name in names {
            match name.as_ref() {
                "not_deleted" => filter.not_deleted = true,
                "deleted" => filter.deleted = true,
                other => tracing::debug!(filter = other, "ignoring unknown volume filter"),
            }
        }
        filter
    }

    /// Attach pagination.
    pub fn paged(mut self, page: i64, per_page: i64) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    /// SQL condition fragment for the deletion flags. Appended to a query
    /// that already has a `WHERE` clause.
    pub(crate) fn conditions(&self) -> &'static str {
        match (self.not_deleted, self.deleted) {
            (true, false) => " AND NOT deleted",
            (false, true) => " AND deleted",
            _ => "",
        }
    }

    /// `(limit, offset)` when pagination is requested.
    pub(crate) fn limit_offset(&self) -> Option<(i64, i64)> {
        if self.per_page > 0 {
            Some((self.per_page, (self.page.max(1) - 1) * self.per_page))
        } else {
            None
        }
    }
}
