//! Restaurant search filters and sort orders, rendered into SQL with `QueryBuilder`.

use sqlx::{Postgres, QueryBuilder};

use super::types::{RestaurantQuery, SortOption};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Newest,
    Cheapest,
    HighestRated,
    MostReserved,
}

impl SortOrder {
    pub const ALL: [Self; 4] = [
        Self::Newest,
        Self::Cheapest,
        Self::HighestRated,
        Self::MostReserved,
    ];

    /// Parse the `sort` query value. Unknown values fall back to newest first.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
        Self::ALL
            .into_iter()
            .find(|sort| sort.as_str().eq_ignore_ascii_case(&normalized))
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "created_at desc",
            Self::Cheapest => "lowest_price asc",
            Self::HighestRated => "rating desc",
            Self::MostReserved => "popular desc",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Newest => "掲載日が新しい順",
            Self::Cheapest => "価格が安い順",
            Self::HighestRated => "評価が高い順",
            Self::MostReserved => "予約数が多い順",
        }
    }

    /// `ORDER BY` body. Expects the summary columns to be selected from `restaurants r`.
    const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "r.created_at DESC, r.id DESC",
            Self::Cheapest => "r.lowest_price ASC, r.id ASC",
            Self::HighestRated => "average_score DESC NULLS LAST, r.id DESC",
            Self::MostReserved => {
                "(SELECT COUNT(*) FROM reservations x WHERE x.restaurant_id = r.id) DESC, r.id DESC"
            }
        }
    }

    #[must_use]
    pub fn options() -> Vec<SortOption> {
        Self::ALL
            .into_iter()
            .map(|sort| SortOption {
                value: sort.as_str(),
                label: sort.label(),
            })
            .collect()
    }
}

/// Filters of the public restaurant list. Every present filter narrows the result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestaurantSearch {
    pub keyword: Option<String>,
    pub category_id: Option<i64>,
    pub price: Option<i64>,
    pub sort: SortOrder,
}

impl From<&RestaurantQuery> for RestaurantSearch {
    fn from(query: &RestaurantQuery) -> Self {
        Self {
            keyword: query.keyword.clone(),
            category_id: query.category_id,
            price: query.price,
            sort: SortOrder::parse(query.sort.as_deref()),
        }
    }
}

impl RestaurantSearch {
    /// Append `WHERE ...` for the active filters.
    pub fn push_filters(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE TRUE");
        if let Some(keyword) = &self.keyword {
            let pattern = like_pattern(keyword);
            builder
                .push(" AND (r.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR r.address ILIKE ")
                .push_bind(pattern.clone())
                .push(
                    " OR EXISTS (SELECT 1 FROM category_restaurant cr \
                     JOIN categories c ON c.id = cr.category_id \
                     WHERE cr.restaurant_id = r.id AND c.name ILIKE ",
                )
                .push_bind(pattern)
                .push("))");
        }
        if let Some(category_id) = self.category_id {
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM category_restaurant cr \
                     WHERE cr.restaurant_id = r.id AND cr.category_id = ",
                )
                .push_bind(category_id)
                .push(")");
        }
        if let Some(price) = self.price {
            builder.push(" AND r.lowest_price <= ").push_bind(price);
        }
    }

    pub fn push_order(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" ORDER BY ").push(self.sort.order_by());
    }
}

/// Substring pattern for `ILIKE`, with the wildcard characters of the input escaped.
#[must_use]
pub fn like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_parsing_falls_back_to_newest() {
        assert_eq!(SortOrder::parse(None), SortOrder::Newest);
        assert_eq!(SortOrder::parse(Some("rating desc")), SortOrder::HighestRated);
        assert_eq!(SortOrder::parse(Some("  popular   DESC ")), SortOrder::MostReserved);
        assert_eq!(SortOrder::parse(Some("lowest_price asc")), SortOrder::Cheapest);
        assert_eq!(SortOrder::parse(Some("lowest_price desc")), SortOrder::Newest);
        assert_eq!(SortOrder::parse(Some("id; DROP TABLE users")), SortOrder::Newest);
    }

    #[test]
    fn options_cover_every_order() {
        let values: Vec<_> = SortOrder::options().into_iter().map(|o| o.value).collect();
        assert_eq!(
            values,
            vec!["created_at desc", "lowest_price asc", "rating desc", "popular desc"]
        );
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("味噌"), "%味噌%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }

    #[test]
    fn filters_render_in_order() {
        let search = RestaurantSearch {
            keyword: Some("ひつまぶし".to_string()),
            category_id: Some(2),
            price: Some(3000),
            sort: SortOrder::Cheapest,
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT r.id FROM restaurants r");
        search.push_filters(&mut builder);
        search.push_order(&mut builder);
        let sql = builder.sql();
        assert!(sql.contains("r.name ILIKE $1"));
        assert!(sql.contains("c.name ILIKE $3"));
        assert!(sql.contains("cr.category_id = $4"));
        assert!(sql.contains("r.lowest_price <= $5"));
        assert!(sql.ends_with("ORDER BY r.lowest_price ASC, r.id ASC"));
    }

    #[test]
    fn no_filters_keep_every_row() {
        let search = RestaurantSearch::default();
        let mut builder = QueryBuilder::<Postgres>::new("SELECT r.id FROM restaurants r");
        search.push_filters(&mut builder);
        assert_eq!(builder.sql(), "SELECT r.id FROM restaurants r WHERE TRUE");
    }
}
