use serde::{Deserialize, Serialize};

use crate::{
    constants::MAX_PAGE_SIZE,
    error::{Error, HtmlError},
    form::QueryForm,
};

/// Page-number pagination; `page` is 1-based and `limit` overrides the page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: i64,
    pub limit: i64,
}

impl PageQuery {
    pub fn from_form(form: &QueryForm, default_limit: i64) -> Result<Self, Error> {
        let page = form.get_number::<i64>("page")?.unwrap_or(1);
        if page < 1 {
            return Err(HtmlError::NotFound.new("Invalid page"));
        }

        let limit = form
            .get_number::<i64>("limit")?
            .unwrap_or(default_limit)
            .clamp(1, MAX_PAGE_SIZE);

        if (page - 1).checked_mul(limit).is_none() {
            return Err(HtmlError::NotFound.new("Invalid page"));
        }

        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// Builds a page from rows fetched with `LIMIT`/`OFFSET` and a windowed total.
    /// Links keep every other query parameter of the request.
    pub fn from_rows(
        rows: Vec<T>,
        total_rows: i64,
        query: PageQuery,
        path: &str,
        form: &QueryForm,
    ) -> Result<Self, Error> {
        if rows.is_empty() {
            if query.page > 1 {
                return Err(HtmlError::NotFound.new("Invalid page"));
            }
            return Ok(Self::no_rows());
        }

        let page_count = (total_rows + query.limit - 1) / query.limit;

        let next = (query.page < page_count).then(|| page_link(path, form, query.page + 1));
        let previous = (query.page > 1).then(|| page_link(path, form, query.page - 1));

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        })
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }
}

fn page_link(path: &str, form: &QueryForm, page: i64) -> String {
    let mut pairs: Vec<(String, String)> = form
        .pairs()
        .iter()
        .filter(|(key, _)| key != "page")
        .cloned()
        .collect();

    // the first page carries no page parameter
    if page > 1 {
        pairs.push((String::from("page"), page.to_string()));
    }

    match serde_urlencoded::to_string(&pairs) {
        Ok(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn form(raw: &str) -> QueryForm {
        QueryForm::from_query(raw).unwrap()
    }

    #[test]
    fn defaults_to_first_page() {
        let query = PageQuery::from_form(&form(""), 6).unwrap();
        assert_eq!(query, PageQuery { page: 1, limit: 6 });
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn limit_is_clamped() {
        let query = PageQuery::from_form(&form("limit=100000&page=3"), 6).unwrap();
        assert_eq!(query.limit, MAX_PAGE_SIZE);
        assert_eq!(query.offset(), 2 * MAX_PAGE_SIZE);
    }

    #[rstest]
    #[case("page=0")]
    #[case("page=-3")]
    #[case("page=9223372036854775807&limit=100")]
    #[case("page=4611686018427387905&limit=2")]
    fn out_of_range_pages_are_not_found(#[case] raw: &str) {
        let err = PageQuery::from_form(&form(raw), 6).unwrap_err();
        assert_eq!(err.kind, HtmlError::NotFound);
    }

    #[test]
    fn links_keep_filters() {
        let f = form("tags=lunch&tags=dinner&limit=2");
        let query = PageQuery::from_form(&f, 6).unwrap();
        let page = PageContext::from_rows(vec![1, 2], 5, query, "/api/recipes", &f).unwrap();

        assert_eq!(page.count, 5);
        assert_eq!(page.previous, None);
        assert_eq!(
            page.next.as_deref(),
            Some("/api/recipes?tags=lunch&tags=dinner&limit=2&page=2")
        );
    }

    #[test]
    fn last_page_has_no_next() {
        let f = form("page=3&limit=2");
        let query = PageQuery::from_form(&f, 6).unwrap();
        let page = PageContext::from_rows(vec![5], 5, query, "/api/users", &f).unwrap();

        assert_eq!(page.next, None);
        assert_eq!(page.previous.as_deref(), Some("/api/users?limit=2&page=2"));
    }

    #[test]
    fn empty_page_past_the_end_is_not_found() {
        let f = form("page=4");
        let query = PageQuery::from_form(&f, 6).unwrap();
        let err = PageContext::<i32>::from_rows(vec![], 0, query, "/api/users", &f).unwrap_err();
        assert_eq!(err.kind, HtmlError::NotFound);
    }
}
