use serde::Serialize;

/// Items shown per page on every listing.
pub const PAGE_SIZE: i64 = 10;

/// Slices an ordered result set into fixed-size, 1-based pages. Out-of-range
/// requests clamp to the nearest valid page; non-numeric requests land on
/// page one.
#[derive(Debug, Clone, Serialize)]
pub struct Paginator {
    pub count: i64,
    pub per_page: i64,
    pub num_pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub number: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Paginator {
    pub fn new(count: i64, per_page: i64) -> Self {
        let num_pages = if count <= 0 {
            1
        } else {
            (count + per_page - 1) / per_page
        };
        Paginator {
            count,
            per_page,
            num_pages,
        }
    }

    /// Resolves the raw `?page=` query value to a valid page.
    pub fn get_page(&self, raw: Option<&str>) -> PageInfo {
        let number = match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => match s.parse::<i64>() {
                Ok(n) if n < 1 => 1,
                Ok(n) if n > self.num_pages => self.num_pages,
                Ok(n) => n,
                Err(_) => 1,
            },
            None => 1,
        };

        PageInfo {
            number,
            has_next: number < self.num_pages,
            has_previous: number > 1,
        }
    }

    pub fn offset(&self, page: &PageInfo) -> i64 {
        (page.number - 1) * self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_still_has_one_page() {
        let p = Paginator::new(0, PAGE_SIZE);
        assert_eq!(p.num_pages, 1);
        let page = p.get_page(None);
        assert_eq!(page.number, 1);
        assert!(!page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(Paginator::new(10, PAGE_SIZE).num_pages, 1);
        assert_eq!(Paginator::new(11, PAGE_SIZE).num_pages, 2);
        assert_eq!(Paginator::new(20, PAGE_SIZE).num_pages, 2);
        assert_eq!(Paginator::new(21, PAGE_SIZE).num_pages, 3);
    }

    #[test]
    fn out_of_range_pages_clamp() {
        let p = Paginator::new(25, PAGE_SIZE);
        assert_eq!(p.get_page(Some("0")).number, 1);
        assert_eq!(p.get_page(Some("-3")).number, 1);
        assert_eq!(p.get_page(Some("99")).number, 3);
        assert_eq!(p.get_page(Some("2")).number, 2);
    }

    #[test]
    fn non_numeric_pages_fall_back_to_first() {
        let p = Paginator::new(25, PAGE_SIZE);
        assert_eq!(p.get_page(Some("abc")).number, 1);
        assert_eq!(p.get_page(Some("")).number, 1);
    }

    #[test]
    fn offsets_follow_page_number() {
        let p = Paginator::new(25, PAGE_SIZE);
        let page = p.get_page(Some("3"));
        assert_eq!(p.offset(&page), 20);
        assert!(!page.has_next);
        assert!(page.has_previous);
    }
}
