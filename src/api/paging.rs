use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use super::models::Page;
use super::{ApiError, HttpBackend, Result, Transport};

/// Lazy walk over a cursor-paged endpoint.
///
/// Yields the `items` of each page and follows `next` until it is absent.
/// A non-200 page is yielded once as an error, after which the walk is over;
/// there is no partial tolerance and no way to restart.
pub struct Pages<'a, B, T> {
    transport: &'a Transport<B>,
    next_url: Option<String>,
    fetched: usize,
    _item: PhantomData<T>,
}

impl<'a, B: HttpBackend, T: DeserializeOwned> Pages<'a, B, T> {
    pub fn new(transport: &'a Transport<B>, start_url: impl Into<String>) -> Self {
        Self {
            transport,
            next_url: Some(start_url.into()),
            fetched: 0,
            _item: PhantomData,
        }
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }

    fn fetch(&mut self, url: &str) -> Result<Vec<T>> {
        let response = self.transport.get(url)?;
        if response.status != 200 {
            return Err(ApiError::UnexpectedStatus {
                context: format!("Pagination of {url}"),
                status: response.status,
            });
        }
        let page: Page<T> = response.json("page")?;
        self.fetched += 1;
        self.next_url = page.next.filter(|n| !n.is_empty());
        Ok(page.items)
    }
}

impl<B: HttpBackend, T: DeserializeOwned> Iterator for Pages<'_, B, T> {
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        // take() first: an error leaves the cursor empty and ends the walk
        let url = self.next_url.take()?;
        Some(self.fetch(&url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeSpotify;
    use crate::api::models::PlaylistSummary;

    #[test]
    fn test_follows_next_until_exhausted() {
        let fake = FakeSpotify::new("me").with_playlist_page_size(2);
        for i in 0..5 {
            fake.add_playlist(&format!("list {i}"), &[]);
        }
        let transport = fake.transport();
        let url = format!("{}/me/playlists?limit=50", fake.base());

        let mut pages: Pages<_, PlaylistSummary> = Pages::new(&transport, url);
        let sizes: Vec<usize> = pages.by_ref().map(|p| p.unwrap().len()).collect();

        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(pages.pages_fetched(), 3);
        assert!(pages.next().is_none());
    }

    #[test]
    fn test_error_ends_the_walk() {
        let fake = FakeSpotify::new("me").with_playlist_page_size(1);
        fake.add_playlist("a", &[]);
        fake.add_playlist("b", &[]);
        fake.fail_next(403);
        let transport = fake.transport();
        let url = format!("{}/me/playlists?limit=50", fake.base());

        let mut pages: Pages<_, PlaylistSummary> = Pages::new(&transport, url);
        assert!(matches!(
            pages.next(),
            Some(Err(ApiError::UnexpectedStatus { status: 403, .. }))
        ));
        assert!(pages.next().is_none());
    }

    #[test]
    fn test_laziness() {
        let fake = FakeSpotify::new("me").with_playlist_page_size(1);
        fake.add_playlist("a", &[]);
        fake.add_playlist("b", &[]);
        let transport = fake.transport();
        let url = format!("{}/me/playlists?limit=50", fake.base());

        let mut pages: Pages<_, PlaylistSummary> = Pages::new(&transport, url);
        assert_eq!(fake.request_count(), 0);
        pages.next();
        assert_eq!(fake.request_count(), 1);
    }
}
