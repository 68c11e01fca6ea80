//! Next-link pagination.
//!
//! Pagers issue one request per page, lazily, and follow `@odata.nextLink`
//! until a page comes back without one. A failed request is yielded once and
//! ends the sequence.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//!
//! // Blocking iteration
//! for person in client.from("People").page_size(50).cursor()? {
//!     println!("{}", person?["UserName"]);
//! }
//!
//! // Async stream
//! let mut people = client.from("People").cursor_stream()?;
//! while let Some(person) = people.next().await {
//!     println!("{}", person?["UserName"]);
//! }
//! ```

use crate::client::ODataClient;
use crate::error::Error;
use crate::response::DecodedResponse;
use futures_core::Stream;
use http::Method;
use pin_project_lite::pin_project;
use serde_json::Value as Json;
use std::collections::VecDeque;
use std::future::Future;
use std::iter::FusedIterator;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future fetching one page.
pub type BoxedPageFuture = Pin<Box<dyn Future<Output = Result<DecodedResponse, Error>> + Send>>;

/// Fetches the page at a (relative or absolute) link.
pub type BoxedPageFetcher = Box<dyn FnMut(String) -> BoxedPageFuture + Send>;

/// Item stream returned by the query builder.
pub type ItemsStream = CursorStream<BoxedPageFetcher, BoxedPageFuture>;

/// Page stream returned by the query builder.
pub type PageStream = PagesStream<BoxedPageFetcher, BoxedPageFuture>;

/// Blocking iterator over pages.
#[derive(Debug)]
pub struct Pages {
    client: ODataClient,
    next_uri: Option<String>,
}

impl Pages {
    pub(crate) fn new(client: ODataClient, uri: String) -> Self {
        Self {
            client,
            next_uri: Some(uri),
        }
    }
}

impl Iterator for Pages {
    type Item = Result<DecodedResponse, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let uri = self.next_uri.take()?;
        let page = match self.client.execute(Method::GET, &uri, None) {
            Ok(page) => page,
            Err(e) => return Some(Err(e)),
        };
        self.next_uri = page.next_link().map(|link| self.client.relative_link(link));
        if let Some(next) = &self.next_uri {
            tracing::debug!(next = %next, "following next link");
        }
        Some(Ok(page))
    }
}

impl FusedIterator for Pages {}

/// Blocking iterator over items across all pages.
#[derive(Debug)]
pub struct Cursor {
    pages: Pages,
    buffer: VecDeque<Json>,
}

impl Cursor {
    pub(crate) fn new(pages: Pages) -> Self {
        Self {
            pages,
            buffer: VecDeque::new(),
        }
    }
}

impl Iterator for Cursor {
    type Item = Result<Json, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            match self.pages.next()? {
                Ok(page) => self.buffer.extend(page.into_items()),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl FusedIterator for Cursor {}

pin_project! {
    /// Stream of items across all pages.
    ///
    /// `fetcher` is called with the initial URI, then with every next link.
    pub struct CursorStream<F, Fut>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<DecodedResponse, Error>>,
    {
        next_uri: Option<String>,
        buffer: VecDeque<Json>,
        done: bool,
        fetcher: F,
        #[pin]
        current_fetch: Option<Fut>,
    }
}

impl<F, Fut> CursorStream<F, Fut>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<DecodedResponse, Error>>,
{
    pub fn new(uri: impl Into<String>, fetcher: F) -> Self {
        Self {
            next_uri: Some(uri.into()),
            buffer: VecDeque::new(),
            done: false,
            fetcher,
            current_fetch: None,
        }
    }
}

impl<F, Fut> Stream for CursorStream<F, Fut>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<DecodedResponse, Error>>,
{
    type Item = Result<Json, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if *this.done {
                return Poll::Ready(None);
            }

            if let Some(fut) = this.current_fetch.as_mut().as_pin_mut() {
                match fut.poll(cx) {
                    Poll::Ready(Ok(page)) => {
                        this.current_fetch.set(None);
                        *this.next_uri = page.next_link().map(str::to_owned);
                        if this.next_uri.is_none() {
                            *this.done = true;
                        }
                        this.buffer.extend(page.into_items());
                        continue;
                    }
                    Poll::Ready(Err(e)) => {
                        this.current_fetch.set(None);
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            let Some(uri) = this.next_uri.take() else {
                *this.done = true;
                continue;
            };
            let fut = (this.fetcher)(uri);
            this.current_fetch.set(Some(fut));
        }
    }
}

pin_project! {
    /// Stream of whole pages.
    pub struct PagesStream<F, Fut>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<DecodedResponse, Error>>,
    {
        next_uri: Option<String>,
        done: bool,
        fetcher: F,
        #[pin]
        current_fetch: Option<Fut>,
    }
}

impl<F, Fut> PagesStream<F, Fut>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<DecodedResponse, Error>>,
{
    pub fn new(uri: impl Into<String>, fetcher: F) -> Self {
        Self {
            next_uri: Some(uri.into()),
            done: false,
            fetcher,
            current_fetch: None,
        }
    }
}

impl<F, Fut> Stream for PagesStream<F, Fut>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<DecodedResponse, Error>>,
{
    type Item = Result<DecodedResponse, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            if let Some(fut) = this.current_fetch.as_mut().as_pin_mut() {
                match fut.poll(cx) {
                    Poll::Ready(Ok(page)) => {
                        this.current_fetch.set(None);
                        *this.next_uri = page.next_link().map(str::to_owned);
                        if this.next_uri.is_none() {
                            *this.done = true;
                        }
                        return Poll::Ready(Some(Ok(page)));
                    }
                    Poll::Ready(Err(e)) => {
                        this.current_fetch.set(None);
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            let Some(uri) = this.next_uri.take() else {
                *this.done = true;
                continue;
            };
            let fut = (this.fetcher)(uri);
            this.current_fetch.set(Some(fut));
        }
    }
}
