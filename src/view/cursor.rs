use std::collections::VecDeque;

use crate::connection::Pool;
use crate::error::StoreError;
use crate::key::Key;
use crate::store::{Column, ConsistencyLevel, SlicePredicate, Store};

enum CursorState {
    /// No page fetched yet.
    Start { from: String },
    /// Columns of the current page not yet yielded.
    Page {
        buffer: VecDeque<Column>,
        last: String,
        passes: usize,
        last_page: bool,
    },
    Exhausted,
}

/// Pages through the pointer columns of a view row, yielding record keys.
///
/// Stateless on the server: each page is a fresh slice starting at the last
/// column seen. The first page includes its start column; later pages ask
/// for one extra column and drop the first, which is the previous page's
/// last column.
pub struct KeyCursor<'a> {
    pool: &'a Pool,
    view_key: Key,
    record_key: Key,
    finish: String,
    chunk_size: usize,
    reversed: bool,
    consistency: ConsistencyLevel,
    state: CursorState,
}

impl<'a> KeyCursor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pool: &'a Pool,
        view_key: Key,
        record_key: Key,
        start: String,
        finish: String,
        chunk_size: usize,
        reversed: bool,
        consistency: ConsistencyLevel,
    ) -> Self {
        KeyCursor {
            pool,
            view_key,
            record_key,
            finish,
            chunk_size: chunk_size.max(1),
            reversed,
            consistency,
            state: CursorState::Start { from: start },
        }
    }

    /// Fetch the page starting at `from` and make it the current state.
    fn fetch(&mut self, from: String, passes: usize) -> Result<(), StoreError> {
        let fudge = usize::from(passes > 0);
        let requested = self.chunk_size + fudge;

        tracing::debug!(view = %self.view_key, from = %from, requested, "fetching view page");
        let client = self.pool.acquire(self.view_key.namespace())?;
        let columns = client.get_slice(
            self.view_key.namespace(),
            self.view_key.row_id(),
            &self.view_key.parent(),
            &SlicePredicate::range(from, self.finish.clone(), self.reversed, requested),
            self.consistency,
        )?;

        let Some(last) = columns.last().map(|column| column.name.clone()) else {
            self.state = CursorState::Exhausted;
            return Ok(());
        };

        let last_page = columns.len() < requested;
        let mut buffer: VecDeque<Column> = columns.into();
        buffer.drain(..fudge.min(buffer.len()));

        self.state = CursorState::Page {
            buffer,
            last,
            passes: passes + 1,
            last_page,
        };
        Ok(())
    }
}

impl Iterator for KeyCursor<'_> {
    type Item = Result<Key, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let fetched = match &mut self.state {
                CursorState::Exhausted => return None,
                CursorState::Start { from } => {
                    let from = std::mem::take(from);
                    self.fetch(from, 0)
                }
                CursorState::Page {
                    buffer,
                    last,
                    passes,
                    last_page,
                } => {
                    if let Some(column) = buffer.pop_front() {
                        return Some(Ok(self.record_key.for_row(column.value)));
                    }
                    if *last_page {
                        self.state = CursorState::Exhausted;
                        return None;
                    }
                    let (from, passes) = (std::mem::take(last), *passes);
                    self.fetch(from, passes)
                }
            };

            if let Err(err) = fetched {
                self.state = CursorState::Exhausted;
                return Some(Err(err));
            }
        }
    }
}
