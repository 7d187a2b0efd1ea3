//! Column selection
//!
//! A [`Request`] names the columns analysed together; a [`RequestSet`] holds
//! the distinct requests of one engine. Requests have set semantics: two
//! requests naming the same columns in a different order are the same request.
//! The declared order is still kept because output names such as
//! `HDR (Math,French)` and the X/Y roles of bivariate engines depend on it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// An unordered set of distinct column names, remembering declaration order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    columns: Vec<String>,
}

impl Request {
    /// Build a request; repeated names are dropped
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for column in columns {
            let column = column.into();
            if !unique.contains(&column) {
                unique.push(column);
            }
        }
        Self { columns: unique }
    }

    /// Columns in declaration order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    fn sorted(&self) -> Vec<&str> {
        let mut key: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        key.sort_unstable();
        key
    }

    /// Comma-joined column list, e.g. `Math,French`
    pub fn label(&self) -> String {
        self.columns.join(",")
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl Eq for Request {}

impl Hash for Request {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sorted().hash(state);
    }
}

impl PartialOrd for Request {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Request {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sorted().cmp(&other.sorted())
    }
}

/// The distinct requests of one engine, plus a staging buffer for building
/// an N-ary request one column at a time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSet {
    requests: Vec<Request>,
    staged: Vec<String>,
}

impl RequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request; returns `false` when an equal request exists
    pub fn add_request(&mut self, request: Request) -> bool {
        if request.is_empty() || self.requests.contains(&request) {
            return false;
        }
        self.requests.push(request);
        true
    }

    /// Insert a singleton request immediately, bypassing the staging buffer
    pub fn add_column(&mut self, name: &str) -> bool {
        self.add_request(Request::new([name]))
    }

    /// Insert a pair request immediately, bypassing the staging buffer
    pub fn add_column_pair(&mut self, x: &str, y: &str) -> bool {
        self.add_request(Request::new([x, y]))
    }

    /// Flag or unflag a column in the staging buffer
    pub fn set_column_status(&mut self, name: &str, selected: bool) {
        let position = self.staged.iter().position(|c| c == name);
        match (selected, position) {
            (true, None) => self.staged.push(name.to_string()),
            (false, Some(index)) => {
                self.staged.remove(index);
            }
            _ => {}
        }
    }

    /// Clear every staging flag
    pub fn reset_column_states(&mut self) {
        self.staged.clear();
    }

    /// Promote the flagged columns into one request
    ///
    /// The flags stay set, matching a selection that is committed several times
    /// while being edited. Returns whether a new request was added.
    pub fn commit_selection(&mut self) -> bool {
        let request = Request::new(self.staged.iter().cloned());
        self.add_request(request)
    }

    pub fn staged(&self) -> &[String] {
        &self.staged
    }

    /// Drop every request
    pub fn reset_requests(&mut self) {
        self.requests.clear();
    }

    /// Take the requests out, leaving the set empty
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Request> {
        self.requests.iter()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl<'a> IntoIterator for &'a RequestSet {
    type Item = &'a Request;
    type IntoIter = std::slice::Iter<'a, Request>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.iter()
    }
}
