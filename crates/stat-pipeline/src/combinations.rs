//! Fitting requests to an engine's arity

use stat_core::request::{Request, RequestSet};
use tracing::debug;

/// Every `k`-subset of `columns`, in lexicographic order of positions
pub fn combinations(columns: &[String], k: usize) -> Vec<Vec<String>> {
    let n = columns.len();
    if k == 0 || k > n {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut index: Vec<usize> = (0..k).collect();
    loop {
        out.push(index.iter().map(|i| columns[*i].clone()).collect());
        // Rightmost position that can still advance
        let Some(i) = (0..k).rev().find(|i| index[*i] != i + n - k) else {
            return out;
        };
        index[i] += 1;
        for j in i + 1..k {
            index[j] = index[j - 1] + 1;
        }
    }
}

/// Replace every request larger than `arity` by all its `arity`-subsets
///
/// An arity of 0 means unbounded and leaves the set untouched. Returns the
/// number of requests that were expanded.
pub fn expand_requests(requests: &mut RequestSet, arity: usize) -> usize {
    if arity == 0 || requests.iter().all(|r| r.len() <= arity) {
        return 0;
    }
    let mut expanded = 0;
    for request in requests.take_requests() {
        if request.len() <= arity {
            requests.add_request(request);
            continue;
        }
        expanded += 1;
        let subsets = combinations(request.columns(), arity);
        debug!(
            request = %request.label(),
            arity,
            subsets = subsets.len(),
            "expanding request to the engine arity"
        );
        for subset in subsets {
            requests.add_request(Request::new(subset));
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pairs() {
        let pairs = combinations(&names(&["a", "b", "c"]), 2);
        assert_eq!(
            pairs,
            vec![names(&["a", "b"]), names(&["a", "c"]), names(&["b", "c"])]
        );
        assert_eq!(combinations(&names(&["a", "b", "c", "d", "e"]), 3).len(), 10);
        assert!(combinations(&names(&["a"]), 2).is_empty());
        assert_eq!(combinations(&names(&["a", "b"]), 2).len(), 1);
    }

    #[test]
    fn test_expand_requests() {
        let mut requests = RequestSet::new();
        requests.add_request(Request::new(["x", "y", "z"]));
        requests.add_column_pair("y", "x");
        requests.add_column("w");
        assert_eq!(expand_requests(&mut requests, 2), 1);
        let labels: Vec<String> = requests.iter().map(Request::label).collect();
        // (y,x) is the same request as the subset (x,y)
        assert_eq!(labels, vec!["x,y", "x,z", "y,z", "w"]);
        assert_eq!(expand_requests(&mut requests, 0), 0);
    }
}
