/// Result of one best-effort step in a fallback chain. `Empty` and `Failed`
/// both mean "try the next link"; only the log line differs.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Found(T),
    Empty,
    Failed(String),
}

impl<T> Signal<Vec<T>> {
    pub fn from_list<E: std::fmt::Display>(result: Result<Vec<T>, E>) -> Self {
        match result {
            Ok(items) if items.is_empty() => Signal::Empty,
            Ok(items) => Signal::Found(items),
            Err(err) => Signal::Failed(err.to_string()),
        }
    }

    /// Collapses to the list the rest of the job works with.
    pub fn into_items(self) -> Vec<T> {
        match self {
            Signal::Found(items) => items,
            Signal::Empty | Signal::Failed(_) => Vec::new(),
        }
    }
}

impl<T> Signal<T> {
    pub fn label(&self) -> &'static str {
        match self {
            Signal::Found(_) => "found",
            Signal::Empty => "empty",
            Signal::Failed(_) => "failed",
        }
    }
}
