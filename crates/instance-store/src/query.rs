/// Builder for constructing instance queries.
///
/// Allows listing instances by saga type and current state, e.g. for
/// retention jobs or operational inspection.
#[derive(Debug, Clone, Default)]
pub struct InstanceQuery {
    /// Filter by saga type.
    pub saga_type: Option<String>,

    /// Filter by current state name (any of these).
    pub states: Option<Vec<String>>,

    /// Maximum number of instances to return.
    pub limit: Option<usize>,

    /// Number of instances to skip.
    pub offset: Option<usize>,
}

impl InstanceQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for instances of a specific saga type.
    pub fn for_saga_type(saga_type: impl Into<String>) -> Self {
        Self {
            saga_type: Some(saga_type.into()),
            ..Default::default()
        }
    }

    /// Filters by saga type.
    pub fn saga_type(mut self, saga_type: impl Into<String>) -> Self {
        self.saga_type = Some(saga_type.into());
        self
    }

    /// Filters by a single state.
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.states = Some(vec![state.into()]);
        self
    }

    /// Filters by multiple states (any of these).
    pub fn states(mut self, states: Vec<String>) -> Self {
        self.states = Some(states);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first N results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the record satisfies every filter (ignores paging).
    pub fn matches(&self, record: &crate::InstanceRecord) -> bool {
        if let Some(ref saga_type) = self.saga_type
            && &record.saga_type != saga_type
        {
            return false;
        }
        if let Some(ref states) = self.states
            && !states.contains(&record.current_state)
        {
            return false;
        }
        true
    }
}
