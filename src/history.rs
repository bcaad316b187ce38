use std::sync::Arc;

/// Identity of a generation result: the millisecond timestamp it was created at.
///
/// Timestamps are forced to be strictly increasing by [`Clock`], so two results
/// never share a key even when they arrive within the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResultId(pub i64);

/// One model returned by the generation service (or the startup example).
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Base64 text of the binary glTF payload, exactly as received.
    pub encoded_asset: Arc<str>,
    pub thumbnail_url: Arc<str>,
    pub created_at: ResultId,
}

impl GenerationResult {
    pub fn id(&self) -> ResultId {
        self.created_at
    }
}

/// Hands out strictly increasing timestamps for [`ResultId`]s.
#[derive(Debug, Default)]
pub struct Clock {
    last: Option<i64>,
}

impl Clock {
    pub fn now(&mut self) -> ResultId {
        self.stamp(chrono::Utc::now().timestamp_millis())
    }

    /// Like [`Clock::now`] with an explicit wall-clock reading.
    pub fn stamp(&mut self, millis: i64) -> ResultId {
        let next = match self.last {
            Some(last) if millis <= last => last + 1,
            _ => millis,
        };
        self.last = Some(next);
        ResultId(next)
    }
}

/// Session history: append-only, insertion ordered, never persisted.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<Arc<GenerationResult>>,
}

impl History {
    pub fn push(&mut self, result: Arc<GenerationResult>) {
        self.entries.push(result);
    }

    pub fn get(&self, id: ResultId) -> Option<&Arc<GenerationResult>> {
        self.entries.iter().find(|entry| entry.created_at == id)
    }

    pub fn entries(&self) -> &[Arc<GenerationResult>] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Arc<GenerationResult>> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: i64) -> Arc<GenerationResult> {
        Arc::new(GenerationResult {
            encoded_asset: Arc::from("Zm9v"),
            thumbnail_url: Arc::from("data:image/png;base64,"),
            created_at: ResultId(id),
        })
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let mut clock = Clock::default();
        assert_eq!(clock.stamp(100), ResultId(100));
        assert_eq!(clock.stamp(100), ResultId(101));
        assert_eq!(clock.stamp(50), ResultId(102));
        assert_eq!(clock.stamp(500), ResultId(500));
    }

    #[test]
    fn history_keeps_insertion_order_without_dedup() {
        let mut history = History::default();
        history.push(result(3));
        history.push(result(1));
        history.push(result(2));

        let ids: Vec<_> = history.entries().iter().map(|r| r.id().0).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(history.get(ResultId(1)).map(|r| r.id()), Some(ResultId(1)));
        assert!(history.get(ResultId(9)).is_none());
    }
}
