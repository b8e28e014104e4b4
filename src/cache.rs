use chrono::{DateTime, Utc};

/// A value together with the wall-clock time it was last stored.
///
/// The payload and its timestamp always travel together, so a cache is either
/// empty or holds both.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<T> {
    entry: Option<(T, DateTime<Utc>)>,
}

impl<T> Default for CachedValue<T> {
    fn default() -> CachedValue<T> {
        CachedValue { entry: None }
    }
}

impl<T> CachedValue<T> {
    #[allow(dead_code)]
    pub fn new() -> CachedValue<T> {
        CachedValue::default()
    }

    /// Stores `value`, stamped with the current time.
    pub fn set(&mut self, value: T) {
        self.set_at(value, Utc::now());
    }

    pub fn set_at(&mut self, value: T, at: DateTime<Utc>) {
        self.entry = Some((value, at));
    }

    pub fn value(&self) -> Option<&T> {
        self.entry.as_ref().map(|(value, _)| value)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|(_, at)| *at)
    }

    /// Whole minutes since the value was last set, or `None` if it never was.
    pub fn age_in_minutes(&self) -> Option<i64> {
        self.age_in_minutes_at(Utc::now())
    }

    /// Same as [`CachedValue::age_in_minutes`], measured against `now`. A
    /// timestamp in the future counts as age 0.
    pub fn age_in_minutes_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_updated()
            .map(|at| now.signed_duration_since(at).num_minutes().max(0))
    }
}
