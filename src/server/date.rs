//! Cached `Date` header value
//!
//! The formatted value only changes once per second, so every worker
//! keeps a thread-local copy and refreshes it on use. Readers never
//! take a lock.
use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};

use httpdate::fmt_http_date;

/// Length of `Sun, 06 Nov 1994 08:49:37 GMT`
pub const DATE_VALUE_LENGTH: usize = 29;

thread_local!(static CACHED: RefCell<CachedDate> = {
    RefCell::new(CachedDate { value: String::new(), second: 0 })
});

struct CachedDate {
    value: String,
    second: u64,
}

impl CachedDate {
    fn check(&mut self) {
        let now = SystemTime::now();
        let second = now.duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if self.second != second || self.value.is_empty() {
            self.value = fmt_http_date(now);
            debug_assert_eq!(self.value.len(), DATE_VALUE_LENGTH);
            self.second = second;
        }
    }
}

/// Run `f` with the current IMF-fixdate string
pub fn with<F, R>(f: F) -> R
    where F: FnOnce(&str) -> R
{
    CACHED.with(|cell| {
        let mut cached = cell.borrow_mut();
        cached.check();
        f(&cached.value)
    })
}

#[cfg(test)]
mod test {
    use httpdate;

    use super::{DATE_VALUE_LENGTH, with};

    #[test]
    fn format() {
        with(|date| {
            assert_eq!(date.len(), DATE_VALUE_LENGTH);
            assert!(date.ends_with(" GMT"));
            httpdate::parse_http_date(date).unwrap();
        });
    }

    #[test]
    fn stable_within_second() {
        let first = with(|date| date.to_string());
        let again = with(|date| date.to_string());
        // the clock may tick between the calls, but the cached copy
        // must at least parse either way
        assert_eq!(first.len(), again.len());
    }
}
