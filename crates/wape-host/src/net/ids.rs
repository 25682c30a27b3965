/// Wrapping counter over `1..=i32::MAX` that skips ids still in use.
///
/// Both registries allocate under their own lock, so "not in use" is
/// verified against the same table the id is inserted into.
#[derive(Debug)]
pub(crate) struct IdCounter {
    next: i32,
}

impl IdCounter {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    /// Return the next id for which `in_use` is false.
    ///
    /// Callers cap their tables far below `i32::MAX` entries, so a free id
    /// always exists.
    pub(crate) fn allocate(&mut self, in_use: impl Fn(i32) -> bool) -> i32 {
        loop {
            let candidate = self.next;
            self.next = if self.next == i32::MAX { 1 } else { self.next + 1 };
            if !in_use(candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let mut ids = IdCounter::new();
        assert_eq!(ids.allocate(|_| false), 1);
        assert_eq!(ids.allocate(|_| false), 2);
        assert_eq!(ids.allocate(|_| false), 3);
    }

    #[test]
    fn test_skips_ids_in_use() {
        let mut ids = IdCounter::new();
        assert_eq!(ids.allocate(|id| id == 1 || id == 2), 3);
    }

    #[test]
    fn test_wraps_to_one() {
        let mut ids = IdCounter { next: i32::MAX };
        assert_eq!(ids.allocate(|_| false), i32::MAX);
        assert_eq!(ids.allocate(|_| false), 1);
    }
}
