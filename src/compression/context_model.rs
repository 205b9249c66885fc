/// Total count at which a context's statistics are halved.
pub const CONTEXT_WEIGHT_LIMIT: u32 = 1024;

/// Adaptive estimate of a binary source: observed counts of 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    count0: u32,
    count1: u32,
}

impl Context {
    pub fn new() -> Self {
        Self {
            count0: 1,
            count1: 1,
        }
    }

    pub fn with_counts(count0: u32, count1: u32) -> Self {
        assert!(count0 > 0 && count1 > 0, "context counts must be positive");
        Self { count0, count1 }
    }

    #[inline]
    pub fn count0(&self) -> u32 {
        self.count0
    }

    #[inline]
    pub fn count1(&self) -> u32 {
        self.count1
    }

    #[inline]
    pub fn weight(&self) -> u32 {
        self.count0 + self.count1
    }

    /// Records one observation, ageing the counts once they reach the limit.
    #[inline]
    pub fn update(&mut self, bit: bool) {
        if bit {
            self.count1 += 1;
        } else {
            self.count0 += 1;
        }
        if self.weight() >= CONTEXT_WEIGHT_LIMIT {
            self.halve();
        }
    }

    pub fn halve(&mut self) {
        self.count0 = (self.count0 >> 1).max(1);
        self.count1 = (self.count1 >> 1).max(1);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// The contexts owned by one coder instance, addressed by small integer ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSet {
    contexts: Vec<Context>,
}

impl ContextSet {
    pub fn new(num_contexts: usize) -> Self {
        Self {
            contexts: vec![Context::new(); num_contexts],
        }
    }

    pub fn init_contexts(&mut self) {
        self.contexts.fill(Context::new());
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    #[inline]
    pub fn get(&self, id: usize) -> &Context {
        &self.contexts[id]
    }

    #[inline]
    pub fn update(&mut self, id: usize, bit: bool) {
        self.contexts[id].update(bit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_prior_is_unbiased() {
        let ctx = Context::new();
        assert_eq!((ctx.count0(), ctx.count1()), (1, 1));
    }

    #[test]
    fn test_ageing_halves_counts() {
        let mut ctx = Context::with_counts(700, 322);
        ctx.update(true);
        assert_eq!(ctx.weight(), 1023);
        ctx.update(false);
        assert_eq!((ctx.count0(), ctx.count1()), (350, 161));
    }

    #[test]
    fn test_ageing_never_reaches_zero() {
        let mut ctx = Context::new();
        for _ in 0..10_000 {
            ctx.update(false);
            assert!(ctx.count1() >= 1);
            assert!(ctx.weight() < CONTEXT_WEIGHT_LIMIT);
        }
        assert_eq!(ctx.count1(), 1);
    }

    #[test]
    fn test_halving_preserves_ratio() {
        let mut ctx = Context::with_counts(600, 200);
        ctx.halve();
        assert_eq!((ctx.count0(), ctx.count1()), (300, 100));

        let mut ctx = Context::with_counts(1, 1);
        ctx.halve();
        assert_eq!((ctx.count0(), ctx.count1()), (1, 1));
    }

    #[test]
    fn test_context_set_reset() {
        let mut set = ContextSet::new(3);
        set.update(1, true);
        set.update(1, true);
        assert_eq!(set.get(1).count1(), 3);
        set.init_contexts();
        assert_eq!(*set.get(1), Context::new());
        assert_eq!(set.len(), 3);
    }
}
