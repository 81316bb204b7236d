use std::{sync::Arc, ops::Deref};
use once_cell::sync::Lazy;

type LazyResult<T, E> = Lazy<Result<T, E>, Box<dyn FnOnce() -> Result<T, E> + Send + Sync>>;

/// A shareable, lazily computed, fallible value. The computation runs at most
/// once, on first access, and its outcome is shared by every clone.
#[derive(Debug)]
pub struct LazyFallibleArc<T, E>(Arc<LazyResult<T, E>>);

impl<T, E> LazyFallibleArc<T, E> {
    #[inline(always)]
    pub fn new<F>(with: F) -> Self
        where F: FnOnce() -> Result<T, E> + Send + Sync + 'static
    {
        LazyFallibleArc(Arc::new(Lazy::new(Box::new(with))))
    }

    pub fn force(&self) -> Result<&T, &E> {
        Lazy::force(&*self.0).as_ref()
    }

    /// Whether the computation has already run.
    pub fn is_forced(&self) -> bool {
        Lazy::get(&*self.0).is_some()
    }
}

impl<T, E> Clone for LazyFallibleArc<T, E> {
    #[inline(always)]
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T, E> Deref for LazyFallibleArc<T, E> {
    type Target = Result<T, E>;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &**self.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use super::LazyFallibleArc;

    #[test]
    fn computes_once_across_clones() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = LazyFallibleArc::<usize, ()>::new(move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst) + 10)
        });

        let clone = lazy.clone();
        assert!(!lazy.is_forced());
        assert_eq!(lazy.force(), Ok(&10));
        assert_eq!(clone.force(), Ok(&10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
