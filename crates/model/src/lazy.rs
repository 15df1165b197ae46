/// A lazily populated field: either not fetched yet or fetched with a value.
///
/// A fetch that found nothing is expressed by the inner type (`Lazy<Option<_>>`),
/// so it stays distinguishable from a fetch never attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct Lazy<T>(Option<T>);

impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Lazy<T> {
    /// Not fetched yet.
    pub const fn new() -> Self {
        Self(None)
    }

    pub fn loaded(value: T) -> Self {
        Self(Some(value))
    }

    pub fn is_loaded(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    /// Return the loaded value, running `load` on first access.
    ///
    /// A failed load leaves the field unloaded so the next access retries.
    pub fn get_or_try_load<E>(&mut self, load: impl FnOnce() -> Result<T, E>) -> Result<&mut T, E> {
        let value = match self.0.take() {
            Some(v) => v,
            None => load()?,
        };
        Ok(self.0.insert(value))
    }
}
