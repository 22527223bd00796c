use crate::{Draft, Result};

/// Hook invoked once per entity and per save, before any statement is built.
///
/// An interceptor applies to the type it names and to every type extending it, so an
/// interceptor declared for a mapped superclass sees all its entities.
pub trait DraftInterceptor: Send + Sync {
    /// Name of the intercepted type.
    fn type_name(&self) -> &str;

    /// May assign unloaded props, assigned ones cannot be cleared.
    fn before_save(&self, draft: &mut Draft<'_>, is_new: bool) -> Result<()>;
}

/// Interceptor built from a closure.
pub struct FnInterceptor<F> {
    type_name: String,
    f: F,
}

impl<F> FnInterceptor<F>
where
    F: Fn(&mut Draft<'_>, bool) -> Result<()> + Send + Sync,
{
    pub fn new(type_name: impl Into<String>, f: F) -> Self {
        Self {
            type_name: type_name.into(),
            f,
        }
    }
}

impl<F> DraftInterceptor for FnInterceptor<F>
where
    F: Fn(&mut Draft<'_>, bool) -> Result<()> + Send + Sync,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }
    fn before_save(&self, draft: &mut Draft<'_>, is_new: bool) -> Result<()> {
        (self.f)(draft, is_new)
    }
}
