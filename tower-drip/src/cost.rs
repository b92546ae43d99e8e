use std::fmt;
use std::sync::Arc;

/// How many tokens one request consumes: a constant, or a number
/// derived from the request itself (e.g. payload size).
///
/// Resolved once per request to a plain non-negative number before the
/// decision engine sees it.
pub enum Cost<Req> {
    /// Every request costs the same.
    Fixed(f64),
    /// Cost resolved per request.
    Dynamic(Arc<dyn Fn(&Req) -> f64 + Send + Sync>),
}

impl<Req> Cost<Req> {
    /// A cost derived from each request.
    pub fn dynamic<F>(resolver: F) -> Self
    where
        F: Fn(&Req) -> f64 + Send + Sync + 'static,
    {
        Cost::Dynamic(Arc::new(resolver))
    }

    /// Resolve the cost of one request.
    ///
    /// Negative and non-finite resolver results are clamped to zero, a
    /// cost the decision engine always admits.
    pub fn resolve(&self, req: &Req) -> f64 {
        let cost = match self {
            Cost::Fixed(value) => *value,
            Cost::Dynamic(resolver) => resolver(req),
        };
        if cost.is_finite() { cost.max(0.0) } else { 0.0 }
    }
}

impl<Req> Clone for Cost<Req> {
    fn clone(&self) -> Self {
        match self {
            Cost::Fixed(value) => Cost::Fixed(*value),
            Cost::Dynamic(resolver) => Cost::Dynamic(Arc::clone(resolver)),
        }
    }
}

impl<Req> fmt::Debug for Cost<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cost::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Cost::Dynamic(_) => f.debug_tuple("Dynamic").finish(),
        }
    }
}

impl<Req> Default for Cost<Req> {
    fn default() -> Self {
        Cost::Fixed(1.0)
    }
}

impl<Req> From<f64> for Cost<Req> {
    fn from(value: f64) -> Self {
        Cost::Fixed(value)
    }
}
