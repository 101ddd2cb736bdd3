//! Conditional, transforming edges

use std::any::{Any, type_name};

use super::node::Payload;

type Guard<B> = Box<dyn Fn(&B) -> bool + Send + Sync>;
type Transform<B, C> = Box<dyn Fn(B) -> C + Send + Sync>;

/// Typed description of an edge from a node producing `B` to a node
/// consuming `C`
///
/// ```ignore
/// builder.edge(render, corrector, EdgeSpec::forward().on_condition(|o: &RenderOutcome| o.is_failure()));
/// builder.edge(acceptance, rewrite, EdgeSpec::map(|r: AcceptanceResult<_>| r.rejection_input()));
/// ```
pub struct EdgeSpec<B, C> {
    guard: Option<Guard<B>>,
    transform: Transform<B, C>,
}

impl<B: Send + 'static> EdgeSpec<B, B> {
    /// Pass the value through unchanged
    pub fn forward() -> Self {
        Self {
            guard: None,
            transform: Box::new(|value| value),
        }
    }
}

impl<B: Send + 'static, C: Send + 'static> EdgeSpec<B, C> {
    /// Convert the value while traversing the edge
    pub fn map(f: impl Fn(B) -> C + Send + Sync + 'static) -> Self {
        Self {
            guard: None,
            transform: Box::new(f),
        }
    }

    /// Only take this edge when `guard` holds for the source output
    pub fn on_condition(mut self, guard: impl Fn(&B) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    pub(crate) fn into_edge(self, target: usize) -> Edge {
        let guard = self.guard.map(|g| {
            Box::new(move |value: &(dyn Any + Send)| value.downcast_ref::<B>().is_some_and(|v| g(v))) as ErasedGuard
        });
        let transform = self.transform;
        Edge {
            target,
            guard,
            transform: Box::new(move |value: Payload| {
                let value = value.downcast::<B>().map_err(|_| type_name::<B>())?;
                Ok(Box::new(transform(*value)) as Payload)
            }),
        }
    }
}

type ErasedGuard = Box<dyn Fn(&(dyn Any + Send)) -> bool + Send + Sync>;
type ErasedTransform = Box<dyn Fn(Payload) -> Result<Payload, &'static str> + Send + Sync>;

/// Type-erased edge stored in a built graph
pub(crate) struct Edge {
    pub(crate) target: usize,
    guard: Option<ErasedGuard>,
    transform: ErasedTransform,
}

impl Edge {
    pub(crate) fn is_conditional(&self) -> bool {
        self.guard.is_some()
    }

    /// An edge without a guard accepts every value
    pub(crate) fn accepts(&self, value: &(dyn Any + Send)) -> bool {
        self.guard.as_ref().is_none_or(|g| g(value))
    }

    /// Convert the source output into the target input; `Err` carries the
    /// expected type name
    pub(crate) fn traverse(&self, value: Payload) -> Result<Payload, &'static str> {
        (self.transform)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_edge_accepts_everything() {
        let edge = EdgeSpec::<u32, u32>::forward().into_edge(3);
        assert!(!edge.is_conditional());
        assert!(edge.accepts(&5u32));
        let out = edge.traverse(Box::new(5u32)).unwrap();
        assert_eq!(*out.downcast::<u32>().unwrap(), 5);
        assert_eq!(edge.target, 3);
    }

    #[test]
    fn test_conditional_map_edge() {
        let edge = EdgeSpec::map(|n: u32| format!("n={n}"))
            .on_condition(|n: &u32| *n > 10)
            .into_edge(0);

        assert!(!edge.accepts(&4u32));
        assert!(edge.accepts(&11u32));
        // a payload of the wrong type never satisfies the guard
        assert!(!edge.accepts(&"11"));

        let out = edge.traverse(Box::new(11u32)).unwrap();
        assert_eq!(*out.downcast::<String>().unwrap(), "n=11");
    }

    #[test]
    fn test_traverse_reports_type_mismatch() {
        let edge = EdgeSpec::<u32, u32>::forward().into_edge(0);
        assert_eq!(edge.traverse(Box::new("x")).err(), Some(type_name::<u32>()));
    }
}
