pub mod vision;

use anyhow::{Context, Result};
use std::marker::PhantomData;

/// A stateless conversion from `I` to `O`, used to turn streamed dataset items (paths,
/// encoded bytes) into tensors.
///
/// Steps compose with `.then(...)`; the intermediate type must line up and be `Send` so a
/// chain can run inside a streaming source.
pub trait Transform<I, O>: Send + Sync {
    fn apply(&self, input: I) -> Result<O>;

    #[inline]
    fn then<T, M>(self, next: T) -> Chain<Self, T, O>
    where
        Self: Sized,
        T: Transform<O, M>,
        O: Send,
        M: Send,
    {
        Chain {
            first: self,
            second: next,
            _marker: PhantomData,
        }
    }
}

/// Two transforms run back to back (`A` then `B`), with `M` the value handed between them.
#[derive(Debug, Clone)]
pub struct Chain<A, B, M> {
    first: A,
    second: B,
    _marker: PhantomData<fn() -> M>,
}

impl<I, M, O, A, B> Transform<I, O> for Chain<A, B, M>
where
    A: Transform<I, M>,
    B: Transform<M, O>,
    M: Send,
{
    fn apply(&self, input: I) -> Result<O> {
        let mid = self.first.apply(input)?;
        self.second.apply(mid).with_context(|| {
            format!(
                "Transform {} failed after {}",
                std::any::type_name::<B>(),
                std::any::type_name::<A>()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct Double;
    impl Transform<u32, u32> for Double {
        fn apply(&self, input: u32) -> Result<u32> {
            Ok(input * 2)
        }
    }

    struct NonZero;
    impl Transform<u32, u32> for NonZero {
        fn apply(&self, input: u32) -> Result<u32> {
            if input == 0 {
                bail!("zero");
            }
            Ok(input)
        }
    }

    #[test]
    fn test_then_runs_in_order() -> Result<()> {
        let chain = Double.then(NonZero).then(Double);
        assert_eq!(chain.apply(3)?, 12);
        Ok(())
    }

    #[test]
    fn test_chain_error_names_failing_step() {
        let err = Double.then(NonZero).apply(0).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("NonZero"), "{message}");
        assert!(message.contains("zero"), "{message}");
    }
}
