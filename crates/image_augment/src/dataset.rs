use crate::transforms::Transform;
use anyhow::Result;
use std::marker::PhantomData;
use std::sync::Arc;

/// A `DataSource` yields the items of a dataset one at a time.
///
/// Each call to `stream()` starts a fresh pass, so a source consumed by the mean image
/// accumulator can be streamed again for training.
///
/// All implementations must be `Send + Sync` to allow for safe sharing across threads.
pub trait DataSource<T>: Send + Sync {
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<T>> + Send>>;
}

/// Applies a `Transform` lazily to every item streamed from an inner source.
///
/// # Example
/// ```ignore
/// let paths = ImageDirSource::new("./data/train", &["jpg", "png"], true);
/// let images = TransformedSource::new(paths, LoadImage.then(ToTensor::new(224, 224, ChannelOrder::Rgb)));
/// let (mean, count) = compute_mean_image(images.stream()?)?;
/// ```
pub struct TransformedSource<S, T, I> {
    source: S,
    transform: Arc<T>,
    _marker: PhantomData<fn(I)>,
}

impl<S, T, I> TransformedSource<S, T, I> {
    pub fn new(source: S, transform: T) -> Self {
        Self {
            source,
            transform: Arc::new(transform),
            _marker: PhantomData,
        }
    }
}

impl<S, T, I, O> DataSource<O> for TransformedSource<S, T, I>
where
    S: DataSource<I>,
    T: Transform<I, O> + 'static,
    I: 'static,
    O: 'static,
{
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<O>> + Send>> {
        let transform = Arc::clone(&self.transform);
        let iter = self
            .source
            .stream()?
            .map(move |item| item.and_then(|input| transform.apply(input)));
        Ok(Box::new(iter))
    }
}
