//! Ordered model fallback chain for one provider.

use crate::error::{EaselError, Result};
use crate::types::ModelId;
use serde::Deserialize;
use std::future::Future;

/// An ordered list of models to attempt: primary first, then fallbacks.
///
/// The chain advances only on access/availability failures; transient rate
/// limits retry the same model and never consume a fallback slot. A
/// fallback may repeat the primary, which simply grants that model another
/// full retry budget.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct ModelChain {
    models: Vec<ModelId>,
}

impl ModelChain {
    /// Creates a chain from an ordered list of models.
    pub fn new(models: Vec<ModelId>) -> Self {
        Self { models }
    }

    /// Creates a chain holding a single model.
    pub fn single(model: impl Into<ModelId>) -> Self {
        Self {
            models: vec![model.into()],
        }
    }

    /// Returns the primary model, if the chain is non-empty.
    pub fn primary(&self) -> Option<&ModelId> {
        self.models.first()
    }

    /// Returns true if the chain holds no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Returns the number of models in the chain.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Runs `op` against each model in order.
    ///
    /// Advances only when the failure says the model itself is unreachable
    /// (`AccessDenied`/`ModelUnavailable`); every other failure is returned
    /// to the caller unchanged, including the last model's error when the
    /// chain runs out.
    pub async fn try_each<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(ModelId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.models.is_empty() {
            return Err(EaselError::Config("model chain is empty".into()));
        }

        let mut last: Option<EaselError> = None;
        for model in &self.models {
            match op(model.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.advances_model() => {
                    tracing::warn!(
                        model = %model,
                        error = %err,
                        "model unreachable, falling back to next"
                    );
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last.unwrap_or_else(|| EaselError::Config("model chain is empty".into())))
    }
}

impl<S: Into<ModelId>> FromIterator<S> for ModelChain {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            models: iter.into_iter().map(Into::into).collect(),
        }
    }
}
