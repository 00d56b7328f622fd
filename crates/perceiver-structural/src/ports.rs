use async_trait::async_trait;

use crate::errors::PerceiverError;
use crate::model::ElementDescriptor;

/// Raw access to the live UI tree of one device session.
///
/// Implementations return the current element forest in document order.
/// Calls must not mutate script-visible state.
#[async_trait]
pub trait ScreenSource: Send + Sync {
    async fn dump_tree(&self) -> Result<Vec<ElementDescriptor>, PerceiverError>;
}

#[async_trait]
impl ScreenSource for Vec<ElementDescriptor> {
    async fn dump_tree(&self) -> Result<Vec<ElementDescriptor>, PerceiverError> {
        Ok(self.clone())
    }
}
