use crate::error::Result;

/// Value codec used at the view's read boundary
///
/// Storage never decodes; values are kept exactly as they arrived on the log.
pub trait Codec: Send + Sync + 'static {
    type Value: Send;

    fn encode(&self, value: &Self::Value) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Value>;

    /// Codec name, used in logs and status output
    fn name(&self) -> &str;
}
