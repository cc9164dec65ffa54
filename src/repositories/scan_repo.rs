use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::{error::ApiError, models::ScanContext};

/// Mutation applied to a scan context under the store's entry lock.
/// Implementations must validate before writing so a failed mutation
/// leaves the context untouched.
pub type ScanMutation = Box<dyn FnOnce(&mut ScanContext) -> Result<(), ApiError> + Send>;

/// Narrow persistence seam for scan state. The orchestration core depends
/// only on this trait, not on any specific storage engine.
#[async_trait]
pub trait ScanRepository: Send + Sync {
    async fn create(&self, ctx: ScanContext) -> Result<ScanContext, ApiError>;
    async fn get(&self, id: &Uuid) -> Result<Option<ScanContext>, ApiError>;
    /// Applies `mutate` atomically to the stored context and returns the
    /// updated snapshot. Concurrent updates to different scan ids do not
    /// block each other.
    async fn update(&self, id: &Uuid, mutate: ScanMutation) -> Result<ScanContext, ApiError>;
    async fn list(&self) -> Result<Vec<ScanContext>, ApiError>;
}

/// In-memory scan store: an arena keyed by scan id. Swappable for a real
/// database implementation behind the same trait.
pub struct InMemoryScanRepository {
    scans: DashMap<Uuid, ScanContext>,
}

impl InMemoryScanRepository {
    pub fn new() -> Self {
        Self {
            scans: DashMap::new(),
        }
    }
}

impl Default for InMemoryScanRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScanRepository for InMemoryScanRepository {
    async fn create(&self, ctx: ScanContext) -> Result<ScanContext, ApiError> {
        let snapshot = ctx.clone();
        self.scans.insert(ctx.scan_id, ctx);
        Ok(snapshot)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<ScanContext>, ApiError> {
        Ok(self.scans.get(id).map(|entry| entry.clone()))
    }

    async fn update(&self, id: &Uuid, mutate: ScanMutation) -> Result<ScanContext, ApiError> {
        let mut entry = self
            .scans
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("Scan {} not found", id)))?;
        mutate(entry.value_mut())?;
        Ok(entry.clone())
    }

    async fn list(&self) -> Result<Vec<ScanContext>, ApiError> {
        let mut scans: Vec<ScanContext> =
            self.scans.iter().map(|entry| entry.clone()).collect();
        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(scans)
    }
}
