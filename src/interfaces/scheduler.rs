use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Background job driven by [`crate::scheduler::Scheduler`].
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;
    /// Whether the first run happens at start instead of after one interval.
    fn run_at_start(&self) -> bool {
        true
    }
    async fn run(&self) -> Result<()>;
}
