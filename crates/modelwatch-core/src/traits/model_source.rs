// # Model Source Trait
//
// Defines the interface for fetching one provider's model listing.
//
// ## Implementations
//
// - LMArena listing: `modelwatch-source-arena` crate
// - DesignArena bundle: `modelwatch-source-designarena` crate
// - OpenAI `/v1/models`: `modelwatch-source-openai` crate
// - Google Generative Language: `modelwatch-source-google` crate
//
// ## Responsibility boundary
//
// Sources are observers, not decision-makers. They turn one upstream payload
// into a uniform entry list and report failures as errors; everything else
// (debouncing, diffing, persistence, scheduling, retries) is owned by the
// engine. A source must not:
//
// - keep state between fetches beyond connection reuse
// - retry or back off internally (the next scheduled tick is the retry)
// - spawn tasks or decide when to run
//
// An upstream that genuinely lists zero entries is a successful empty fetch,
// not an error; the engine's removal debouncer decides what that means.

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::error::Result;
use crate::model::ModelEntry;

/// Trait for source adapter implementations
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait ModelSource: Send + Sync {
    /// Fetch the current model listing
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<ModelEntry>)`: the listing, possibly empty
    /// - `Err(Error)`: the upstream was unreachable, returned a non-success
    ///   status, or produced a payload that could not be parsed
    async fn fetch_models(&self) -> Result<Vec<ModelEntry>>;

    /// Short source name for logging and reports (e.g. "arena", "openai")
    fn source_name(&self) -> &str;
}

/// Helper trait for constructing sources from configuration
pub trait ModelSourceFactory: Send + Sync {
    /// Create a ModelSource instance from configuration
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn ModelSource>>;
}
