/*!
 * Admission control: local gates applied before any network dispatch.
 *
 * - `sampler`: probabilistic keep/drop
 * - `rate_limit`: reports per 60-second window
 *
 * The user filter is the third gate; it is a plain predicate held by the
 * client options.
 */

pub mod rate_limit;
pub mod sampler;

pub use rate_limit::RateLimiter;
pub use sampler::Sampler;
