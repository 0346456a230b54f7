/*!
 * Protocol layer: data structures, constants, and endpoint handling.
 *
 * Everything related to *what* we send to the collector:
 * - `types`: Report, Payload, attributes, breadcrumbs
 * - `result`: ReportStatus and ReportResult
 * - `endpoint`: universe/token resolution and URL derivation
 * - `form`: multipart report encoding
 * - `constants`: agent identity, hosts, field names
 */

pub mod constants;
pub mod endpoint;
pub mod form;
pub mod result;
pub mod types;
