/*!
 * Backends for the export pipeline
 *
 * - `github`: audit event source (GitHub REST API)
 * - `s3`: archive object storage
 * - `dynamodb`: checkpoint log
 */

pub mod dynamodb;
pub mod github;
pub mod s3;

pub use dynamodb::DynamoCheckpointStore;
pub use github::GitHubAuditClient;
pub use s3::S3ArchiveStore;
