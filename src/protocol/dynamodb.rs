//! Checkpoint store backed by a DynamoDB table
//!
//! Table layout: hash key `EventDate` (partition, `YYYY-MM-DD`), range key
//! `CreatedAt`, plus `From` and `To` describing the exported window. All
//! timestamps are stored as fixed-width UTC RFC 3339 strings so the range
//! key sorts chronologically.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::pipeline::{format_timestamp, parse_timestamp, Checkpoint, CheckpointStore};

pub const ATTR_EVENT_DATE: &str = "EventDate";
pub const ATTR_CREATED_AT: &str = "CreatedAt";
pub const ATTR_FROM: &str = "From";
pub const ATTR_TO: &str = "To";

type Item = HashMap<String, AttributeValue>;

/// Append-only checkpoint log in DynamoDB
pub struct DynamoCheckpointStore {
    client: Client,
    table: String,
}

impl DynamoCheckpointStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Build a client from the shared AWS config with a per-operation timeout
    pub fn from_shared_config(shared: &SdkConfig, table: impl Into<String>, timeout: Duration) -> Self {
        let config = aws_sdk_dynamodb::config::Builder::from(shared)
            .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build())
            .build();
        Self::new(Client::from_conf(config), table)
    }
}

#[async_trait]
impl CheckpointStore for DynamoCheckpointStore {
    async fn latest(&self, partition: &str) -> Result<Option<Checkpoint>> {
        let output = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression("#date = :date")
            .expression_attribute_names("#date", ATTR_EVENT_DATE)
            .expression_attribute_values(":date", AttributeValue::S(partition.to_string()))
            .scan_index_forward(false)
            .limit(1)
            .send()
            .await
            .map_err(|e| {
                ExportError::Checkpoint(format!(
                    "query on {} failed: {}",
                    self.table,
                    DisplayErrorContext(&e)
                ))
            })?;

        match output.items().first() {
            Some(item) => {
                let checkpoint = checkpoint_from_item(item)?;
                debug!("Latest checkpoint in {}: {:?}", partition, checkpoint);
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item_from_checkpoint(checkpoint)))
            .condition_expression("attribute_not_exists(#created)")
            .expression_attribute_names("#created", ATTR_CREATED_AT)
            .send()
            .await
            .map_err(|e| {
                let conflict = matches!(
                    &e,
                    SdkError::ServiceError(service) if service.err().is_conditional_check_failed_exception()
                );
                if conflict {
                    ExportError::CheckpointConflict {
                        partition: checkpoint.partition.clone(),
                        created_at: format_timestamp(checkpoint.created_at),
                    }
                } else {
                    ExportError::Checkpoint(format!(
                        "put into {} failed: {}",
                        self.table,
                        DisplayErrorContext(&e)
                    ))
                }
            })?;
        Ok(())
    }
}

/// Encode a checkpoint as a table item
pub fn item_from_checkpoint(checkpoint: &Checkpoint) -> Item {
    HashMap::from([
        (
            ATTR_EVENT_DATE.to_string(),
            AttributeValue::S(checkpoint.partition.clone()),
        ),
        (
            ATTR_CREATED_AT.to_string(),
            AttributeValue::S(format_timestamp(checkpoint.created_at)),
        ),
        (
            ATTR_FROM.to_string(),
            AttributeValue::S(format_timestamp(checkpoint.window_start)),
        ),
        (
            ATTR_TO.to_string(),
            AttributeValue::S(format_timestamp(checkpoint.window_end)),
        ),
    ])
}

/// Decode a table item; missing or non-string attributes are errors
pub fn checkpoint_from_item(item: &Item) -> Result<Checkpoint> {
    let text = |name: &str| -> Result<&str> {
        item.get(name)
            .and_then(|value| value.as_s().ok())
            .map(String::as_str)
            .ok_or_else(|| {
                ExportError::Checkpoint(format!("checkpoint item has no string attribute {}", name))
            })
    };

    Ok(Checkpoint {
        partition: text(ATTR_EVENT_DATE)?.to_string(),
        created_at: parse_timestamp(text(ATTR_CREATED_AT)?)?,
        window_start: parse_timestamp(text(ATTR_FROM)?)?,
        window_end: parse_timestamp(text(ATTR_TO)?)?,
    })
}
