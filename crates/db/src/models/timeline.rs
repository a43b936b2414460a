//! Row of the `claim_timeline` table.

use rex_core::claim::timeline::{TimelineEntry, TimelineMetadata};
use rex_core::error::CoreError;
use rex_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use super::parse_opt;

#[derive(Debug, Clone, FromRow)]
pub struct TimelineRow {
    pub id: DbId,
    pub claim_id: DbId,
    pub event_type: String,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub actor_id: Option<DbId>,
    pub actor_type: String,
    pub description: String,
    pub metadata: Json<TimelineMetadata>,
    pub is_customer_visible: bool,
    pub created_at: Timestamp,
}

impl TryFrom<TimelineRow> for TimelineEntry {
    type Error = CoreError;

    fn try_from(row: TimelineRow) -> Result<Self, Self::Error> {
        Ok(TimelineEntry {
            event_type: row.event_type.parse()?,
            from_status: parse_opt(row.from_status.as_deref())?,
            to_status: parse_opt(row.to_status.as_deref())?,
            actor_type: row.actor_type.parse()?,
            id: row.id,
            claim_id: row.claim_id,
            actor_id: row.actor_id,
            description: row.description,
            metadata: row.metadata.0,
            is_customer_visible: row.is_customer_visible,
            created_at: row.created_at,
        })
    }
}
