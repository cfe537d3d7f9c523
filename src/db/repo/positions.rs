//! Position reads and lifecycle updates for the repository.

use crate::domain::{
    AgentId, Decimal, DeploymentId, Position, PositionStatus, PositionUpdate, TimeMs, TokenSymbol,
    TradeId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

use super::Repository;

const POSITION_COLUMNS: &str = "p.id, p.deployment_id, p.venue, p.token_symbol, p.trade_id, \
     p.quantity, p.entry_price, p.status, p.opened_at, p.closed_at, p.exit_price, p.pnl, p.exit_reason";

/// A position as created by the execution path.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub deployment_id: DeploymentId,
    pub venue: String,
    pub token_symbol: TokenSymbol,
    pub trade_id: Option<TradeId>,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub status: PositionStatus,
    pub opened_at: TimeMs,
    pub closed_at: Option<TimeMs>,
    pub exit_price: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub exit_reason: Option<String>,
}

impl Repository {
    /// Insert a position row, returning its id.
    pub async fn insert_position(&self, position: &NewPosition) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO positions (
                deployment_id, venue, token_symbol, trade_id, quantity, entry_price,
                status, opened_at, closed_at, exit_price, pnl, exit_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.deployment_id.as_str())
        .bind(&position.venue)
        .bind(position.token_symbol.as_str())
        .bind(position.trade_id.as_ref().map(|t| t.as_str()))
        .bind(position.quantity.to_canonical_string())
        .bind(position.entry_price.to_canonical_string())
        .bind(position.status.as_str())
        .bind(position.opened_at.as_ms())
        .bind(position.closed_at.map(|t| t.as_ms()))
        .bind(position.exit_price.map(|d| d.to_canonical_string()))
        .bind(position.pnl.map(|d| d.to_canonical_string()))
        .bind(position.exit_reason.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_position(&self, id: i64) -> Result<Option<Position>, sqlx::Error> {
        let sql = format!("SELECT {} FROM positions p WHERE p.id = ?", POSITION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(position_from_row).transpose()
    }

    /// Positions of a deployment on `venue` whose lifecycle is worth re-checking:
    /// OPEN, CLOSING, or CLOSED with a null or zero pnl. Ordered by row id.
    pub async fn query_positions_needing_sync(
        &self,
        deployment_id: &DeploymentId,
        venue: &str,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM positions p
            WHERE p.deployment_id = ? AND p.venue = ?
              AND (
                p.status IN ('OPEN', 'CLOSING')
                OR (p.status = 'CLOSED' AND (p.pnl IS NULL OR CAST(p.pnl AS REAL) = 0))
              )
            ORDER BY p.id ASC
            "#,
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(deployment_id.as_str())
            .bind(venue)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(position_from_row).collect()
    }

    /// CLOSED positions across every deployment of an agent on `venue`. Ordered by row id.
    pub async fn query_closed_positions_for_agent(
        &self,
        agent_id: &AgentId,
        venue: &str,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM positions p
            JOIN agent_deployments d ON d.id = p.deployment_id
            WHERE d.agent_id = ? AND p.venue = ? AND p.status = 'CLOSED'
            ORDER BY p.id ASC
            "#,
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(agent_id.as_str())
            .bind(venue)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(position_from_row).collect()
    }

    /// Earliest `opened_at` over all of an agent's positions on `venue`, any status.
    pub async fn earliest_opened_at_for_agent(
        &self,
        agent_id: &AgentId,
        venue: &str,
    ) -> Result<Option<TimeMs>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT MIN(p.opened_at) AS min_opened_at
            FROM positions p
            JOIN agent_deployments d ON d.id = p.deployment_id
            WHERE d.agent_id = ? AND p.venue = ?
            "#,
        )
        .bind(agent_id.as_str())
        .bind(venue)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<Option<i64>, _>("min_opened_at").map(TimeMs::new))
    }

    /// Overwrite the engine-owned columns of one position.
    ///
    /// Returns false if no row has that id.
    pub async fn update_position_lifecycle(
        &self,
        id: i64,
        update: &PositionUpdate,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET status = ?, closed_at = ?, exit_price = ?, exit_reason = ?, pnl = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.closed_at.map(|t| t.as_ms()))
        .bind(update.exit_price.map(|d| d.to_canonical_string()))
        .bind(update.exit_reason.as_deref())
        .bind(update.pnl.map(|d| d.to_canonical_string()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_decimal_column(id: i64, column: &str, raw: Option<String>) -> Option<Decimal> {
    let raw = raw?;
    match Decimal::from_str(&raw) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(position_id = id, column, value = %raw, error = %e, "Failed to parse decimal column, treating as null");
            None
        }
    }
}

fn position_from_row(row: &SqliteRow) -> Result<Position, sqlx::Error> {
    let id: i64 = row.get("id");
    let status_str: String = row.get("status");
    let status = PositionStatus::from_str(&status_str).map_err(|e| sqlx::Error::Decode(e.into()))?;

    Ok(Position {
        id,
        deployment_id: DeploymentId::new(row.get::<String, _>("deployment_id")),
        venue: row.get("venue"),
        token_symbol: TokenSymbol::new(row.get::<String, _>("token_symbol")),
        trade_id: row
            .get::<Option<String>, _>("trade_id")
            .filter(|s| !s.trim().is_empty())
            .map(TradeId::new),
        quantity: parse_decimal_column(id, "quantity", row.get("quantity")).unwrap_or_default(),
        entry_price: parse_decimal_column(id, "entry_price", row.get("entry_price"))
            .unwrap_or_default(),
        status,
        opened_at: TimeMs::new(row.get("opened_at")),
        closed_at: row.get::<Option<i64>, _>("closed_at").map(TimeMs::new),
        exit_price: parse_decimal_column(id, "exit_price", row.get("exit_price")),
        pnl: parse_decimal_column(id, "pnl", row.get("pnl")),
        exit_reason: row.get("exit_reason"),
    })
}
