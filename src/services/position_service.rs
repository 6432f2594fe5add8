use crate::dto::position_dto::PositionCreate;
use crate::error::{Error, Result};
use crate::models::position::Position;
use sqlx::PgPool;

const POSITION_COLUMNS: &str =
    "id, title, description, access_level, salary, has_system_access, created_by_id";

fn map_unique_title(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return Error::Conflict("Position with this title already exists".to_string());
        }
    }
    err.into()
}

#[derive(Clone)]
pub struct PositionService {
    pool: PgPool,
}

impl PositionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_position(&self, owner_id: i64, data: PositionCreate) -> Result<Position> {
        sqlx::query_as::<_, Position>(&format!(
            r#"INSERT INTO positions
                   (title, description, access_level, salary, has_system_access, created_by_id)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {}"#,
            POSITION_COLUMNS
        ))
        .bind(&data.title)
        .bind(&data.description)
        .bind(&data.access_level)
        .bind(data.salary)
        .bind(data.has_system_access)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_title)
    }

    pub async fn get_positions(&self, owner_id: i64) -> Result<Vec<Position>> {
        let positions = sqlx::query_as::<_, Position>(&format!(
            "SELECT {} FROM positions WHERE created_by_id = $1 ORDER BY title",
            POSITION_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(positions)
    }

    pub async fn get_position(&self, owner_id: i64, position_id: i64) -> Result<Position> {
        sqlx::query_as::<_, Position>(&format!(
            "SELECT {} FROM positions WHERE id = $1 AND created_by_id = $2",
            POSITION_COLUMNS
        ))
        .bind(position_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Position not found".to_string()))
    }

    pub async fn update_position(
        &self,
        owner_id: i64,
        position_id: i64,
        data: PositionCreate,
    ) -> Result<Position> {
        self.get_position(owner_id, position_id).await?;

        sqlx::query_as::<_, Position>(&format!(
            r#"UPDATE positions
               SET title = $1, description = $2, access_level = $3,
                   salary = $4, has_system_access = $5
               WHERE id = $6
               RETURNING {}"#,
            POSITION_COLUMNS
        ))
        .bind(&data.title)
        .bind(&data.description)
        .bind(&data.access_level)
        .bind(data.salary)
        .bind(data.has_system_access)
        .bind(position_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_title)
    }

    pub async fn delete_position(&self, owner_id: i64, position_id: i64) -> Result<()> {
        self.get_position(owner_id, position_id).await?;

        sqlx::query("UPDATE employees SET position_id = NULL WHERE position_id = $1")
            .bind(position_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM positions WHERE id = $1")
            .bind(position_id)
            .execute(&self.pool)
            .await?;
        tracing::info!(position_id, "position deleted");
        Ok(())
    }
}
